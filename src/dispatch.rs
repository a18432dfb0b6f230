//! Single-consumer mutation dispatcher
//!
//! Every mutation of the record store and of the host registries is executed
//! on one dedicated thread, in submission order. Callers on any task submit a
//! closure and await its result ("send" discipline), so mutations are
//! serialized with each other no matter how many workers issue them.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::errors::DispatchError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the mutation thread. Cheap to clone; the thread exits once the
/// last handle is dropped and the queue has drained.
#[derive(Clone)]
pub struct MutationDispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl MutationDispatcher {
    /// Start the mutation thread
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let thread_name = format!("{name}-dispatch");

        std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!("Mutation dispatcher {} started", thread_name);
                while let Some(job) = rx.blocking_recv() {
                    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
                        error!("Mutation job panicked on {}", thread_name);
                    }
                }
                debug!("Mutation dispatcher {} stopped", thread_name);
            })?;

        Ok(Self { tx })
    }

    /// Run `job` on the mutation thread and wait for its result
    pub async fn send<F, R>(&self, job: F) -> Result<R, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Box::new(move || {
                let _ = reply_tx.send(job());
            }))
            .map_err(|_| DispatchError::Closed)?;

        // A panicking job drops reply_tx, which surfaces here as Closed
        reply_rx.await.map_err(|_| DispatchError::Closed)
    }
}
