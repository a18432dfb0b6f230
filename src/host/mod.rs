//! Collaborator contracts with the host application
//!
//! The host owns the external entity catalog and the tag registry; this
//! crate only reads and annotates them through the traits defined here.
//! User-facing plumbing (notifications, progress/cancellation) is likewise
//! abstracted so the core runs the same under a UI, a CLI or a test.

pub mod memory;
pub mod notify;
pub mod progress;
pub mod registry;

pub use memory::{Catalog, InMemoryHost};
pub use notify::{LogNotifier, Notification, NotificationLevel, Notifier};
pub use progress::{BulkSummary, LoggingProgressHost, ProgressHandle, ProgressHost};
pub use registry::{EntityRegistry, TagRegistry};

use std::sync::Arc;

/// Every host collaborator the database needs, bundled
#[derive(Clone)]
pub struct HostServices {
    pub entities: Arc<dyn EntityRegistry>,
    pub tags: Arc<dyn TagRegistry>,
    pub progress: Arc<dyn ProgressHost>,
    pub notifier: Arc<dyn Notifier>,
}

impl HostServices {
    /// Registries backed by `host`, logging progress and notifications
    pub fn in_memory(host: Arc<InMemoryHost>) -> Self {
        Self {
            entities: host.clone(),
            tags: host,
            progress: Arc::new(LoggingProgressHost),
            notifier: Arc::new(LogNotifier),
        }
    }
}
