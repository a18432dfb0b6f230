//! Progress and cancellation for long-running operations
//!
//! A [`ProgressHost`] hands out one [`ProgressHandle`] per labeled operation.
//! Bulk loops check the handle's cancellation token once per item, bump its
//! counter, and finish with a [`BulkSummary`] that is logged whether or not
//! the loop ran to completion.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::utils::time::format_elapsed;

/// Progress state of one running operation
#[derive(Debug)]
pub struct ProgressHandle {
    label: String,
    cancelable: bool,
    token: CancellationToken,
    current: AtomicU64,
    max: AtomicU64,
    started: Instant,
}

impl ProgressHandle {
    pub fn new(label: impl Into<String>, cancelable: bool) -> Self {
        Self::with_token(label, cancelable, CancellationToken::new())
    }

    /// Handle bound to an existing token, e.g. a child of a shutdown token
    pub fn with_token(label: impl Into<String>, cancelable: bool, token: CancellationToken) -> Self {
        Self {
            label: label.into(),
            cancelable,
            token,
            current: AtomicU64::new(0),
            max: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_cancelable(&self) -> bool {
        self.cancelable
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Request cancellation. Ignored for non-cancelable operations.
    pub fn cancel(&self) {
        if self.cancelable {
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelable && self.token.is_cancelled()
    }

    pub fn set_max(&self, max: u64) {
        self.max.store(max, Ordering::Relaxed);
    }

    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    pub fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Snapshot the counters into a summary
    pub fn summary(&self, operation: &str, cancelled: bool) -> BulkSummary {
        BulkSummary {
            operation: operation.to_string(),
            completed: self.current(),
            total: self.max(),
            elapsed: self.elapsed(),
            cancelled,
        }
    }
}

/// Outcome of a bulk loop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkSummary {
    pub operation: String,
    pub completed: u64,
    pub total: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl BulkSummary {
    pub fn log(&self) {
        info!("{}", self);
    }
}

impl fmt::Display for BulkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Task {}(){} - {} for {}/{} items",
            self.operation,
            if self.cancelled { " canceled" } else { "" },
            format_elapsed(self.elapsed),
            self.completed,
            self.total
        )
    }
}

/// Runs labeled operations on behalf of the core
pub trait ProgressHost: Send + Sync {
    fn begin(&self, label: &str, cancelable: bool) -> Arc<ProgressHandle>;
}

/// Host that only logs the start of each operation
#[derive(Debug, Default, Clone)]
pub struct LoggingProgressHost;

impl ProgressHost for LoggingProgressHost {
    fn begin(&self, label: &str, cancelable: bool) -> Arc<ProgressHandle> {
        debug!("Starting operation: {} (cancelable: {})", label, cancelable);
        Arc::new(ProgressHandle::new(label, cancelable))
    }
}
