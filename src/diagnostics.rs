//! Process-wide diagnostic hooks.
//!
//! Host applications can push free-form messages through the external API
//! for correlation with engine logs. The counter lives behind this
//! collaborator's own lock; nothing else in the process touches it.

use std::sync::{Mutex, PoisonError};

use tracing::info;

/// Injected diagnostics collaborator owning the application log counter.
#[derive(Debug, Default)]
pub struct Diagnostics {
    logged: Mutex<u64>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log an application-supplied message and return the process-wide,
    /// monotonically increasing count of messages logged so far.
    pub fn log_message(&self, message: &str) -> u64 {
        let mut logged = self
            .logged
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *logged += 1;
        info!(count = *logged, "app: {message}");
        *logged
    }

    /// Current counter value without logging.
    pub fn logged(&self) -> u64 {
        *self.logged.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
