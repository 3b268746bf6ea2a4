use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Cross-thread half of the worker's single-shot shutdown signal.
///
/// The handle is the only part of a worker that may be touched from
/// outside the receive thread. Raising the signal twice is a no-op.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    triggered: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Ask the receive loop to release its resources and return. The
    /// loop observes the signal at the top of its next iteration, at
    /// most one poll interval later; this call does not wait for it.
    pub fn shutdown(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            debug!("Worker attempting graceful shutdown...");
        }
    }
}

/// Consumer side, owned by the worker and checked before every poll.
#[derive(Debug)]
pub(crate) struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub(crate) fn new() -> Self {
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            triggered: Arc::clone(&self.triggered),
        }
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}
