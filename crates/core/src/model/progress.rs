use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Marker returned when a long-running operation observed a cancel request.
///
/// This is a normal outcome, not a failure: the operation unwound without
/// touching published state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation cancelled")
    }
}

/// Cooperative progress and cancellation handle polled by recomputes.
pub trait Progress: Send + Sync {
    /// Returns `Err(Cancelled)` if the caller asked to stop.
    fn check_cancelled(&self) -> Result<(), Cancelled>;

    /// Describes the current unit of work. Ignored by default.
    fn set_message(&self, _message: &str) {}
}

/// Progress handle that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl Progress for Unbounded {
    fn check_cancelled(&self) -> Result<(), Cancelled> {
        Ok(())
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clears a previous request so the token can be reused for the next operation.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

impl Progress for CancellationToken {
    fn check_cancelled(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_message(&self, message: &str) {
        tracing::trace!(step = message, "progress");
    }
}
