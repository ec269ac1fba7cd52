//! Operator interrupt handling.
//!
//! SIGINT and SIGTERM only flip a process-wide flag; long waits observe it
//! through a [`CancelToken`] and unwind on their own.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM to the interrupt flag.
pub fn install_handlers() {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only performs an atomic store.
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

/// Cancellation flag shared between the orchestrator and its probes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    observe_signals: bool,
}

impl CancelToken {
    /// Token that is only cancelled through [`CancelToken::cancel`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that is also cancelled by SIGINT/SIGTERM.
    pub fn from_signals() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            observe_signals: true,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || (self.observe_signals && INTERRUPTED.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cancellation() {
        let token = CancelToken::new();
        let probe_side = token.clone();
        assert!(!probe_side.is_cancelled());
        token.cancel();
        assert!(probe_side.is_cancelled());
    }
}
