//! Signal Handling for Graceful Shutdown
//!
//! Ctrl+C / SIGTERM stop the run loop between executables. The test process
//! that is currently running gets the terminal's SIGINT itself.

use std::sync::atomic::{AtomicBool, Ordering};

/// Global flag to signal shutdown was requested
pub static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Install signal handlers for graceful shutdown
///
/// Spawns a daemon thread that listens for signals; it dies with the
/// main thread.
#[cfg(unix)]
pub fn install_signal_handlers() -> std::io::Result<()> {
    use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGQUIT])?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            tracing::warn!("Received signal {}, stopping after the current executable", sig);
            SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
pub fn install_signal_handlers() -> std::io::Result<()> {
    Ok(())
}

/// Check if shutdown was requested (called in the run loop)
#[inline]
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_flag() {
        assert!(!SHUTDOWN_REQUESTED.load(Ordering::SeqCst));
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        assert!(shutdown_requested());
        SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);
    }
}
