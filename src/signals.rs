//! Signal-driven shutdown/reload path (§4.6, §6, §5 cancellation model).
//!
//! SIGTERM/SIGINT set a shared flag the main loop polls once per iteration
//! and that is broadcast to every ring-buffer condvar so blocked layer
//! threads wake promptly; SIGHUP sets a separate flag that the main loop
//! checks to reload the config file in place. SIGPIPE is ignored so a peer
//! closing the telnet socket mid-write surfaces as `Err(Io(..))` rather than
//! killing the process.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::flag;

pub struct Signals {
    shutdown: Arc<AtomicBool>,
    reload: Arc<AtomicBool>,
}

impl Signals {
    /// Register the handlers. Must be called once, early in `main`, before
    /// any layer thread starts so the flags exist for the whole process
    /// lifetime.
    pub fn install() -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let reload = Arc::new(AtomicBool::new(false));

        flag::register(SIGTERM, Arc::clone(&shutdown))?;
        flag::register(SIGINT, Arc::clone(&shutdown))?;
        flag::register(SIGHUP, Arc::clone(&reload))?;
        ignore_sigpipe();

        Ok(Self { shutdown, reload })
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Checks and clears the reload flag in one step, so a SIGHUP received
    /// while a reload is already in progress is not lost nor double-handled.
    pub fn take_reload_request(&self) -> bool {
        self.reload.swap(false, Ordering::SeqCst)
    }

    /// Shared handle for wiring into ring-buffer shutdown broadcasts.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }
}

#[cfg(unix)]
fn ignore_sigpipe() {
    use nix::sys::signal::{self, SigHandler, Signal};
    // SAFETY: SigIgn is async-signal-safe and installing it at startup,
    // before any other thread exists, cannot race with concurrent use of
    // the signal disposition.
    unsafe {
        let _ = signal::signal(Signal::SIGPIPE, SigHandler::SigIgn);
    }
}

#[cfg(not(unix))]
fn ignore_sigpipe() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_flag_starts_false() {
        let flag = Arc::new(AtomicBool::new(false));
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn take_reload_request_clears_after_reading() {
        let reload = Arc::new(AtomicBool::new(true));
        let signals = Signals {
            shutdown: Arc::new(AtomicBool::new(false)),
            reload: Arc::clone(&reload),
        };
        assert!(signals.take_reload_request());
        assert!(!signals.take_reload_request());
    }
}
