//! Cooperative cancellation for long running sequences and the daemon.
//!
//! A [`CancelToken`] is checked between sequence steps. Tokens returned by
//! [`install_handler`] additionally fire on SIGINT or SIGTERM, so that an
//! interrupted blink or fade still reaches the device reset.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set by the signal handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    watch_signals: bool,
}

impl CancelToken {
    /// Creates a token that only fires when [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that also fires on SIGINT or SIGTERM once
    /// [`install_handler`] has run. Until then the signals keep their default
    /// action.
    pub fn watching_signals() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            watch_signals: true,
        }
    }

    /// Requests cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested or a watched signal arrived.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || (self.watch_signals && INTERRUPTED.load(Ordering::SeqCst))
    }
}

/// Signal handler for SIGINT and SIGTERM.
///
/// Only uses atomic operations (async-signal-safe).
#[cfg(unix)]
extern "C" fn handle_interrupt(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Installs the SIGINT/SIGTERM handler and returns a token watching it.
///
/// Once installed, the signals no longer terminate the process; callers are
/// expected to check the token and unwind through their cleanup path.
#[cfg(unix)]
pub fn install_handler() -> io::Result<CancelToken> {
    for signal in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: We install an async-signal-safe handler that only sets an atomic
        // flag. `sigemptyset` and `sigaction` are called with initialized pointers
        // and checked for non-zero error returns.
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = handle_interrupt as *const () as usize;
            if libc::sigemptyset(&mut action.sa_mask) != 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    tracing::debug!("interrupt handler installed");

    Ok(CancelToken::watching_signals())
}

#[cfg(not(unix))]
pub fn install_handler() -> io::Result<CancelToken> {
    Ok(CancelToken::watching_signals())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn signal_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn plain_tokens_ignore_signal_flag() {
        let _guard = signal_lock().lock().unwrap();
        let token = CancelToken::new();
        INTERRUPTED.store(true, Ordering::SeqCst);
        let cancelled = token.is_cancelled();
        INTERRUPTED.store(false, Ordering::SeqCst);
        assert!(!cancelled);
    }

    #[test]
    fn signal_tokens_observe_signal_flag() {
        let _guard = signal_lock().lock().unwrap();
        let token = CancelToken::watching_signals();
        assert!(!token.is_cancelled());
        INTERRUPTED.store(true, Ordering::SeqCst);
        let cancelled = token.is_cancelled();
        INTERRUPTED.store(false, Ordering::SeqCst);
        assert!(cancelled);
    }
}
