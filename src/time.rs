//! Delay pacing abstraction.

use core::time::Duration;
use std::time::Instant;

use crate::interrupt::CancelToken;

/// Longest single sleep of [`ThreadPacer`] before it rechecks cancellation.
pub const PACE_SLICE: Duration = Duration::from_millis(50);

/// Trait for abstracting how delay steps are waited out.
///
/// Pacing is best effort: implementations may return early, for example when
/// the run is being cancelled.
pub trait Pacer {
    /// Blocks for up to `duration`.
    fn pause(&mut self, duration: Duration);
}

impl<P: Pacer + ?Sized> Pacer for &mut P {
    fn pause(&mut self, duration: Duration) {
        (**self).pause(duration);
    }
}

/// Sleeps the current thread, waking early once `cancel` fires.
#[derive(Debug, Clone, Default)]
pub struct ThreadPacer {
    cancel: CancelToken,
}

impl ThreadPacer {
    /// Creates a pacer that stops waiting when `cancel` is triggered.
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }
}

impl Pacer for ThreadPacer {
    fn pause(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            std::thread::sleep(remaining.min(PACE_SLICE));
        }
    }
}
