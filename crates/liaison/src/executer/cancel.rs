//! Cooperative cancellation for executer workers.
//!
//! Workers cannot be killed from outside, so tasks observe this token at
//! their own yield points: [`CancellationToken::check`] between steps and
//! [`CancellationToken::sleep`] instead of `thread::sleep`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

const SLEEP_SLICE: Duration = Duration::from_millis(5);

/// Returned by [`CancellationToken::check`] once the token has fired.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("execution was cancelled")]
pub struct Cancelled;

/// Shared flag raised when a running command is aborted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Yield point usable with `?`.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] once the token has fired.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration`, waking early when the token fires.
    ///
    /// Returns `true` if the full duration elapsed.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.is_cancelled() {
                return false;
            }
            let slice = match deadline {
                Some(limit) => {
                    let now = Instant::now();
                    if now >= limit {
                        return true;
                    }
                    SLEEP_SLICE.min(limit - now)
                }
                None => SLEEP_SLICE,
            };
            thread::sleep(slice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert_eq!(observer.check(), Ok(()));
        token.cancel();
        assert!(observer.is_cancelled());
        assert_eq!(observer.check(), Err(Cancelled));
    }

    #[test]
    fn sleep_completes_when_not_cancelled() {
        let token = CancellationToken::new();
        assert!(token.sleep(Duration::from_millis(10)));
    }

    #[test]
    fn sleep_wakes_early_on_cancel() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        let started = Instant::now();
        assert!(!token.sleep(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(2));
        handle.join().expect("join canceller");
    }

    #[test]
    fn unbounded_sleep_still_wakes_on_cancel() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        assert!(!token.sleep(Duration::MAX));
        handle.join().expect("join canceller");
    }
}
