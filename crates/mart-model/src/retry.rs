//! Exponential backoff for transient failures.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

/// Errors that may succeed when the operation is repeated.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for std::io::Error {
    fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::WouldBlock
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_millis(5_000),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }

    /// Runs `op` until it succeeds or fails permanently. `op` receives the
    /// zero-based attempt number; the last error is returned once retries
    /// are exhausted.
    pub fn run<T, E, F>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let backoff = self.backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying after transient error"
                );
                thread::sleep(backoff);
            }
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.max_retries => {
                    debug!(operation, attempt, %error, "transient error");
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_millis(1_000),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(4), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(40), Duration::from_millis(1_000));
    }

    proptest::proptest! {
        #[test]
        fn backoff_never_exceeds_cap(initial in 0u64..10_000, cap in 0u64..60_000, attempt in 1u32..64) {
            let policy = RetryPolicy {
                max_retries: attempt,
                initial_backoff: Duration::from_millis(initial.min(cap)),
                max_backoff: Duration::from_millis(cap),
            };
            proptest::prop_assert!(policy.backoff(attempt) <= policy.max_backoff);
            proptest::prop_assert!(policy.backoff(attempt) <= policy.backoff(attempt + 1));
        }
    }

    #[test]
    fn retries_transient_errors_until_success() {
        let mut calls = 0;
        let result: Result<u32, io::Error> = policy(3).run("test", |attempt| {
            calls += 1;
            if attempt < 2 {
                Err(io::Error::new(io::ErrorKind::Interrupted, "busy"))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 3);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), io::Error> = policy(3).run("test", |_| {
            calls += 1;
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn gives_up_after_max_retries() {
        let mut calls = 0;
        let result: Result<(), io::Error> = policy(2).run("test", |_| {
            calls += 1;
            Err(io::Error::new(io::ErrorKind::TimedOut, "slow"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
