use core::fmt::Debug;
use core::time::Duration;
use embedded_hal::delay::DelayNs;
use log::debug;
use thiserror::Error;

/// The number of attempts every reader makes before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u8 = 7;

/// The pause between two attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Returned when a retry budget of zero attempts is requested.
#[derive(Debug, Error, PartialEq)]
#[error("at least one attempt is required")]
pub struct InvalidArgument;

/// Every attempt failed. Holds the error of the final attempt.
#[derive(Debug, Error, PartialEq)]
#[error("no valid reading after {attempts} attempts, last error: {last}")]
pub struct Exhausted<E> {
    pub attempts: u8,
    pub last: E,
}

/// What a reader does once its retry budget is spent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Print a diagnostic to stderr and exit with a failure status.
    Report,
    /// Print nothing and exit successfully, leaving the gap for the log shipper to notice.
    Silent,
}

impl ExhaustionPolicy {
    /// Maps a `--fail-on-exhaustion` style switch: set means [`Report`](Self::Report).
    pub fn from_fail_flag(fail: bool) -> ExhaustionPolicy {
        if fail {
            ExhaustionPolicy::Report
        } else {
            ExhaustionPolicy::Silent
        }
    }
}

/// Bounded retry with a fixed delay between attempts.
///
/// All failure causes draw from the same budget: a checksum failure followed by an out-of-range
/// value counts as two attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u8,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::DEFAULT
    }
}

impl RetryPolicy {
    pub const DEFAULT: RetryPolicy = RetryPolicy {
        max_attempts: DEFAULT_MAX_ATTEMPTS,
        delay: DEFAULT_RETRY_DELAY,
    };

    pub fn new(max_attempts: u8, delay: Duration) -> Result<RetryPolicy, InvalidArgument> {
        if max_attempts < 1 {
            return Err(InvalidArgument);
        }
        Ok(RetryPolicy {
            max_attempts,
            delay,
        })
    }

    pub fn max_attempts(&self) -> u8 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Calls `attempt` until it succeeds or the budget runs out, sleeping on `delay` in between.
    ///
    /// `attempt` receives the 1-based attempt number and the delay, so it can time its own bus
    /// traffic. There is no delay before the first attempt or after the last one, so exhausting
    /// `n` attempts sleeps `n - 1` times.
    pub fn run<T, E, D, F>(&self, delay: &mut D, mut attempt: F) -> Result<T, Exhausted<E>>
    where
        D: DelayNs,
        F: FnMut(u8, &mut D) -> Result<T, E>,
        E: Debug,
    {
        let delay_ms = u32::try_from(self.delay.as_millis()).unwrap_or(u32::MAX);
        let mut attempts = 0u8;
        loop {
            attempts += 1;
            match attempt(attempts, delay) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    debug!(
                        "attempt {}/{} failed: {:?}",
                        attempts, self.max_attempts, err
                    );
                    if attempts >= self.max_attempts {
                        return Err(Exhausted {
                            attempts,
                            last: err,
                        });
                    }
                }
            }
            delay.delay_ms(delay_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingDelay {
        calls: u32,
        total_ms: u64,
    }

    impl DelayNs for CountingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.calls += 1;
            self.total_ms += ns as u64 / 1_000_000;
        }

        fn delay_ms(&mut self, ms: u32) {
            self.calls += 1;
            self.total_ms += ms as u64;
        }
    }

    #[test]
    fn zero_attempts_is_rejected() {
        assert_eq!(
            RetryPolicy::new(0, DEFAULT_RETRY_DELAY),
            Err(InvalidArgument)
        );
    }

    #[test]
    fn first_success_does_not_sleep() {
        let mut delay = CountingDelay::default();
        let mut calls = 0;
        let result: Result<u8, Exhausted<()>> = RetryPolicy::DEFAULT.run(&mut delay, |_, _| {
            calls += 1;
            Ok(5)
        });

        assert_eq!(result, Ok(5));
        assert_eq!(calls, 1);
        assert_eq!(delay.calls, 0);
    }

    #[test]
    fn succeeds_on_final_attempt() {
        let mut delay = CountingDelay::default();
        let mut calls = 0;
        let result = RetryPolicy::DEFAULT.run(&mut delay, |attempt, _| {
            calls += 1;
            if attempt < 7 {
                Err("bad data")
            } else {
                Ok(attempt)
            }
        });

        assert_eq!(result, Ok(7));
        assert_eq!(calls, 7);
        assert_eq!(delay.calls, 6);
        assert_eq!(delay.total_ms, 6 * 3000);
    }

    #[test]
    fn always_failing_exhausts_budget() {
        let mut delay = CountingDelay::default();
        let mut calls = 0u8;
        let result: Result<(), _> = RetryPolicy::DEFAULT.run(&mut delay, |attempt, _| {
            calls += 1;
            Err(attempt)
        });

        assert_eq!(
            result,
            Err(Exhausted {
                attempts: 7,
                last: 7
            })
        );
        assert_eq!(calls, 7);
        assert_eq!(delay.calls, 6);
    }

    #[test]
    fn single_attempt_never_sleeps() {
        let mut delay = CountingDelay::default();
        let policy = RetryPolicy::new(1, Duration::from_millis(10)).unwrap();
        let result: Result<(), _> = policy.run(&mut delay, |_, _| Err(()));

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(delay.calls, 0);
    }

    #[test]
    fn fail_flag_selects_report() {
        assert_eq!(ExhaustionPolicy::from_fail_flag(true), ExhaustionPolicy::Report);
        assert_eq!(ExhaustionPolicy::from_fail_flag(false), ExhaustionPolicy::Silent);
    }
}
