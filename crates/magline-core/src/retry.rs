//! Retry policy with exponential backoff for remote query calls
//!
//! The policy is applied by the caller around a single-attempt operation, so
//! the decision of *whether* to retry (predicate) stays separate from *how*
//! the request is made.

use std::time::Duration;

use crate::error::{FailureKind, RequestError, RetryError};

/// Decides whether a failed attempt may be retried.
pub type RetryPredicate = fn(FailureKind) -> bool;

/// Retry every failure class (timeouts, transport errors, any non-success status).
pub fn retry_always(_: FailureKind) -> bool {
    true
}

/// Retry only failures that can plausibly succeed on a second try.
///
/// 4xx responses other than 408 (request timeout) and 429 (rate limited)
/// indicate a malformed query and are rejected immediately.
pub fn retry_transient(kind: FailureKind) -> bool {
    match kind {
        FailureKind::ClientStatus(status) => matches!(status, 408 | 429),
        FailureKind::Transport
        | FailureKind::Timeout
        | FailureKind::ServerStatus(_)
        | FailureKind::Decode => true,
    }
}

/// Exponential backoff: `base * 2^(attempt-1)`, capped at `max`, with up to
/// 25% random jitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl Backoff {
    /// No delay between attempts
    pub const fn none() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base.saturating_mul(1u32 << exp).min(self.max);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let ms = delay.as_millis().min(u64::MAX as u128) as u64;
        let jitter = Duration::from_millis(fastrand::u64(0..=ms / 4));
        (delay + jitter).min(self.max)
    }
}

/// Bounded retry around a single-attempt operation.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub predicate: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Backoff::default(),
            predicate: retry_always,
        }
    }
}

impl RetryPolicy {
    /// Run `attempt_fn` until it succeeds, the predicate rejects a failure,
    /// or `max_attempts` attempts have been made.
    ///
    /// `attempt_fn` receives the 1-based attempt number.
    pub fn run<T>(
        &self,
        label: &str,
        mut attempt_fn: impl FnMut(u32) -> Result<T, RequestError>,
    ) -> Result<T, RetryError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match attempt_fn(attempt) {
                Ok(v) => {
                    if attempt > 1 {
                        log::debug!("{label}: succeeded on attempt {attempt}/{max_attempts}");
                    }
                    return Ok(v);
                }
                Err(e) if !(self.predicate)(e.kind()) => {
                    log::error!("{label}: not retrying: {e}");
                    return Err(RetryError::Rejected { attempt, cause: e });
                }
                Err(e) if attempt >= max_attempts => {
                    log::error!("{label}: failed permanently after {attempt} attempts: {e}");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    let delay = self.backoff.delay(attempt);
                    log::warn!(
                        "{label}: attempt {attempt}/{max_attempts} failed: {e}, retry in {delay:?}"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_err() -> RequestError {
        RequestError::Http {
            status: Some(503),
            message: "unavailable".to_string(),
        }
    }

    fn policy(predicate: RetryPredicate) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 10,
            backoff: Backoff::none(),
            predicate,
        }
    }

    #[test]
    fn backoff_exponential() {
        let b = Backoff {
            base: Duration::from_secs(2),
            max: Duration::from_secs(60),
            jitter: false,
        };
        assert_eq!(b.delay(1), Duration::from_secs(2));
        assert_eq!(b.delay(2), Duration::from_secs(4));
        assert_eq!(b.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn backoff_capped() {
        let b = Backoff {
            base: Duration::from_secs(1),
            max: Duration::from_secs(5),
            jitter: true,
        };
        for attempt in 1..40 {
            assert!(b.delay(attempt) <= Duration::from_secs(5));
        }
    }

    #[test]
    fn backoff_jitter_bounded() {
        let b = Backoff {
            base: Duration::from_millis(400),
            max: Duration::from_secs(30),
            jitter: true,
        };
        for _ in 0..100 {
            let d = b.delay(1);
            assert!(d >= Duration::from_millis(400));
            assert!(d <= Duration::from_millis(500));
        }
    }

    #[test]
    fn backoff_none_is_zero() {
        assert_eq!(Backoff::none().delay(5), Duration::ZERO);
    }

    #[test]
    fn succeeds_on_tenth_attempt() {
        let mut calls = 0;
        let result = policy(retry_always).run("test", |attempt| {
            calls += 1;
            if attempt < 10 {
                Err(server_err())
            } else {
                Ok("page")
            }
        });
        assert_eq!(result.unwrap(), "page");
        assert_eq!(calls, 10);
    }

    #[test]
    fn exhausted_after_ten_attempts() {
        let mut calls = 0;
        let result: Result<(), _> = policy(retry_always).run("test", |_| {
            calls += 1;
            Err(server_err())
        });
        assert_eq!(calls, 10);
        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 10);
                assert_eq!(last.kind(), FailureKind::ServerStatus(503));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn retry_always_retries_client_errors() {
        let mut calls = 0;
        let _: Result<(), _> = policy(retry_always).run("test", |_| {
            calls += 1;
            Err(RequestError::Http {
                status: Some(400),
                message: "bad expr".into(),
            })
        });
        assert_eq!(calls, 10);
    }

    #[test]
    fn retry_transient_rejects_bad_request() {
        let mut calls = 0;
        let result: Result<(), _> = policy(retry_transient).run("test", |_| {
            calls += 1;
            Err(RequestError::Http {
                status: Some(400),
                message: "bad expr".into(),
            })
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(RetryError::Rejected { attempt: 1, .. })));
    }

    #[test]
    fn retry_transient_classification() {
        assert!(retry_transient(FailureKind::Transport));
        assert!(retry_transient(FailureKind::Timeout));
        assert!(retry_transient(FailureKind::Decode));
        assert!(retry_transient(FailureKind::ServerStatus(502)));
        assert!(retry_transient(FailureKind::ClientStatus(429)));
        assert!(retry_transient(FailureKind::ClientStatus(408)));
        assert!(!retry_transient(FailureKind::ClientStatus(400)));
        assert!(!retry_transient(FailureKind::ClientStatus(401)));
    }

    #[test]
    fn zero_max_attempts_still_tries_once() {
        let mut calls = 0;
        let policy = RetryPolicy {
            max_attempts: 0,
            ..policy(retry_always)
        };
        let _: Result<(), _> = policy.run("test", |_| {
            calls += 1;
            Err(server_err())
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn default_policy_matches_service_ceiling() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 10);
        assert!((p.predicate)(FailureKind::ClientStatus(400)));
    }
}
