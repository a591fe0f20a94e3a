//! Bounded per-item retry with exponential backoff.
//!
//! Registration and upload calls go through [`RetryPolicy::run`]:
//! - transport errors, HTTP 429 and 5xx → retry
//! - any other error → fail immediately
//! - backoff: `base`, `2·base`, `4·base`, … capped at `max_delay`
//!
//! The clients themselves never retry.

use std::future::Future;
use std::time::Duration;

use crate::error::{RegistrationError, UploadError};

/// Errors that can tell whether another attempt might succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for RegistrationError {
    fn is_transient(&self) -> bool {
        RegistrationError::is_transient(self)
    }
}

impl Transient for UploadError {
    fn is_transient(&self) -> bool {
        UploadError::is_transient(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt number `attempt` (1-based; attempt 1 has none).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 2).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let delay = self.delay_for(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::warn!(
                        "{}: attempt {}/{} failed: {}; retrying",
                        label,
                        attempt,
                        attempts,
                        e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(p.delay_for(1), Duration::ZERO);
        assert_eq!(p.delay_for(2), Duration::from_millis(500));
        assert_eq!(p.delay_for(3), Duration::from_millis(1000));
        assert_eq!(p.delay_for(4), Duration::from_millis(2000));
        assert_eq!(p.delay_for(5), Duration::from_secs(3));
        assert_eq!(p.delay_for(40), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<&str, UploadError> = fast(3)
            .run("upload echo", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(UploadError::Transport("connection reset".to_string()))
                } else {
                    Ok("ok")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), RegistrationError> = fast(2)
            .run("register echo", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RegistrationError::Rejected {
                    status: 500,
                    body: "boom".to_string(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), UploadError> = fast(5)
            .run("upload echo", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(UploadError::AlreadyExists)
            })
            .await;
        assert!(matches!(result, Err(UploadError::AlreadyExists)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
