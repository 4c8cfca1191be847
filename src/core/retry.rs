//! Retry utility for transient errors in blocking operations
//!
//! Forwarding a follow-up action to the next pipeline stage can fail
//! transiently (relay hiccup, database write error). The forwarder retries such
//! failures after a pause; errors that retrying cannot fix are returned on the
//! first attempt.

use crate::core::shutdown::ShutdownSignal;
use std::time::Duration;

/// Errors that know whether a second attempt could succeed
pub trait RetryableError: std::fmt::Display {
    fn is_retryable(&self) -> bool;
}

/// Configurable retry policy for blocking operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

/// Execute `operation`, retrying retryable errors per `policy`
///
/// The pause between attempts is interruptible: once `shutdown` is triggered
/// the last error is returned without further attempts.
///
/// # Examples
/// ```rust
/// use crawlgrid::core::retry::{retry_blocking, RetryPolicy, RetryableError};
/// use crawlgrid::core::shutdown::ShutdownSignal;
/// use std::time::Duration;
///
/// #[derive(Debug)]
/// struct Flaky;
/// impl std::fmt::Display for Flaky {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         write!(f, "flaky")
///     }
/// }
/// impl RetryableError for Flaky {
///     fn is_retryable(&self) -> bool { true }
/// }
///
/// let policy = RetryPolicy::with_delay(Duration::from_millis(1));
/// let mut calls = 0;
/// let result = retry_blocking("forward", &policy, &ShutdownSignal::new(), || {
///     calls += 1;
///     if calls == 1 { Err(Flaky) } else { Ok(calls) }
/// });
/// assert_eq!(result.unwrap(), 2);
/// ```
pub fn retry_blocking<F, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    shutdown: &ShutdownSignal,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: RetryableError,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(error) => {
                if attempt >= attempts || !error.is_retryable() {
                    return Err(error);
                }
                log::warn!(
                    "Operation '{}' failed on attempt {}/{}, retrying in {:?}: {}",
                    operation_name,
                    attempt,
                    attempts,
                    policy.delay,
                    error
                );
                if !shutdown.sleep(policy.delay) {
                    return Err(error);
                }
                attempt += 1;
            }
        }
    }
}
