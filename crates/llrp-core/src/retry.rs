//! Retry with exponential backoff.
//!
//! One [`RetryPolicy`] drives both the initial dial and the reconnect loop.
//! Which errors are worth another attempt is decided by a caller-supplied
//! predicate; anything it rejects ends the run immediately.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

// ── RetryPolicy ──────────────────────────────────────────────────────

/// Exponential backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the second attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on any single delay. Default: 30s.
    pub max_delay: Duration,

    /// Total attempts before giving up.
    /// `None` means retry recoverable errors forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

/// How a retry run ended without a result.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The predicate rejected the error.
    #[error("unrecoverable error after {attempts} attempt(s): {error}")]
    Unrecoverable { attempts: u32, error: E },

    /// `max_attempts` reached with recoverable errors only.
    #[error("gave up after {attempts} attempts: {error}")]
    Exhausted { attempts: u32, error: E },

    /// The cancellation token fired between attempts.
    #[error("retry cancelled")]
    Cancelled,
}

impl<E> RetryError<E> {
    /// The last error seen, if any attempt ran.
    pub fn into_error(self) -> Option<E> {
        match self {
            Self::Unrecoverable { error, .. } | Self::Exhausted { error, .. } => Some(error),
            Self::Cancelled => None,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `attempt` failures (0-based).
    ///
    /// Doubles from `initial_delay` with a deterministic ±25% spread,
    /// never exceeding `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        let capped = base.min(max);

        let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
        let with_jitter = (capped * jitter_factor).clamp(0.0, max);

        Duration::from_secs_f64(with_jitter)
    }

    /// Run `op` until it succeeds, `is_recoverable` rejects an error,
    /// attempts run out, or `cancel` fires.
    pub async fn retry_some<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
        is_recoverable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let error = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RetryError::Cancelled),
                result = op() => match result {
                    Ok(value) => return Ok(value),
                    Err(e) => e,
                },
            };
            attempt = attempt.saturating_add(1);

            if !is_recoverable(&error) {
                return Err(RetryError::Unrecoverable {
                    attempts: attempt,
                    error,
                });
            }
            if self.max_attempts.is_some_and(|max| attempt >= max) {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    error,
                });
            }

            let delay = self.delay_for(attempt - 1);
            tracing::warn!(
                error = %error,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "attempt failed, retrying"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RetryError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
