//! Retry with exponential backoff and jitter.
//!
//! [`RetryPolicy`] is a plain value: it holds no client and no shared mutable
//! state, so one policy can drive calls from any number of concurrent jobs.
//! Whether an error is worth retrying is decided by the error itself through
//! [`IsTransient`].
//!
//! ## Wait schedule
//!
//! Before attempt `n + 1` (after `n` failures) the policy sleeps for a
//! duration drawn uniformly from `[min_delay, cap_n]`, where
//! `cap_n = min(max_delay, min_delay * 2^n)`. With the defaults
//! (1 s / 30 s / 3 attempts) the waits are drawn from 1–2 s, then 1–4 s.
//! Randomising the wait spreads out concurrent jobs that failed together.

use crate::config::RetrySettings;
use crate::error::UpstreamError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Is this error likely to go away if the call is repeated?
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

impl IsTransient for UpstreamError {
    fn is_transient(&self) -> bool {
        UpstreamError::is_transient(self)
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryFailure<E> {
    /// A non-transient error; no further attempts were made.
    Fatal { error: E, attempts: u32 },
    /// Every attempt failed with a transient error.
    Exhausted { error: E, attempts: u32 },
}

impl<E> RetryFailure<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryFailure::Fatal { attempts, .. } | RetryFailure::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_error(self) -> E {
        match self {
            RetryFailure::Fatal { error, .. } | RetryFailure::Exhausted { error, .. } => error,
        }
    }
}

/// Attempt budget plus backoff bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetrySettings::default().into()
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(s: RetrySettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            min_delay: s.min_delay,
            max_delay: s.max_delay.max(s.min_delay),
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests and local fakes.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Wait before the attempt following `failures` failed attempts.
    ///
    /// `sample` is a uniform draw from `[0, 1)`; it is a parameter so the
    /// schedule can be tested without randomness.
    pub fn backoff_delay(&self, failures: u32, sample: f64) -> Duration {
        let min = self.min_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let exp = 2f64.powi(failures.min(62) as i32);
        let cap = (min * exp).min(max).max(min);
        let sample = if sample.is_finite() {
            sample.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Duration::from_secs_f64(min + (cap - min) * sample)
    }

    /// Run `op` until it succeeds, fails fatally, or the attempt budget runs
    /// out.
    ///
    /// `op` receives the 1-based attempt number. `label` only appears in logs.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryFailure<E>>
    where
        E: IsTransient + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{}: succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(error) if !error.is_transient() => {
                    warn!("{}: attempt {} failed fatally — {}", label, attempt, error);
                    return Err(RetryFailure::Fatal {
                        error,
                        attempts: attempt,
                    });
                }
                Err(error) if attempt >= self.max_attempts => {
                    warn!(
                        "{}: giving up after {} attempts — {}",
                        label, attempt, error
                    );
                    return Err(RetryFailure::Exhausted {
                        error,
                        attempts: attempt,
                    });
                }
                Err(error) => {
                    let delay = self.backoff_delay(attempt, rand::random::<f64>());
                    warn!(
                        "{}: attempt {}/{} failed — {}; retrying in {}ms",
                        label,
                        attempt,
                        self.max_attempts,
                        error,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
