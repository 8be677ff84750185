//! Per-page retry policy
//!
//! A failing operation is attempted again, immediately or after a fixed
//! delay, until it succeeds or the attempt ceiling is reached. Errors that
//! classify themselves as non-retryable stop the loop at once.

use crate::engine::fetcher::FetchError;
use crate::extract::ExtractError;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Classification of an error for retry purposes
pub trait Retryable {
    /// Returns true if another attempt may succeed
    fn is_retryable(&self) -> bool;
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// Failure of a single page attempt
#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The payload arrived but could not be parsed
    #[error("Could not parse page payload: {source}")]
    Extract {
        source: ExtractError,
        retryable: bool,
    },

    /// The task running the page panicked or was cancelled
    #[error("Page task did not complete: {0}")]
    Task(String),
}

impl Retryable for PageError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_retryable(),
            Self::Extract { retryable, .. } => *retryable,
            Self::Task(_) => false,
        }
    }
}

/// Terminal failure of a retried operation
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Every allowed attempt failed; carries the last error
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    /// A non-retryable error stopped the loop early
    #[error("non-retryable failure on attempt {attempt}: {source}")]
    Aborted { attempt: u32, source: E },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Aborted { attempt, .. } => *attempt,
        }
    }

    /// The error of the final attempt
    pub fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Aborted { source, .. } => source,
        }
    }
}

/// Successful result together with the number of attempts it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

impl<T> Attempted<T> {
    /// Attempts beyond the first
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Bounded retry with an optional fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_attempts` attempts in total
    ///
    /// A ceiling of zero is treated as one attempt.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::ZERO,
        }
    }

    /// Sets the pause between attempts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `operation` until it succeeds or the policy gives up
    ///
    /// The closure receives the 1-based attempt number. Each retry is logged
    /// at warn level with `label` and the error that caused it.
    pub async fn execute<T, E, F, Fut>(
        &self,
        label: &str,
        mut operation: F,
    ) -> Result<Attempted<T>, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::error::Error + 'static,
    {
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    });
                }
                Err(e) if !e.is_retryable() => {
                    tracing::error!("{} failed with non-retryable error: {}", label, e);
                    return Err(RetryError::Aborted { attempt, source: e });
                }
                Err(e) if attempt >= self.max_attempts => {
                    tracing::error!("{} failed after {} attempts: {}", label, attempt, e);
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    tracing::warn!("Retrying {} due to error: {}. Retry #{}", label, e, attempt);
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} attempts", self.max_attempts)?;
        if !self.delay.is_zero() {
            write!(f, ", {}ms apart", self.delay.as_millis())?;
        }
        Ok(())
    }
}
