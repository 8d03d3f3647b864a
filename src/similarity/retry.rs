//! Bounded exponential backoff for embedding index calls.
//!
//! One policy object wraps every index call made by the similarity engine.
//! Only transient failures ([`VectorError::is_transient`]) are retried;
//! anything else is returned on the first occurrence.

use crate::error::{MatchError, MatchResult};
use crate::vector::VectorError;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    /// Total time after which no further attempt is started
    budget: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_secs(2))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            budget: None,
        }
    }

    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based), doubling from the base
    /// delay and capped at the maximum delay.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (retry - 1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails permanently, or the attempt or
    /// time budget runs out.
    pub fn run<T, F>(&self, operation: &'static str, mut call: F) -> MatchResult<T>
    where
        F: FnMut() -> Result<T, VectorError>,
    {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match call() {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_transient() => return Err(MatchError::Index(error)),
                Err(error) => error,
            };

            let delay = self.delay_for(attempt);
            let over_budget = self
                .budget
                .is_some_and(|budget| started.elapsed() + delay >= budget);

            if attempt >= self.max_attempts || over_budget {
                warn!(
                    operation,
                    attempts = attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "embedding index retries exhausted: {error}"
                );
                return Err(MatchError::TransientIndexFailure {
                    operation,
                    attempts: attempt,
                    cause: error,
                });
            }

            debug!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "transient index failure, retrying: {error}"
            );
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
    }
}
