//! Backoff schedule for eventually-consistent lookups.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Default waits between audit lookups, in milliseconds.
pub const DEFAULT_RETRY_DELAYS_MS: [u64; 3] = [500, 1200, 2500];

/// Fixed sequence of waits between lookup attempts.
///
/// A schedule of `n` delays allows at most `n + 1` attempts: one immediate
/// lookup followed by one retry after each delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    /// Build a schedule from explicit delays.
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// No retries: a single immediate attempt.
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }

    /// Parse a comma-separated list of milliseconds (e.g. `"500,1200,2500"`).
    pub fn parse_millis(raw: &str) -> Result<Self, std::num::ParseIntError> {
        let delays = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<u64>().map(Duration::from_millis))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { delays })
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Maximum number of attempts this schedule permits.
    pub fn max_attempts(&self) -> u32 {
        self.delays.len() as u32 + 1
    }

    /// Upper bound on time spent sleeping across all retries.
    pub fn total_wait(&self) -> Duration {
        self.delays.iter().sum()
    }

    /// Run `op` until it yields a value or the schedule is exhausted.
    ///
    /// The first attempt is immediate; each later attempt waits the next
    /// delay first. `Ok(None)` and `Err` both count as a miss. `op` receives
    /// the 1-based attempt number.
    pub async fn retry<T, E, F, Fut>(&self, mut op: F) -> Retried<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Display,
    {
        let waits = std::iter::once(Duration::ZERO).chain(self.delays.iter().copied());
        let mut attempts = 0;

        for wait in waits {
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            attempts += 1;

            match op(attempts).await {
                Ok(Some(value)) => {
                    return Retried {
                        value: Some(value),
                        attempts,
                    }
                }
                Ok(None) => debug!(attempt = attempts, "Lookup found nothing yet"),
                Err(e) => debug!(attempt = attempts, error = %e, "Lookup attempt failed"),
            }
        }

        Retried {
            value: None,
            attempts,
        }
    }
}

/// Result of [`BackoffSchedule::retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: Option<T>,
    pub attempts: u32,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new(
            DEFAULT_RETRY_DELAYS_MS
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
        )
    }
}
