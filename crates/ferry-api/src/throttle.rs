//! Process-wide request limiter for one tool.
//!
//! A tool's rate limit applies to the credentials, not to a workspace or an
//! entity group, so every request to a tool goes through the same `Throttle`.

use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;

use crate::ApiError;

/// Bounds in-flight requests and spaces out their starts.
#[derive(Debug)]
pub struct Throttle {
    permits: Semaphore,
    max_in_flight: usize,
    min_spacing: Duration,
    next_start: Mutex<Option<Instant>>,
}

/// Held for the duration of one request.
#[derive(Debug)]
pub struct ThrottlePermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl Throttle {
    pub fn new(max_in_flight: usize, min_spacing: Duration) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            permits: Semaphore::new(max_in_flight),
            max_in_flight,
            min_spacing,
            next_start: Mutex::new(None),
        }
    }

    /// A throttle that only bounds concurrency.
    pub fn concurrency(max_in_flight: usize) -> Self {
        Self::new(max_in_flight, Duration::ZERO)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Wait for a request slot.
    pub async fn acquire(&self) -> Result<ThrottlePermit<'_>, ApiError> {
        let permit = self.permits.acquire().await?;

        if !self.min_spacing.is_zero() {
            let start_at = {
                let mut next_start = self.next_start.lock().await;
                let now = Instant::now();
                let start_at = match *next_start {
                    Some(scheduled) if scheduled > now => scheduled,
                    _ => now,
                };
                *next_start = Some(start_at + self.min_spacing);
                start_at
            };
            tokio::time::sleep_until(start_at).await;
        }

        Ok(ThrottlePermit { _permit: permit })
    }
}
