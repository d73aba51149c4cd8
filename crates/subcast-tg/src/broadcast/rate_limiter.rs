use super::BroadcastError;
use crate::prelude::*;
use crate::Result;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a global minimum interval between outgoing messages.
///
/// There must be a single instance of this per process shared via [`std::sync::Arc`]
/// by everything that sends messages in bulk. The lock is held across the whole
/// "compute wait, sleep, stamp" sequence, so concurrent callers are queued in
/// FIFO order and none of them can observe a stale stamp and burst through.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    interval: Duration,
    last_acquired: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub(crate) fn per_second(rate: f64) -> Result<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(err!(BroadcastError::InvalidRate { rate }));
        }

        let interval = Duration::try_from_secs_f64(1.0 / rate)
            .map_err(|_| err!(BroadcastError::InvalidRate { rate }))?;

        Ok(Self::with_interval(interval))
    }

    pub(crate) fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_acquired: Mutex::new(None),
        }
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until at least [`Self::interval`] has passed since the previous
    /// acquisition anywhere in the process. Never fails, only delays.
    pub(crate) async fn acquire(&self) {
        let mut last_acquired = self.last_acquired.lock().await;

        if let Some(last) = *last_acquired {
            let deadline = last + self.interval;
            if deadline > Instant::now() {
                trace!(
                    wait = tracing_duration(deadline - Instant::now()),
                    "Waiting for the rate limiter"
                );
                tokio::time::sleep_until(deadline).await;
            }
        }

        *last_acquired = Some(Instant::now());
    }
}
