//! Rate-limited fan-out of a single message to every subscriber.
//!
//! The [`BroadcastEngine`] walks the subscriber list with a [`SubscriberCursor`],
//! paces every dispatch attempt through the process-wide [`RateLimiter`] and
//! folds per-recipient failures into a [`BroadcastReport`] instead of
//! propagating them. Only a failure of the subscriber store aborts a run.

mod classify;
mod cursor;
mod engine;
mod progress;
mod rate_limiter;
mod report;
mod store;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

use serde::Deserialize;
use std::num::{NonZeroU32, NonZeroU64};
use std::time::Duration;

pub(crate) use classify::*;
pub(crate) use cursor::*;
pub(crate) use engine::*;
pub(crate) use progress::*;
pub(crate) use rate_limiter::*;
pub(crate) use report::*;
pub(crate) use store::*;
pub(crate) use transport::*;

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct Config {
    /// Global pace of outgoing broadcast messages per second
    #[serde(default = "default_rate")]
    pub(crate) rate: f64,

    /// Number of subscribers fetched from the database at once
    #[serde(default = "default_batch_size")]
    pub(crate) batch_size: NonZeroU32,

    /// Emit a progress snapshot every this many processed subscribers
    #[serde(default = "default_progress_every")]
    pub(crate) progress_every: NonZeroU64,

    /// Added on top of the `retry_after` requested by Telegram's flood control
    #[serde(default = "default_retry_margin_ms")]
    pub(crate) retry_margin_ms: u64,

    /// How long the bot waits on shutdown for the cancelled broadcast to
    /// send its report. Should exceed the usual flood control back-off.
    #[serde(default = "default_shutdown_grace_secs")]
    pub(crate) shutdown_grace_secs: u64,
}

impl Config {
    pub(crate) fn retry_margin(&self) -> Duration {
        Duration::from_millis(self.retry_margin_ms)
    }

    pub(crate) fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            batch_size: default_batch_size(),
            progress_every: default_progress_every(),
            retry_margin_ms: default_retry_margin_ms(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_rate() -> f64 {
    // Telegram allows ~30 messages per second for bulk notifications.
    // Leave some headroom for the replies the bot sends meanwhile.
    25.0
}

fn default_batch_size() -> NonZeroU32 {
    NonZeroU32::new(1000).expect("BUG: default batch size must not be zero")
}

fn default_progress_every() -> NonZeroU64 {
    NonZeroU64::new(500).expect("BUG: default progress cadence must not be zero")
}

fn default_retry_margin_ms() -> u64 {
    500
}

fn default_shutdown_grace_secs() -> u64 {
    60
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum BroadcastError {
    #[error("Broadcast rate must be a finite positive number of messages per second, but got {rate}")]
    InvalidRate { rate: f64 },
}
