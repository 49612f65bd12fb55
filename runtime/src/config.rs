//! Desk configuration.
//!
//! Loads settings from `SALON_*` environment variables with defaults that
//! match the salon's front-end behaviour.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Settings for one desk session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeskConfig {
    /// Service length assigned when an appointment enters the slot
    pub default_service_minutes: u32,
    /// How long a booking holds a seat
    pub seat_hold_minutes: u32,
    /// Tick period of the session loop, in milliseconds
    pub tick_interval_ms: u64,
    /// Remaining seconds under which the countdown is flagged as low
    pub low_time_threshold_seconds: u64,
    /// Capacity of the slot broadcast channel
    pub broadcast_capacity: usize,
    /// Retry settings for collaborator reads
    pub read_retry: ReadRetryConfig,
}

/// Retry settings for collaborator reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRetryConfig {
    /// Retries after the first attempt
    pub max_retries: usize,
    /// Delay before the first retry, in milliseconds
    pub initial_delay_ms: u64,
    /// Cap on a single delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            default_service_minutes: 30,
            seat_hold_minutes: 15,
            tick_interval_ms: 1000,
            low_time_threshold_seconds: 60,
            broadcast_capacity: 16,
            read_retry: ReadRetryConfig::default(),
        }
    }
}

impl Default for ReadRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

impl ReadRetryConfig {
    /// Backoff policy for these settings
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_retries)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .build()
    }
}

impl DeskConfig {
    /// Loads configuration from the process environment.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to
    /// its value.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let retry_defaults = ReadRetryConfig::default();

        Self {
            default_service_minutes: parsed::<u32>(&lookup, "SALON_DEFAULT_SERVICE_MINUTES")
                .filter(|minutes| *minutes > 0)
                .unwrap_or(defaults.default_service_minutes),
            seat_hold_minutes: parsed::<u32>(&lookup, "SALON_SEAT_HOLD_MINUTES")
                .filter(|minutes| *minutes > 0)
                .unwrap_or(defaults.seat_hold_minutes),
            tick_interval_ms: parsed::<u64>(&lookup, "SALON_TICK_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.tick_interval_ms),
            low_time_threshold_seconds: parsed::<u64>(&lookup, "SALON_LOW_TIME_THRESHOLD_SECONDS")
                .unwrap_or(defaults.low_time_threshold_seconds),
            broadcast_capacity: parsed::<usize>(&lookup, "SALON_BROADCAST_CAPACITY")
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.broadcast_capacity),
            read_retry: ReadRetryConfig {
                max_retries: parsed::<usize>(&lookup, "SALON_READ_MAX_RETRIES")
                    .unwrap_or(retry_defaults.max_retries),
                initial_delay_ms: parsed::<u64>(&lookup, "SALON_READ_RETRY_INITIAL_DELAY_MS")
                    .unwrap_or(retry_defaults.initial_delay_ms),
                max_delay_ms: parsed::<u64>(&lookup, "SALON_READ_RETRY_MAX_DELAY_MS")
                    .unwrap_or(retry_defaults.max_delay_ms),
            },
        }
    }

    /// Tick period
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Seat hold length
    #[must_use]
    pub fn seat_hold(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.seat_hold_minutes))
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable setting, using default");
            None
        }
    }
}
