//! Countdown timer for the service in progress.
//!
//! The persisted triple `(timer_started_at, approx_duration_minutes, paused)`
//! is the only source of truth. The countdown a client displays is recomputed
//! from it and the clock on every observation; nothing here keeps its own
//! timeline.
//!
//! # Pause semantics
//!
//! Pausing freezes the remaining seconds into `paused_remaining_seconds`.
//! Resuming moves `timer_started_at` forward by exactly the time spent paused,
//! so a paused service loses no time.

use crate::error::{QueueError, Result};
use crate::types::CurrentServingSlot;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Seconds in one minute of service time
pub const SECONDS_PER_MINUTE: u64 = 60;

/// Derived view of the countdown at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    /// Seconds left on the countdown (0 when idle or expired)
    pub remaining_seconds: u64,
    /// A countdown was started and has time left
    pub is_running: bool,
    /// The countdown is paused
    pub is_paused: bool,
}

impl TimerSnapshot {
    /// Snapshot shown when no timer exists
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            remaining_seconds: 0,
            is_running: false,
            is_paused: false,
        }
    }

    /// `mm:ss` rendering of the remaining time
    #[must_use]
    pub fn countdown(&self) -> String {
        format_countdown(self.remaining_seconds)
    }

    /// Whether a running countdown is under `threshold_seconds`
    #[must_use]
    pub const fn is_low(&self, threshold_seconds: u64) -> bool {
        self.is_running && self.remaining_seconds < threshold_seconds
    }
}

/// Formats seconds as `mm:ss`; minutes are not wrapped into hours.
#[must_use]
pub fn format_countdown(seconds: u64) -> String {
    format!(
        "{:02}:{:02}",
        seconds / SECONDS_PER_MINUTE,
        seconds % SECONDS_PER_MINUTE
    )
}

/// Pure timer transitions over the serving slot.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimerEngine;

impl TimerEngine {
    /// Full countdown length, when a duration is set
    #[must_use]
    pub fn total_seconds(slot: &CurrentServingSlot) -> Option<u64> {
        slot.approx_duration_minutes
            .map(|minutes| u64::from(minutes) * SECONDS_PER_MINUTE)
    }

    /// Seconds left on the countdown at `now`.
    ///
    /// `max(0, total - floor(now - started))`, or the frozen value while
    /// paused. Returns 0 when no timer was started. A start time in the future
    /// (clock skew between clients) counts as zero elapsed.
    #[must_use]
    pub fn compute_remaining(slot: &CurrentServingSlot, now: DateTime<Utc>) -> u64 {
        let (Some(started), Some(total)) = (slot.timer_started_at, Self::total_seconds(slot)) else {
            return 0;
        };

        if slot.paused {
            if let Some(frozen) = slot.paused_remaining_seconds {
                return frozen.min(total);
            }
        }

        let elapsed = u64::try_from((now - started).num_seconds()).unwrap_or(0);
        total.saturating_sub(elapsed)
    }

    /// Snapshot of the countdown at `now`. Never fails.
    #[must_use]
    pub fn snapshot(slot: &CurrentServingSlot, now: DateTime<Utc>) -> TimerSnapshot {
        if !slot.timer_started() {
            return TimerSnapshot::idle();
        }
        let remaining_seconds = Self::compute_remaining(slot, now);
        TimerSnapshot {
            remaining_seconds,
            is_running: remaining_seconds > 0,
            is_paused: slot.paused,
        }
    }

    /// Starts (or restarts) the countdown for `minutes`.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidState`] when the slot has no customer or no
    /// appointment to serve.
    pub fn start(
        slot: &CurrentServingSlot,
        minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<CurrentServingSlot> {
        if !slot.has_service_target() {
            return Err(QueueError::InvalidState(
                "cannot start the timer: no customer and appointment assigned".to_string(),
            ));
        }

        Ok(CurrentServingSlot {
            approx_duration_minutes: Some(minutes),
            timer_started_at: Some(now),
            paused: false,
            paused_remaining_seconds: None,
            ..slot.clone()
        })
    }

    /// Flips the pause flag.
    ///
    /// Pausing a started timer freezes the remaining seconds; resuming shifts
    /// the start forward so the countdown continues from the frozen value.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidState`] when nobody is being served or the
    /// countdown has not been started.
    pub fn toggle_pause(slot: &CurrentServingSlot, now: DateTime<Utc>) -> Result<CurrentServingSlot> {
        if slot.is_idle() {
            return Err(QueueError::InvalidState(
                "cannot pause: nobody is being served".to_string(),
            ));
        }
        if !slot.timer_started() {
            return Err(QueueError::InvalidState(
                "cannot pause: the timer has not started".to_string(),
            ));
        }

        let mut next = slot.clone();

        if slot.paused {
            let total = Self::total_seconds(slot).unwrap_or(0);
            let frozen = Self::compute_remaining(slot, now);
            let consumed = i64::try_from(total.saturating_sub(frozen)).unwrap_or(i64::MAX);
            next.timer_started_at = Some(now - Duration::seconds(consumed));
            next.paused = false;
            next.paused_remaining_seconds = None;
        } else {
            next.paused_remaining_seconds = Some(Self::compute_remaining(slot, now));
            next.paused = true;
        }
        Ok(next)
    }

    /// Replaces the service length and restarts the countdown at it.
    ///
    /// A slot whose timer was never started only records the new duration;
    /// starting remains an explicit operator action. A paused slot stays
    /// paused with the full new duration frozen.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidState`] when nobody is being served.
    pub fn update_duration(
        slot: &CurrentServingSlot,
        minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<CurrentServingSlot> {
        if slot.is_idle() {
            return Err(QueueError::InvalidState(
                "cannot change the duration: nobody is being served".to_string(),
            ));
        }

        let mut next = slot.clone();
        next.approx_duration_minutes = Some(minutes);
        if slot.timer_started() {
            next.timer_started_at = Some(now);
            if slot.paused {
                next.paused_remaining_seconds = Some(u64::from(minutes) * SECONDS_PER_MINUTE);
            }
        }
        Ok(next)
    }

    /// Clears the countdown, keeping the service target
    #[must_use]
    pub fn stop(slot: &CurrentServingSlot) -> CurrentServingSlot {
        CurrentServingSlot {
            timer_started_at: None,
            paused: false,
            paused_remaining_seconds: None,
            ..slot.clone()
        }
    }
}
