//! Operator commands against the serving slot.
//!
//! Each command is a pure transition `(slot, now) → slot`. The store reads the
//! persisted slot, applies the command and writes the result back as one
//! replacement, so the same command produces the same record on every client.

use crate::error::Result;
use crate::timer::TimerEngine;
use crate::types::{Appointment, CurrentServingSlot};
use crate::queue::QueueAdvancer;
use chrono::{DateTime, Utc};

/// A transition of the serving slot requested by the operator
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotCommand {
    /// Start the countdown for the customer in the slot
    StartService {
        /// Service length
        minutes: u32,
    },
    /// Pause a running countdown or resume a paused one
    TogglePause,
    /// Restart the countdown at a new length
    UpdateDuration {
        /// New service length
        minutes: u32,
    },
    /// Move an accepted appointment into the idle slot
    MoveToServing {
        /// Appointment to serve
        appointment: Box<Appointment>,
        /// Service length assigned on entry
        default_minutes: u32,
    },
    /// Reset the slot to idle without completing anything
    Clear,
}

impl SlotCommand {
    /// Short name for logs and metrics
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StartService { .. } => "start_service",
            Self::TogglePause => "toggle_pause",
            Self::UpdateDuration { .. } => "update_duration",
            Self::MoveToServing { .. } => "move_to_serving",
            Self::Clear => "clear",
        }
    }

    /// Applies the command to `slot` at `now`.
    ///
    /// # Errors
    ///
    /// Propagates the [`QueueError::InvalidState`](crate::error::QueueError)
    /// of the underlying transition.
    pub fn apply(&self, slot: &CurrentServingSlot, now: DateTime<Utc>) -> Result<CurrentServingSlot> {
        match self {
            Self::StartService { minutes } => TimerEngine::start(slot, *minutes, now),
            Self::TogglePause => TimerEngine::toggle_pause(slot, now),
            Self::UpdateDuration { minutes } => TimerEngine::update_duration(slot, *minutes, now),
            Self::MoveToServing {
                appointment,
                default_minutes,
            } => QueueAdvancer::new(*default_minutes).populate(slot, appointment),
            Self::Clear => Ok(CurrentServingSlot::idle()),
        }
    }
}
