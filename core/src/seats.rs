//! Seat availability projection.
//!
//! A seat's colour is derived, never stored:
//!
//! 1. the seat of the current service, while its timer runs → currently served
//! 2. a seat whose booking hold has not expired → booked
//! 3. anything else → available
//!
//! Hold expiry is level-triggered: each tick looks at every booked seat and
//! reports the ones whose hold has lapsed. The projector remembers what it has
//! already reported so a lapsed seat produces one event, not one per tick,
//! until the write-back lands (or fails and is forgotten for a retry).

use crate::error::{QueueError, Result};
use crate::timer::TimerEngine;
use crate::types::{CurrentServingSlot, Seat, SeatId, SeatState, SeatUpdate};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a seat is shown to customers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeatDisplay {
    /// Free (green)
    Available,
    /// Held by a booking (amber)
    Booked,
    /// Occupied by the customer being served (red)
    CurrentlyServed,
}

impl SeatDisplay {
    /// Colour name used by the board
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Available => "green",
            Self::Booked => "amber",
            Self::CurrentlyServed => "red",
        }
    }
}

/// Projected state of one seat
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatView {
    /// Seat identifier
    pub seat_id: SeatId,
    /// Seat label
    pub label: String,
    /// Derived display state
    pub display: SeatDisplay,
    /// Seconds left on the booking hold, when booked
    pub hold_remaining_seconds: Option<u64>,
}

/// A booking hold that has lapsed and must be written back as available
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatExpired {
    /// Seat to release
    pub seat_id: SeatId,
    /// When the hold ended
    pub expired_at: DateTime<Utc>,
}

/// Result of one projection tick
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeatTick {
    /// Every seat, in input order
    pub views: Vec<SeatView>,
    /// Holds that lapsed since the last tick
    pub expired: Vec<SeatExpired>,
}

/// Derives seat display states and detects lapsed holds.
#[derive(Clone, Debug, Default)]
pub struct SeatAvailabilityProjector {
    reported: HashSet<SeatId>,
}

impl SeatAvailabilityProjector {
    /// Creates a projector with no reported expiries
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the slot is actively serving on `seat` at `now`
    #[must_use]
    pub fn is_served(seat: &Seat, slot: &CurrentServingSlot, now: DateTime<Utc>) -> bool {
        slot.seat_id.as_ref() == Some(&seat.id) && TimerEngine::snapshot(slot, now).is_running
    }

    /// Display state of one seat at `now`
    #[must_use]
    pub fn project(seat: &Seat, slot: &CurrentServingSlot, now: DateTime<Utc>) -> SeatDisplay {
        if Self::is_served(seat, slot, now) {
            SeatDisplay::CurrentlyServed
        } else if seat.is_held(now) {
            SeatDisplay::Booked
        } else {
            SeatDisplay::Available
        }
    }

    /// Full view of one seat at `now`
    #[must_use]
    pub fn view(seat: &Seat, slot: &CurrentServingSlot, now: DateTime<Utc>) -> SeatView {
        let display = Self::project(seat, slot, now);
        let hold_remaining_seconds = match (display, seat.expires_at) {
            (SeatDisplay::Booked, Some(expires_at)) => {
                Some(u64::try_from((expires_at - now).num_seconds()).unwrap_or(0))
            }
            _ => None,
        };
        SeatView {
            seat_id: seat.id.clone(),
            label: seat.label.clone(),
            display,
            hold_remaining_seconds,
        }
    }

    /// Whether `seat` is booked, not being served, and past its hold
    #[must_use]
    pub fn hold_lapsed(seat: &Seat, slot: &CurrentServingSlot, now: DateTime<Utc>) -> bool {
        seat.state == SeatState::Booked
            && seat.expires_at.is_some_and(|expires_at| now >= expires_at)
            && !Self::is_served(seat, slot, now)
    }

    /// Projects every seat and reports newly lapsed holds.
    pub fn tick(
        &mut self,
        seats: &[Seat],
        slot: &CurrentServingSlot,
        now: DateTime<Utc>,
    ) -> SeatTick {
        let mut tick = SeatTick::default();

        for seat in seats {
            tick.views.push(Self::view(seat, slot, now));

            if !Self::hold_lapsed(seat, slot, now) {
                self.reported.remove(&seat.id);
                continue;
            }

            if self.reported.insert(seat.id.clone()) {
                if let Some(expired_at) = seat.expires_at {
                    tick.expired.push(SeatExpired {
                        seat_id: seat.id.clone(),
                        expired_at,
                    });
                }
            }
        }

        tick
    }

    /// Allows a lapsed seat to be reported again (after a failed write-back)
    pub fn forget(&mut self, seat_id: &SeatId) {
        self.reported.remove(seat_id);
    }

    /// Builds the update holding `seat` for `hold` from `now`.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidState`] when the seat is already held or is the
    /// seat of the service in progress.
    pub fn hold(
        seat: &Seat,
        slot: &CurrentServingSlot,
        now: DateTime<Utc>,
        hold: Duration,
    ) -> Result<SeatUpdate> {
        match Self::project(seat, slot, now) {
            SeatDisplay::Available => Ok(SeatUpdate::hold_until(now + hold)),
            SeatDisplay::Booked => Err(QueueError::InvalidState(format!(
                "seat {} is already held",
                seat.id
            ))),
            SeatDisplay::CurrentlyServed => Err(QueueError::InvalidState(format!(
                "seat {} is being served",
                seat.id
            ))),
        }
    }
}
