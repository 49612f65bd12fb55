//! Domain types for the salon serving queue.
//!
//! Identifiers are opaque strings assigned by the persistence collaborator
//! (seat "S2", appointment "A1", ...). Records mirror the rows the collaborator
//! stores; the core never creates appointments or seats, it only reads them and
//! describes updates.

use crate::error::QueueError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a physical seat
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeatId(String);

impl SeatId {
    /// Creates a `SeatId` from any string-like value
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a barber
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BarberId(String);

impl BarberId {
    /// Creates a `BarberId` from any string-like value
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BarberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an appointment
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppointmentId(String);

impl AppointmentId {
    /// Creates an `AppointmentId` from any string-like value
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Appointments
// ============================================================================

/// Lifecycle of an appointment.
///
/// ```text
/// pending ──► accepted ──► completed
///    │
///    └──────► cancelled
/// ```
///
/// Transitions are monotonic: nothing ever moves backwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    /// Booked by a customer, not yet acknowledged by the salon
    Pending,
    /// Acknowledged; waiting in the queue
    Accepted,
    /// Service finished
    Completed,
    /// Withdrawn before acceptance
    Cancelled,
}

impl AppointmentStatus {
    /// Lowercase name as stored by the collaborator
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether `self → next` is a legal forward transition
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted | Self::Cancelled) | (Self::Accepted, Self::Completed)
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A booked appointment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    /// Appointment identifier
    pub id: AppointmentId,
    /// Display name of the customer
    pub customer_name: String,
    /// Registered customer account, if any
    pub customer_id: Option<String>,
    /// Requested service time
    pub date_time: DateTime<Utc>,
    /// Requested services, in booking order
    pub services: Vec<String>,
    /// Seat the appointment was booked on
    pub seat_id: SeatId,
    /// Barber the appointment was booked with
    pub barber_id: BarberId,
    /// Current lifecycle status
    pub status: AppointmentStatus,
}

// ============================================================================
// Seats
// ============================================================================

/// Persisted occupancy state of a seat
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatState {
    /// Free to book
    Available,
    /// Held by a booking until `expires_at`
    Booked,
}

/// A physical seat in the salon
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Seat identifier
    pub id: SeatId,
    /// Human label ("Seat 1")
    pub label: String,
    /// Barber working this seat
    pub barber_id: BarberId,
    /// Persisted state
    pub state: SeatState,
    /// End of the booking hold, if booked
    pub expires_at: Option<DateTime<Utc>>,
}

impl Seat {
    /// Whether a booking hold claims the seat at `now`
    #[must_use]
    pub fn is_held(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now < expires_at)
    }

    /// Applies a seat update the way the collaborator would
    pub fn apply(&mut self, update: &SeatUpdate) {
        self.state = update.state;
        self.expires_at = update.expires_at;
    }
}

/// Write-back for a seat: `{state, expires_at}`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatUpdate {
    /// New persisted state
    pub state: SeatState,
    /// New hold expiry (None clears it)
    pub expires_at: Option<DateTime<Utc>>,
}

impl SeatUpdate {
    /// Update returning a seat to the available pool
    #[must_use]
    pub const fn release() -> Self {
        Self {
            state: SeatState::Available,
            expires_at: None,
        }
    }

    /// Update holding a seat until `expires_at`
    #[must_use]
    pub const fn hold_until(expires_at: DateTime<Utc>) -> Self {
        Self {
            state: SeatState::Booked,
            expires_at: Some(expires_at),
        }
    }
}

// ============================================================================
// Current serving slot
// ============================================================================

/// The singleton "now serving" record.
///
/// Reset to [`CurrentServingSlot::idle`] instead of being deleted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentServingSlot {
    /// Customer being served
    pub customer_name: Option<String>,
    /// Seat the customer occupies
    pub seat_id: Option<SeatId>,
    /// Barber serving the customer
    pub barber_id: Option<BarberId>,
    /// Appointment being served
    pub appointment_id: Option<AppointmentId>,
    /// Expected service length
    pub approx_duration_minutes: Option<u32>,
    /// When the countdown was (re)started
    pub timer_started_at: Option<DateTime<Utc>>,
    /// Whether the countdown is paused
    pub paused: bool,
    /// Remaining seconds frozen at the moment of pausing
    pub paused_remaining_seconds: Option<u64>,
}

impl CurrentServingSlot {
    /// A slot with nobody being served
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            customer_name: None,
            seat_id: None,
            barber_id: None,
            appointment_id: None,
            approx_duration_minutes: None,
            timer_started_at: None,
            paused: false,
            paused_remaining_seconds: None,
        }
    }

    /// Idle when neither a customer nor an appointment is assigned
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.customer_name.is_none() && self.appointment_id.is_none()
    }

    /// Both customer and appointment are identified, so a service can start
    #[must_use]
    pub const fn has_service_target(&self) -> bool {
        self.customer_name.is_some() && self.appointment_id.is_some()
    }

    /// Whether a countdown has been started
    #[must_use]
    pub const fn timer_started(&self) -> bool {
        self.timer_started_at.is_some()
    }

    /// Checks the record invariants.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidState`] when a started timer has no
    /// duration, or a frozen remainder exists without a paused running timer.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.timer_started_at.is_some() && self.approx_duration_minutes.is_none() {
            return Err(QueueError::InvalidState(
                "timer started without a duration".to_string(),
            ));
        }
        if self.paused_remaining_seconds.is_some() && !(self.paused && self.timer_started()) {
            return Err(QueueError::InvalidState(
                "frozen remaining time recorded on a slot that is not paused".to_string(),
            ));
        }
        Ok(())
    }
}

/// Field-replace patch for the slot record.
///
/// `None` leaves a field untouched; `Some(value)` replaces it (and
/// `Some(None)` clears an optional field). The store always sends a full patch
/// so a write is a whole-record replacement.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::option_option)] // Distinguishes "untouched" from "cleared"
pub struct SlotPatch {
    /// Replacement customer name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<Option<String>>,
    /// Replacement seat
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_id: Option<Option<SeatId>>,
    /// Replacement barber
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barber_id: Option<Option<BarberId>>,
    /// Replacement appointment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<Option<AppointmentId>>,
    /// Replacement duration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approx_duration_minutes: Option<Option<u32>>,
    /// Replacement timer start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer_started_at: Option<Option<DateTime<Utc>>>,
    /// Replacement pause flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    /// Replacement frozen remainder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_remaining_seconds: Option<Option<u64>>,
}

impl SlotPatch {
    /// Patch replacing every field with the values of `slot`
    #[must_use]
    pub fn full(slot: &CurrentServingSlot) -> Self {
        Self {
            customer_name: Some(slot.customer_name.clone()),
            seat_id: Some(slot.seat_id.clone()),
            barber_id: Some(slot.barber_id.clone()),
            appointment_id: Some(slot.appointment_id.clone()),
            approx_duration_minutes: Some(slot.approx_duration_minutes),
            timer_started_at: Some(slot.timer_started_at),
            paused: Some(slot.paused),
            paused_remaining_seconds: Some(slot.paused_remaining_seconds),
        }
    }

    /// Whether the patch touches nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merges the patch into `slot`
    pub fn apply_to(&self, slot: &mut CurrentServingSlot) {
        if let Some(value) = &self.customer_name {
            slot.customer_name.clone_from(value);
        }
        if let Some(value) = &self.seat_id {
            slot.seat_id.clone_from(value);
        }
        if let Some(value) = &self.barber_id {
            slot.barber_id.clone_from(value);
        }
        if let Some(value) = &self.appointment_id {
            slot.appointment_id.clone_from(value);
        }
        if let Some(value) = self.approx_duration_minutes {
            slot.approx_duration_minutes = value;
        }
        if let Some(value) = self.timer_started_at {
            slot.timer_started_at = value;
        }
        if let Some(value) = self.paused {
            slot.paused = value;
        }
        if let Some(value) = self.paused_remaining_seconds {
            slot.paused_remaining_seconds = value;
        }
    }
}

/// Precondition attached to a slot write.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotGuard {
    /// Last write wins
    #[default]
    Unconditional,
    /// Only write when the persisted slot still serves this appointment
    AppointmentIs(Option<AppointmentId>),
}

impl SlotGuard {
    /// Whether the persisted slot satisfies the precondition
    #[must_use]
    pub fn admits(&self, current: &CurrentServingSlot) -> bool {
        match self {
            Self::Unconditional => true,
            Self::AppointmentIs(expected) => current.appointment_id == *expected,
        }
    }

    /// Builds the conflict error for a rejected write
    #[must_use]
    pub fn conflict(&self, current: &CurrentServingSlot) -> QueueError {
        let expected = match self {
            Self::Unconditional => None,
            Self::AppointmentIs(expected) => expected.clone(),
        };
        QueueError::Conflict {
            expected,
            actual: current.appointment_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn serving() -> CurrentServingSlot {
        CurrentServingSlot {
            customer_name: Some("Jane".to_string()),
            seat_id: Some(SeatId::new("S2")),
            barber_id: Some(BarberId::new("B1")),
            appointment_id: Some(AppointmentId::new("A1")),
            approx_duration_minutes: Some(30),
            ..CurrentServingSlot::idle()
        }
    }

    #[test]
    fn status_transitions_are_monotonic() {
        use AppointmentStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Accepted.can_transition_to(Completed));
        assert!(!Accepted.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Accepted));
        assert!(!Completed.can_transition_to(Completed));
        assert!(!Cancelled.can_transition_to(Accepted));
        assert!(Completed.is_terminal());
        assert!(!Accepted.is_terminal());
    }

    #[test]
    fn status_displays_lowercase() {
        assert_eq!(AppointmentStatus::Accepted.to_string(), "accepted");
        assert_eq!(AppointmentStatus::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn idle_slot_has_no_target() {
        let slot = CurrentServingSlot::idle();
        assert!(slot.is_idle());
        assert!(!slot.has_service_target());
        assert_eq!(slot, CurrentServingSlot::default());
    }

    #[test]
    fn validate_rejects_timer_without_duration() {
        let slot = CurrentServingSlot {
            timer_started_at: Some(Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()),
            approx_duration_minutes: None,
            ..serving()
        };
        assert!(matches!(slot.validate(), Err(QueueError::InvalidState(_))));
    }

    #[test]
    fn validate_rejects_frozen_remainder_when_not_paused() {
        let slot = CurrentServingSlot {
            timer_started_at: Some(Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()),
            paused_remaining_seconds: Some(120),
            ..serving()
        };
        assert!(slot.validate().is_err());
    }

    #[test]
    fn full_patch_replaces_every_field() {
        let mut target = serving();
        SlotPatch::full(&CurrentServingSlot::idle()).apply_to(&mut target);
        assert_eq!(target, CurrentServingSlot::idle());
    }

    #[test]
    fn partial_patch_leaves_other_fields() {
        let mut target = serving();
        let patch = SlotPatch {
            paused: Some(true),
            ..SlotPatch::default()
        };
        patch.apply_to(&mut target);
        assert!(target.paused);
        assert_eq!(target.customer_name.as_deref(), Some("Jane"));
        assert!(SlotPatch::default().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn guard_compares_appointment() {
        let slot = serving();
        assert!(SlotGuard::Unconditional.admits(&slot));
        assert!(SlotGuard::AppointmentIs(Some(AppointmentId::new("A1"))).admits(&slot));

        let stale = SlotGuard::AppointmentIs(Some(AppointmentId::new("A0")));
        assert!(!stale.admits(&slot));
        assert_eq!(
            stale.conflict(&slot),
            QueueError::Conflict {
                expected: Some(AppointmentId::new("A0")),
                actual: Some(AppointmentId::new("A1")),
            }
        );
    }

    #[test]
    fn seat_hold_window() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let mut seat = Seat {
            id: SeatId::new("S1"),
            label: "Seat 1".to_string(),
            barber_id: BarberId::new("B1"),
            state: SeatState::Available,
            expires_at: None,
        };
        assert!(!seat.is_held(now));

        seat.apply(&SeatUpdate::hold_until(now + chrono::Duration::minutes(15)));
        assert_eq!(seat.state, SeatState::Booked);
        assert!(seat.is_held(now));
        assert!(!seat.is_held(now + chrono::Duration::minutes(15)));

        seat.apply(&SeatUpdate::release());
        assert_eq!(seat.state, SeatState::Available);
        assert_eq!(seat.expires_at, None);
    }
}
