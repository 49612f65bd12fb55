//! Persistence collaborator abstraction.
//!
//! The salon's records live in an external row store with realtime change
//! notification. This module describes what the queue needs from it; the
//! concrete database, its query language and the notification transport are
//! somebody else's problem.
//!
//! # Contract
//!
//! - The slot is one id-keyed record. `update_slot` merges a field-replace
//!   patch atomically; two writers racing on the same field end last-write-wins
//!   unless the patch carries a [`SlotGuard`].
//! - Change notifications carry the full record after the change. They may be
//!   late, duplicated or missing; consumers treat each one as a replacement,
//!   never as a diff.
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures instead of `async fn` so the backend can be
//! shared as `Arc<dyn ServingBackend>` by the store, the desk and the tick
//! loop.

use futures::Stream;
use salon_queue_core::error::QueueError;
use salon_queue_core::types::{
    Appointment, AppointmentId, AppointmentStatus, BarberId, CurrentServingSlot, Seat, SeatId,
    SeatUpdate, SlotGuard, SlotPatch,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors reported by a persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The record does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// A guarded slot write found a different appointment
    #[error("Precondition failed: expected {expected:?}, found {actual:?}")]
    PreconditionFailed {
        /// Appointment the writer expected
        expected: Option<AppointmentId>,
        /// Appointment actually stored
        actual: Option<AppointmentId>,
    },

    /// The store could not be reached (transient)
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The store refused the operation
    #[error("Backend rejected the request: {0}")]
    Rejected(String),

    /// Failed to subscribe to change notifications
    #[error("Subscription failed for {table}: {reason}")]
    SubscriptionFailed {
        /// Table that was requested
        table: Table,
        /// Reason for failure
        reason: String,
    },
}

impl BackendError {
    /// Whether retrying the same read may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<BackendError> for QueueError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::NotFound { entity, id } => Self::NotFound { entity, id },
            BackendError::PreconditionFailed { expected, actual } => {
                Self::Conflict { expected, actual }
            }
            other => Self::Persistence(other.to_string()),
        }
    }
}

/// Tables the queue reads and watches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// The singleton current-serving record
    ServingSlot,
    /// Appointment rows
    Appointments,
    /// Seat rows
    Seats,
}

impl Table {
    /// Table name as stored by the collaborator
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServingSlot => "current_state",
            Self::Appointments => "appointments",
            Self::Seats => "seats",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full record delivered by a change notification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "table", content = "record", rename_all = "snake_case")]
pub enum ChangeRecord {
    /// The slot after the change
    ServingSlot(CurrentServingSlot),
    /// An appointment after the change
    Appointment(Appointment),
    /// A seat after the change
    Seat(Seat),
}

impl ChangeRecord {
    /// Table the record belongs to
    #[must_use]
    pub const fn table(&self) -> Table {
        match self {
            Self::ServingSlot(_) => Table::ServingSlot,
            Self::Appointment(_) => Table::Appointments,
            Self::Seat(_) => Table::Seats,
        }
    }
}

/// Filter for appointment queries; `None` fields match everything
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentFilter {
    /// Only appointments with this barber
    pub barber_id: Option<BarberId>,
    /// Only appointments in this status
    pub status: Option<AppointmentStatus>,
}

impl AppointmentFilter {
    /// Matches every appointment
    #[must_use]
    pub const fn all() -> Self {
        Self {
            barber_id: None,
            status: None,
        }
    }

    /// Matches appointments in `status`
    #[must_use]
    pub const fn with_status(status: AppointmentStatus) -> Self {
        Self {
            barber_id: None,
            status: Some(status),
        }
    }

    /// Narrows the filter to one barber
    #[must_use]
    pub fn for_barber(mut self, barber_id: BarberId) -> Self {
        self.barber_id = Some(barber_id);
        self
    }

    /// Whether `appointment` passes the filter
    #[must_use]
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.barber_id
            .as_ref()
            .is_none_or(|barber_id| &appointment.barber_id == barber_id)
            && self.status.is_none_or(|status| appointment.status == status)
    }
}

/// Boxed future returned by backend operations
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + Send + 'a>>;

/// Stream of change notifications; dropping it unsubscribes.
pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeRecord> + Send>>;

/// The persistence collaborator.
pub trait ServingBackend: Send + Sync {
    /// Reads the slot record.
    ///
    /// # Errors
    ///
    /// [`BackendError::NotFound`] when the slot was never provisioned.
    fn get_slot(&self) -> BackendFuture<'_, CurrentServingSlot>;

    /// Merges `patch` into the slot when `guard` admits the stored record,
    /// returning the record as persisted.
    ///
    /// # Errors
    ///
    /// [`BackendError::PreconditionFailed`] when the guard rejects the write;
    /// nothing is written in that case.
    fn update_slot(&self, patch: SlotPatch, guard: SlotGuard) -> BackendFuture<'_, CurrentServingSlot>;

    /// Appointments matching `filter`, ordered by `date_time` then insertion.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_appointments(&self, filter: AppointmentFilter) -> BackendFuture<'_, Vec<Appointment>>;

    /// One appointment by id.
    ///
    /// # Errors
    ///
    /// [`BackendError::NotFound`] when no such appointment exists.
    fn get_appointment(&self, id: &AppointmentId) -> BackendFuture<'_, Appointment>;

    /// Sets an appointment's status.
    ///
    /// # Errors
    ///
    /// [`BackendError::NotFound`] when no such appointment exists.
    fn update_appointment_status(
        &self,
        id: &AppointmentId,
        status: AppointmentStatus,
    ) -> BackendFuture<'_, ()>;

    /// Every seat, in provisioning order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_seats(&self) -> BackendFuture<'_, Vec<Seat>>;

    /// Writes a seat's `{state, expires_at}`.
    ///
    /// # Errors
    ///
    /// [`BackendError::NotFound`] when no such seat exists.
    fn update_seat(&self, id: &SeatId, update: SeatUpdate) -> BackendFuture<'_, ()>;

    /// Subscribes to changes of one table.
    ///
    /// # Errors
    ///
    /// [`BackendError::SubscriptionFailed`] when the feed cannot be opened.
    fn subscribe(&self, table: Table) -> BackendFuture<'_, ChangeStream>;
}

impl fmt::Debug for dyn ServingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServingBackend")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_map_onto_queue_errors() {
        let missing: QueueError = BackendError::NotFound {
            entity: "seat",
            id: "S9".to_string(),
        }
        .into();
        assert_eq!(missing, QueueError::not_found("seat", "S9"));

        let stale: QueueError = BackendError::PreconditionFailed {
            expected: Some(AppointmentId::new("A1")),
            actual: None,
        }
        .into();
        assert!(matches!(stale, QueueError::Conflict { .. }));

        let down: QueueError = BackendError::Unavailable("timeout".to_string()).into();
        assert!(matches!(down, QueueError::Persistence(message) if message.contains("timeout")));
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(BackendError::Unavailable("x".to_string()).is_transient());
        assert!(!BackendError::Rejected("x".to_string()).is_transient());
    }

    #[test]
    fn table_names_match_collaborator() {
        assert_eq!(Table::ServingSlot.to_string(), "current_state");
        assert_eq!(
            ChangeRecord::ServingSlot(CurrentServingSlot::idle()).table(),
            Table::ServingSlot
        );
    }
}
