//! # Salon Queue Core
//!
//! Pure state machine behind the salon "now serving" board.
//!
//! A single shared [`CurrentServingSlot`](types::CurrentServingSlot) says which
//! customer, seat and barber are being served and carries the countdown timer.
//! Everything in this crate is a pure function of that slot, the appointment
//! and seat records, and the current time. All I/O lives in the runtime crate.
//!
//! ## Core Concepts
//!
//! - **Slot**: the singleton current-serving record
//! - **Queue**: accepted appointments waiting for service, served oldest first
//! - **Projection**: a derived view (timer countdown, seat colour) computed from
//!   persisted state plus the clock, never stored
//! - **Command**: a pure transition `(slot, now) → slot` applied by the store
//!
//! ## Architecture Principles
//!
//! - Functional core, imperative shell
//! - Time is injected through [`environment::Clock`]
//! - Every transition is fallible and returns a typed [`error::QueueError`]
//!
//! ## Example
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use salon_queue_core::timer::TimerEngine;
//! use salon_queue_core::types::{AppointmentId, CurrentServingSlot, SeatId};
//!
//! let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
//! let slot = CurrentServingSlot {
//!     customer_name: Some("Jane".to_string()),
//!     seat_id: Some(SeatId::new("S2")),
//!     appointment_id: Some(AppointmentId::new("A1")),
//!     ..CurrentServingSlot::idle()
//! };
//!
//! let running = TimerEngine::start(&slot, 30, t0).unwrap();
//! let snapshot = TimerEngine::snapshot(&running, t0 + Duration::seconds(90));
//! assert_eq!(snapshot.remaining_seconds, 30 * 60 - 90);
//! assert!(snapshot.is_running);
//! ```

pub use chrono::{DateTime, Utc};

/// Domain records: slot, appointments, seats and their identifiers
pub mod types;

/// Error type shared by every queue operation
pub mod error;

/// Countdown computation and pause/resume/restart transitions
pub mod timer;

/// Seat colouring and booking-hold expiry detection
pub mod seats;

/// FIFO selection of the next appointment and advance planning
pub mod queue;

/// Slot commands issued by the operator, applied as pure transitions
pub mod command;

/// Environment module - injected dependencies
///
/// Time is the only ambient dependency of the core. Runtime code receives an
/// `Arc<dyn Clock>` so tests can substitute a fixed or manually advanced clock.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use salon_queue_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by [`Utc::now`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use error::{QueueError, Result};
pub use timer::{TimerEngine, TimerSnapshot};
pub use types::{
    Appointment, AppointmentId, AppointmentStatus, BarberId, CurrentServingSlot, Seat, SeatId,
    SeatState, SeatUpdate, SlotGuard, SlotPatch,
};
