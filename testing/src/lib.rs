//! # Salon Queue Testing
//!
//! Test support for the salon serving queue.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`InMemoryBackend`], a collaborator with change notifications, failure
//!   injection and call counters
//! - Fixture builders for appointments and seats
//! - proptest strategies for timer properties
//!
//! ## Example
//!
//! ```ignore
//! use salon_queue_core::types::AppointmentId;
//! use salon_queue_testing::{fixtures, test_clock, InMemoryBackend};
//!
//! #[tokio::test]
//! async fn accepting_leaves_the_slot_alone() {
//!     let backend = InMemoryBackend::new()
//!         .with_appointments(vec![fixtures::appointment("A1").pending().build()]);
//!     let desk = fixtures::desk(&backend, test_clock());
//!
//!     desk.accept_appointment(&AppointmentId::new("A1")).await.unwrap();
//!     assert!(desk.store().read().await.unwrap().is_idle());
//! }
//! ```

use chrono::{DateTime, Utc};
use salon_queue_core::environment::Clock;

/// In-memory persistence collaborator
pub mod backend;

/// Builders for appointments, seats and wired-up desks
pub mod fixtures;

/// proptest strategies
pub mod properties;

/// Deterministic clocks.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// Clock that always returns the same instant.
    ///
    /// # Example
    ///
    /// ```
    /// use salon_queue_testing::mocks::FixedClock;
    /// use salon_queue_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Creates a clock frozen at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock moved explicitly by the test.
    ///
    /// Clones share the same time, so a test keeps one handle and gives the
    /// other to the desk.
    ///
    /// # Example
    ///
    /// ```
    /// use salon_queue_testing::mocks::ManualClock;
    /// use salon_queue_core::environment::Clock;
    /// use chrono::Duration;
    ///
    /// let start = salon_queue_testing::t0();
    /// let clock = ManualClock::starting_at(start);
    /// let handle = clock.clone();
    /// handle.advance(Duration::seconds(90));
    /// assert_eq!(clock.now(), start + Duration::seconds(90));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    #[allow(clippy::unwrap_used)] // Poisoning only follows a panicking test
    impl ManualClock {
        /// Creates a clock reading `time`
        #[must_use]
        pub fn starting_at(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Moves the clock forward by `by`
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }

        /// Sets the clock to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap() = time;
        }
    }

    #[allow(clippy::unwrap_used)]
    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// Fixed clock at [`t0`](crate::t0)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(crate::t0())
    }
}

/// 2025-01-01 09:00:00 UTC, the reference instant used across tests
///
/// # Panics
///
/// Never in practice; the timestamp is hardcoded.
#[must_use]
#[allow(clippy::expect_used)]
pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-01-01T09:00:00Z")
        .expect("hardcoded timestamp should always parse")
        .with_timezone(&Utc)
}

/// Installs a fmt subscriber writing through the test harness.
///
/// Honours `RUST_LOG`; calling it more than once is harmless.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .ok();
}

pub use backend::InMemoryBackend;
pub use mocks::{FixedClock, ManualClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration, Timelike};

    #[test]
    fn reference_instant_is_nine_am() {
        assert_eq!((t0().year(), t0().month(), t0().day()), (2025, 1, 1));
        assert_eq!((t0().hour(), t0().minute(), t0().second()), (9, 0, 0));
    }

    #[test]
    fn fixed_clock_never_moves() {
        let clock = test_clock();
        assert_eq!(clock.now(), t0());
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::starting_at(t0());
        let desk_side = clock.clone();

        clock.advance(Duration::minutes(5));
        assert_eq!(desk_side.now(), t0() + Duration::minutes(5));

        clock.set(t0());
        assert_eq!(desk_side.now(), t0());
    }
}
