//! Builders for test records.
//!
//! Defaults describe a plausible salon day: appointments on 2025-01-01 for
//! barber `B1`, a single "Haircut" service, status pending.

use crate::backend::InMemoryBackend;
use chrono::{DateTime, Duration, Utc};
use salon_queue_core::environment::Clock;
use salon_queue_core::types::{
    Appointment, AppointmentId, AppointmentStatus, BarberId, Seat, SeatId, SeatState,
};
use salon_queue_runtime::{DeskConfig, RetryPolicy, ServingDesk, SingleSlotQueueStore};
use std::sync::Arc;

/// Time of day on the test date (2025-01-01 UTC)
#[must_use]
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    crate::t0() + Duration::minutes((i64::from(hour) - 9) * 60 + i64::from(minute))
}

/// Starts an appointment builder
#[must_use]
pub fn appointment(id: &str) -> AppointmentBuilder {
    AppointmentBuilder {
        appointment: Appointment {
            id: AppointmentId::new(id),
            customer_name: format!("Customer {id}"),
            customer_id: None,
            date_time: crate::t0(),
            services: vec!["Haircut".to_string()],
            seat_id: SeatId::new("S1"),
            barber_id: BarberId::new("B1"),
            status: AppointmentStatus::Pending,
        },
    }
}

/// Builder for [`Appointment`]
#[derive(Debug, Clone)]
pub struct AppointmentBuilder {
    appointment: Appointment,
}

impl AppointmentBuilder {
    /// Sets the customer name
    #[must_use]
    pub fn customer(mut self, name: &str) -> Self {
        self.appointment.customer_name = name.to_string();
        self
    }

    /// Sets the seat
    #[must_use]
    pub fn seat(mut self, seat_id: &str) -> Self {
        self.appointment.seat_id = SeatId::new(seat_id);
        self
    }

    /// Sets the barber
    #[must_use]
    pub fn barber(mut self, barber_id: &str) -> Self {
        self.appointment.barber_id = BarberId::new(barber_id);
        self
    }

    /// Sets the booked time of day
    #[must_use]
    pub fn at(mut self, hour: u32, minute: u32) -> Self {
        self.appointment.date_time = at(hour, minute);
        self
    }

    /// Sets the services
    #[must_use]
    pub fn services(mut self, services: &[&str]) -> Self {
        self.appointment.services = services.iter().map(ToString::to_string).collect();
        self
    }

    /// Sets the status
    #[must_use]
    pub const fn status(mut self, status: AppointmentStatus) -> Self {
        self.appointment.status = status;
        self
    }

    /// Status pending
    #[must_use]
    pub const fn pending(self) -> Self {
        self.status(AppointmentStatus::Pending)
    }

    /// Status accepted
    #[must_use]
    pub const fn accepted(self) -> Self {
        self.status(AppointmentStatus::Accepted)
    }

    /// Finishes the appointment
    #[must_use]
    pub fn build(self) -> Appointment {
        self.appointment
    }
}

/// Starts a seat builder; the seat is available
#[must_use]
pub fn seat(id: &str) -> SeatBuilder {
    SeatBuilder {
        seat: Seat {
            id: SeatId::new(id),
            label: format!("Seat {id}"),
            barber_id: BarberId::new("B1"),
            state: SeatState::Available,
            expires_at: None,
        },
    }
}

/// Builder for [`Seat`]
#[derive(Debug, Clone)]
pub struct SeatBuilder {
    seat: Seat,
}

impl SeatBuilder {
    /// Sets the label
    #[must_use]
    pub fn label(mut self, label: &str) -> Self {
        self.seat.label = label.to_string();
        self
    }

    /// Sets the barber
    #[must_use]
    pub fn barber(mut self, barber_id: &str) -> Self {
        self.seat.barber_id = BarberId::new(barber_id);
        self
    }

    /// Marks the seat booked until `expires_at`
    #[must_use]
    pub const fn held_until(mut self, expires_at: DateTime<Utc>) -> Self {
        self.seat.state = SeatState::Booked;
        self.seat.expires_at = Some(expires_at);
        self
    }

    /// Finishes the seat
    #[must_use]
    pub fn build(self) -> Seat {
        self.seat
    }
}

/// Seats `S1`..=`Sn`, all available
#[must_use]
pub fn seats(count: usize) -> Vec<Seat> {
    (1..=count).map(|n| seat(&format!("S{n}")).build()).collect()
}

/// Desk over `backend` with default configuration and no read retries
#[must_use]
pub fn desk(backend: &InMemoryBackend, clock: impl Clock + 'static) -> ServingDesk {
    desk_with_config(backend, clock, DeskConfig::default())
}

/// Desk over `backend` with `config`; reads are never retried so injected
/// failures surface immediately
#[must_use]
pub fn desk_with_config(
    backend: &InMemoryBackend,
    clock: impl Clock + 'static,
    config: DeskConfig,
) -> ServingDesk {
    let store = SingleSlotQueueStore::with_settings(
        Arc::new(backend.clone()),
        RetryPolicy::none(),
        config.broadcast_capacity,
    );
    ServingDesk::new(Arc::new(store), Arc::new(clock), config)
}
