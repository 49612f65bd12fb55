//! Demo records for the front desk.

use chrono::{DateTime, Duration, Utc};
use salon_queue_core::types::{Appointment, AppointmentStatus};
use salon_queue_testing::fixtures;
use salon_queue_testing::InMemoryBackend;

/// Appointment the scenario walks through the slot
pub const FIRST_CUSTOMER: &str = "A1";

/// Seat whose booking hold lapses a few seconds into the demo
pub const LAPSING_SEAT: &str = "S4";

/// Seat the operator holds during the demo
pub const WALK_IN_SEAT: &str = "S3";

fn booked(id: &str, customer: &str, seat: &str, at: DateTime<Utc>, status: AppointmentStatus) -> Appointment {
    let mut appointment = fixtures::appointment(id)
        .customer(customer)
        .seat(seat)
        .status(status)
        .build();
    appointment.date_time = at;
    appointment
}

/// Backend with four seats, one short-lived hold and a small queue
pub fn backend(now: DateTime<Utc>) -> InMemoryBackend {
    let mut seats = fixtures::seats(4);
    if let Some(lapsing) = seats.iter_mut().find(|seat| seat.id.as_str() == LAPSING_SEAT) {
        *lapsing = fixtures::seat(LAPSING_SEAT)
            .label("Window seat")
            .barber("B2")
            .held_until(now + Duration::seconds(3))
            .build();
    }

    InMemoryBackend::new().with_seats(seats).with_appointments(vec![
        booked(FIRST_CUSTOMER, "Jane", "S2", now - Duration::minutes(40), AppointmentStatus::Pending),
        booked("A2", "Omar", "S1", now - Duration::minutes(20), AppointmentStatus::Accepted),
        booked("A3", "Lena", "S2", now - Duration::minutes(30), AppointmentStatus::Accepted),
        booked("A4", "Kofi", "S1", now + Duration::minutes(15), AppointmentStatus::Pending),
    ])
}
