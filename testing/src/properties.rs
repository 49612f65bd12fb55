//! proptest strategies for queue records.

use crate::fixtures;
use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use salon_queue_core::types::{Appointment, AppointmentStatus};

/// Service lengths a barber would plausibly set (1 to 180 minutes)
pub fn service_minutes() -> impl Strategy<Value = u32> {
    1u32..=180
}

/// Instants within the test day
pub fn instant_in_day() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..86_400).prop_map(|offset| crate::t0() - Duration::hours(9) + Duration::seconds(offset))
}

/// Any appointment status
pub fn status() -> impl Strategy<Value = AppointmentStatus> {
    prop_oneof![
        Just(AppointmentStatus::Pending),
        Just(AppointmentStatus::Accepted),
        Just(AppointmentStatus::Completed),
        Just(AppointmentStatus::Cancelled),
    ]
}

/// Between one and `max` appointments with distinct ids, random booking
/// times (on whole minutes, so ties happen) and random statuses
pub fn appointments(max: usize) -> impl Strategy<Value = Vec<Appointment>> {
    prop::collection::vec((0u32..12, 0u32..4, status()), 1..=max.max(1)).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(index, (hour_offset, quarter, status))| {
                fixtures::appointment(&format!("A{index}"))
                    .seat(&format!("S{}", index % 4 + 1))
                    .at(8 + hour_offset, quarter * 15)
                    .status(status)
                    .build()
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use salon_queue_core::queue::QueueAdvancer;

    proptest! {
        #[test]
        fn next_in_queue_is_never_later_than_any_accepted(appointments in appointments(12)) {
            if let Some(next) = QueueAdvancer::next_in_queue(&appointments, None) {
                prop_assert_eq!(next.status, AppointmentStatus::Accepted);
                for other in QueueAdvancer::queue(&appointments) {
                    prop_assert!(next.date_time <= other.date_time);
                }
            } else {
                prop_assert!(appointments.iter().all(|a| a.status != AppointmentStatus::Accepted));
            }
        }

        #[test]
        fn instants_stay_on_test_date(instant in instant_in_day()) {
            prop_assert_eq!(instant.date_naive(), crate::t0().date_naive());
        }
    }
}
