//! Property tests driving the desk through the in-memory backend.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::Duration;
use proptest::prelude::*;
use salon_queue_core::queue::QueueAdvancer;
use salon_queue_core::seats::SeatDisplay;
use salon_queue_core::types::{AppointmentId, AppointmentStatus, SeatId};
use salon_queue_testing::properties::{appointments, instant_in_day, service_minutes};
use salon_queue_testing::{fixtures, t0, InMemoryBackend, ManualClock};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn countdown_tracks_elapsed_time(minutes in service_minutes(), fraction in 0.0f64..1.0) {
        let total = i64::from(minutes) * 60;
        #[allow(clippy::cast_possible_truncation)]
        let elapsed = (total as f64 * fraction) as i64;

        let remaining = tokio_test::block_on(async {
            let clock = ManualClock::starting_at(t0());
            let backend = InMemoryBackend::new()
                .with_appointments(vec![fixtures::appointment("A1").accepted().build()]);
            let desk = fixtures::desk(&backend, clock.clone());

            desk.move_to_serving(&AppointmentId::new("A1")).await.unwrap();
            desk.start_service(Some(minutes)).await.unwrap();

            // A pause in the middle must not consume time.
            clock.advance(Duration::seconds(elapsed / 2));
            desk.toggle_pause().await.unwrap();
            clock.advance(Duration::minutes(7));
            desk.toggle_pause().await.unwrap();
            clock.advance(Duration::seconds(elapsed - elapsed / 2));

            desk.timer_snapshot().await.unwrap().remaining_seconds
        });

        prop_assert_eq!(remaining, u64::try_from(total - elapsed).unwrap());
    }

    #[test]
    fn advancing_serves_the_queue_in_order(booked in appointments(8)) {
        let expected: Vec<AppointmentId> = QueueAdvancer::queue(&booked)
            .into_iter()
            .map(|appointment| appointment.id.clone())
            .collect();

        let (served, backend) = tokio_test::block_on(async {
            let backend = InMemoryBackend::new()
                .with_seats(fixtures::seats(4))
                .with_appointments(booked.clone());
            let desk = fixtures::desk(&backend, salon_queue_testing::test_clock());

            let mut served = Vec::new();
            loop {
                let outcome = desk.advance_queue().await.unwrap();
                match outcome.now_serving {
                    Some(id) => served.push(id),
                    None => break,
                }
            }
            (served, backend)
        });

        prop_assert_eq!(&served, &expected);
        for id in &expected {
            prop_assert_eq!(
                backend.appointment(id.as_str()).unwrap().status,
                AppointmentStatus::Completed
            );
        }
    }

    #[test]
    fn hold_lasts_fifteen_minutes_from_any_instant(now in instant_in_day()) {
        let (held, lapsed) = tokio_test::block_on(async {
            let clock = ManualClock::starting_at(now);
            let backend = InMemoryBackend::new().with_seats(fixtures::seats(1));
            let desk = fixtures::desk(&backend, clock.clone());

            desk.hold_seat(&SeatId::new("S1")).await.unwrap();
            let held = desk.seat_views().await.unwrap().remove(0);
            clock.advance(Duration::minutes(15) + Duration::seconds(1));
            let lapsed = desk.seat_views().await.unwrap().remove(0);
            (held, lapsed)
        });

        prop_assert_eq!(held.display, SeatDisplay::Booked);
        prop_assert_eq!(held.hold_remaining_seconds, Some(15 * 60));
        prop_assert_eq!(lapsed.display, SeatDisplay::Available);
    }
}
