//! End-to-end desk flows against the in-memory backend.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::Duration;
use salon_queue_core::environment::Clock;
use salon_queue_core::error::QueueError;
use salon_queue_core::seats::SeatDisplay;
use salon_queue_core::types::{
    AppointmentId, AppointmentStatus, BarberId, CurrentServingSlot, SeatId, SeatState,
};
use salon_queue_runtime::BackendError;
use salon_queue_testing::{fixtures, test_clock, InMemoryBackend, ManualClock};

fn id(value: &str) -> AppointmentId {
    AppointmentId::new(value)
}

// ============================================================================
// Scenario
// ============================================================================

#[tokio::test]
async fn accept_serve_pause_advance() {
    salon_queue_testing::init_tracing();
    let clock = ManualClock::starting_at(salon_queue_testing::t0());
    let backend = InMemoryBackend::new()
        .with_seats(fixtures::seats(3))
        .with_appointments(vec![
            fixtures::appointment("A1")
                .customer("Jane")
                .seat("S2")
                .services(&["Haircut", "Beard Trim"])
                .build(),
        ]);
    let desk = fixtures::desk(&backend, clock.clone());

    desk.accept_appointment(&id("A1")).await.unwrap();
    assert_eq!(
        backend.appointment("A1").unwrap().status,
        AppointmentStatus::Accepted
    );
    assert!(desk.store().read().await.unwrap().is_idle());

    let slot = desk.move_to_serving(&id("A1")).await.unwrap();
    assert_eq!(slot.customer_name.as_deref(), Some("Jane"));
    assert_eq!(slot.seat_id, Some(SeatId::new("S2")));
    assert_eq!(slot.appointment_id, Some(id("A1")));
    assert_eq!(slot.approx_duration_minutes, Some(30));
    assert_eq!(slot.timer_started_at, None);

    let started = desk.start_service(None).await.unwrap();
    assert_eq!(started.timer_started_at, Some(clock.now()));
    assert!(!started.paused);

    clock.advance(Duration::seconds(90));
    let snapshot = desk.timer_snapshot().await.unwrap();
    assert_eq!(snapshot.remaining_seconds, 30 * 60 - 90);
    assert_eq!(snapshot.countdown(), "28:30");

    let views = desk.seat_views().await.unwrap();
    let served = views.iter().find(|view| view.seat_id.as_str() == "S2").unwrap();
    assert_eq!(served.display, SeatDisplay::CurrentlyServed);

    let paused = desk.toggle_pause().await.unwrap();
    assert!(paused.paused);

    let outcome = desk.advance_queue().await.unwrap();
    assert_eq!(outcome.completed, Some(id("A1")));
    assert_eq!(outcome.now_serving, None);
    assert_eq!(outcome.released_seat, Some(SeatId::new("S2")));
    assert_eq!(outcome.slot, CurrentServingSlot::idle());
    assert_eq!(
        backend.appointment("A1").unwrap().status,
        AppointmentStatus::Completed
    );
    assert_eq!(backend.slot(), Some(CurrentServingSlot::idle()));
}

#[tokio::test]
async fn pause_freezes_and_resume_continues() {
    let clock = ManualClock::starting_at(salon_queue_testing::t0());
    let backend = InMemoryBackend::new().with_appointments(vec![
        fixtures::appointment("A1").accepted().build(),
    ]);
    let desk = fixtures::desk(&backend, clock.clone());

    desk.move_to_serving(&id("A1")).await.unwrap();
    desk.start_service(Some(10)).await.unwrap();

    clock.advance(Duration::minutes(4));
    desk.toggle_pause().await.unwrap();

    clock.advance(Duration::minutes(20));
    let frozen = desk.timer_snapshot().await.unwrap();
    assert!(frozen.is_paused);
    assert_eq!(frozen.remaining_seconds, 6 * 60);

    desk.toggle_pause().await.unwrap();
    clock.advance(Duration::minutes(1));
    let resumed = desk.timer_snapshot().await.unwrap();
    assert!(!resumed.is_paused);
    assert_eq!(resumed.remaining_seconds, 5 * 60);
}

#[tokio::test]
async fn update_duration_restarts_countdown() {
    let clock = ManualClock::starting_at(salon_queue_testing::t0());
    let backend = InMemoryBackend::new().with_appointments(vec![
        fixtures::appointment("A1").accepted().build(),
    ]);
    let desk = fixtures::desk(&backend, clock.clone());

    desk.move_to_serving(&id("A1")).await.unwrap();
    let recorded = desk.update_duration(45).await.unwrap();
    assert_eq!(recorded.approx_duration_minutes, Some(45));
    assert_eq!(recorded.timer_started_at, None);

    desk.start_service(None).await.unwrap();
    clock.advance(Duration::minutes(10));
    let restarted = desk.update_duration(20).await.unwrap();
    assert_eq!(restarted.timer_started_at, Some(clock.now()));
    assert_eq!(desk.timer_snapshot().await.unwrap().remaining_seconds, 20 * 60);
}

// ============================================================================
// Queue order and advance
// ============================================================================

#[tokio::test]
async fn fifo_serves_oldest_accepted_first() {
    let backend = InMemoryBackend::new()
        .with_seats(fixtures::seats(3))
        .with_appointments(vec![
            fixtures::appointment("A").at(10, 0).seat("S1").accepted().build(),
            fixtures::appointment("B").at(9, 0).seat("S2").accepted().build(),
            fixtures::appointment("C").at(9, 30).seat("S3").accepted().build(),
        ]);
    let desk = fixtures::desk(&backend, test_clock());

    let mut served = Vec::new();
    for _ in 0..4 {
        let outcome = desk.advance_queue().await.unwrap();
        if let Some(next) = outcome.now_serving {
            served.push(next.to_string());
        }
    }

    assert_eq!(served, vec!["B", "C", "A"]);
    for appointment in ["A", "B", "C"] {
        assert_eq!(
            backend.appointment(appointment).unwrap().status,
            AppointmentStatus::Completed
        );
    }
    assert!(backend.slot().unwrap().is_idle());
}

#[tokio::test]
async fn repeated_advance_completes_once() {
    let backend = InMemoryBackend::new()
        .with_seats(fixtures::seats(1))
        .with_appointments(vec![fixtures::appointment("A1").accepted().build()]);
    let desk = fixtures::desk(&backend, test_clock());

    desk.move_to_serving(&id("A1")).await.unwrap();
    desk.start_service(None).await.unwrap();

    let first = desk.advance_queue().await.unwrap();
    let second = desk.advance_queue().await.unwrap();

    assert_eq!(first.slot, CurrentServingSlot::idle());
    assert_eq!(second.slot, CurrentServingSlot::idle());
    assert_eq!(first.completed, Some(id("A1")));
    assert_eq!(second.completed, None);
    assert_eq!(backend.calls("update_appointment_status"), 1);
}

#[tokio::test]
async fn advance_keeps_seat_reused_by_next_customer() {
    let backend = InMemoryBackend::new()
        .with_seats(vec![fixtures::seat("S1").held_until(fixtures::at(12, 0)).build()])
        .with_appointments(vec![
            fixtures::appointment("A1").at(8, 0).seat("S1").accepted().build(),
            fixtures::appointment("A2").at(8, 30).seat("S1").accepted().build(),
        ]);
    let desk = fixtures::desk(&backend, test_clock());

    desk.move_to_serving(&id("A1")).await.unwrap();
    let outcome = desk.advance_queue().await.unwrap();

    assert_eq!(outcome.now_serving, Some(id("A2")));
    assert_eq!(outcome.released_seat, None);
    assert_eq!(backend.seat("S1").unwrap().state, SeatState::Booked);
}

#[tokio::test]
async fn concurrent_advance_gets_conflict() {
    let backend = InMemoryBackend::new()
        .with_seats(vec![
            fixtures::seat("S1").held_until(fixtures::at(12, 0)).build(),
            fixtures::seat("S2").build(),
        ])
        .with_appointments(vec![
            fixtures::appointment("A1").at(8, 0).seat("S1").accepted().build(),
            fixtures::appointment("A2").at(9, 0).seat("S2").accepted().build(),
            fixtures::appointment("A3").at(9, 30).seat("S1").accepted().build(),
        ]);
    let desk = fixtures::desk(&backend, test_clock());
    desk.move_to_serving(&id("A1")).await.unwrap();
    let seat_before = backend.seat("S1").unwrap();

    // Another desk moves the slot on between our read and our write.
    let racer = fixtures::appointment("A3").seat("S1").accepted().build();
    backend.interleave_slot_write(move |slot| {
        *slot = salon_queue_core::queue::QueueAdvancer::default().slot_for(&racer);
    });

    let result = desk.advance_queue().await;
    assert_eq!(
        result,
        Err(QueueError::Conflict {
            expected: Some(id("A1")),
            actual: Some(id("A3")),
        })
    );
    assert_eq!(
        backend.slot().unwrap().appointment_id,
        Some(id("A3")),
        "the winner's slot is kept"
    );

    // The losing advance has no side effects.
    assert_eq!(
        backend.appointment("A1").unwrap().status,
        AppointmentStatus::Accepted
    );
    assert_eq!(backend.seat("S1").unwrap(), seat_before);
    assert_eq!(backend.calls("update_appointment_status"), 0);
    assert_eq!(backend.calls("update_seat"), 0);
}

#[tokio::test]
async fn clear_frees_slot_and_seat_without_completing() {
    let backend = InMemoryBackend::new()
        .with_seats(vec![fixtures::seat("S2").held_until(fixtures::at(12, 0)).build()])
        .with_appointments(vec![fixtures::appointment("A1").seat("S2").accepted().build()]);
    let desk = fixtures::desk(&backend, test_clock());

    desk.move_to_serving(&id("A1")).await.unwrap();
    let slot = desk.clear().await.unwrap();

    assert!(slot.is_idle());
    assert_eq!(backend.appointment("A1").unwrap().status, AppointmentStatus::Accepted);
    let seat = backend.seat("S2").unwrap();
    assert_eq!(seat.state, SeatState::Available);
    assert_eq!(seat.expires_at, None);
}

// ============================================================================
// Invalid transitions
// ============================================================================

#[tokio::test]
async fn accepting_twice_is_invalid() {
    let backend = InMemoryBackend::new()
        .with_appointments(vec![fixtures::appointment("A1").pending().build()]);
    let desk = fixtures::desk(&backend, test_clock());

    desk.accept_appointment(&id("A1")).await.unwrap();
    assert!(matches!(
        desk.accept_appointment(&id("A1")).await,
        Err(QueueError::InvalidState(_))
    ));
}

#[tokio::test]
async fn unknown_appointment_is_not_found() {
    let desk = fixtures::desk(&InMemoryBackend::new(), test_clock());
    assert_eq!(
        desk.accept_appointment(&id("nope")).await,
        Err(QueueError::not_found("appointment", "nope"))
    );
}

#[tokio::test]
async fn serving_requires_an_idle_slot() {
    let backend = InMemoryBackend::new().with_appointments(vec![
        fixtures::appointment("A1").accepted().build(),
        fixtures::appointment("A2").accepted().build(),
    ]);
    let desk = fixtures::desk(&backend, test_clock());

    desk.move_to_serving(&id("A1")).await.unwrap();
    assert!(matches!(
        desk.move_to_serving(&id("A2")).await,
        Err(QueueError::InvalidState(_))
    ));
    assert_eq!(backend.slot().unwrap().appointment_id, Some(id("A1")));
}

#[tokio::test]
async fn starting_on_idle_slot_is_invalid() {
    let desk = fixtures::desk(&InMemoryBackend::new(), test_clock());
    assert!(matches!(
        desk.start_service(Some(30)).await,
        Err(QueueError::InvalidState(_))
    ));
    assert!(matches!(desk.toggle_pause().await, Err(QueueError::InvalidState(_))));
}

#[tokio::test]
async fn pausing_before_start_is_invalid() {
    let backend = InMemoryBackend::new().with_appointments(vec![
        fixtures::appointment("A1").accepted().build(),
    ]);
    let desk = fixtures::desk(&backend, test_clock());
    let serving = desk.move_to_serving(&id("A1")).await.unwrap();

    assert!(matches!(desk.toggle_pause().await, Err(QueueError::InvalidState(_))));
    assert_eq!(backend.slot(), Some(serving));

    let started = desk.start_service(Some(20)).await.unwrap();
    assert!(!started.paused);
    assert!(desk.toggle_pause().await.unwrap().paused);
}

#[tokio::test]
async fn failed_write_changes_nothing() {
    let backend = InMemoryBackend::new().with_appointments(vec![
        fixtures::appointment("A1").accepted().build(),
    ]);
    let desk = fixtures::desk(&backend, test_clock());
    let before = desk.move_to_serving(&id("A1")).await.unwrap();

    backend.fail_next("update_slot", BackendError::Unavailable("timeout".to_string()));
    let result = desk.start_service(None).await;

    assert!(matches!(result, Err(QueueError::Persistence(_))));
    assert_eq!(backend.slot(), Some(before));
}

// ============================================================================
// Seats and listings
// ============================================================================

#[tokio::test]
async fn holding_a_seat_books_it_for_fifteen_minutes() {
    let clock = test_clock();
    let backend = InMemoryBackend::new().with_seats(fixtures::seats(2));
    let desk = fixtures::desk(&backend, clock.clone());

    let update = desk.hold_seat(&SeatId::new("S1")).await.unwrap();
    assert_eq!(update.state, SeatState::Booked);
    assert_eq!(update.expires_at, Some(clock.now() + Duration::minutes(15)));

    let view = desk
        .seat_views()
        .await
        .unwrap()
        .into_iter()
        .find(|view| view.seat_id.as_str() == "S1")
        .unwrap();
    assert_eq!(view.display, SeatDisplay::Booked);
    assert_eq!(view.hold_remaining_seconds, Some(15 * 60));

    assert!(matches!(
        desk.hold_seat(&SeatId::new("S1")).await,
        Err(QueueError::InvalidState(_))
    ));
    assert!(matches!(
        desk.hold_seat(&SeatId::new("S9")).await,
        Err(QueueError::NotFound { entity: "seat", .. })
    ));
}

#[tokio::test]
async fn pending_list_is_per_barber_and_ordered() {
    let backend = InMemoryBackend::new().with_appointments(vec![
        fixtures::appointment("late").at(11, 0).build(),
        fixtures::appointment("other").at(8, 0).barber("B2").build(),
        fixtures::appointment("early").at(8, 30).build(),
        fixtures::appointment("taken").at(7, 0).accepted().build(),
    ]);
    let desk = fixtures::desk(&backend, test_clock());

    let pending: Vec<String> = desk
        .pending_for(&BarberId::new("B1"))
        .await
        .unwrap()
        .into_iter()
        .map(|appointment| appointment.id.to_string())
        .collect();
    assert_eq!(pending, vec!["early", "late"]);
}
