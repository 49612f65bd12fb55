//! A morning at the front desk.

use crate::seed;
use salon_queue_core::types::{AppointmentId, BarberId, SeatId};
use salon_queue_runtime::ServingDesk;
use std::time::Duration;
use tracing::info;

/// Walks one customer through the slot and advances the queue twice.
pub async fn run(desk: &ServingDesk, pace: Duration) -> anyhow::Result<()> {
    let first = AppointmentId::new(seed::FIRST_CUSTOMER);
    let barber = BarberId::new("B1");

    let pending = desk.pending_for(&barber).await?;
    info!(
        barber = %barber,
        pending = ?pending.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
        "Pending appointments"
    );

    desk.accept_appointment(&first).await?;
    let slot = desk.store().read().await?;
    info!(idle = slot.is_idle(), "Accepted {first}; slot untouched");

    let queue = desk.queue().await?;
    info!(
        queue = ?queue.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
        "Queue in service order"
    );

    desk.move_to_serving(&first).await?;
    desk.start_service(None).await?;
    tokio::time::sleep(pace).await;

    let hold = desk.hold_seat(&SeatId::new(seed::WALK_IN_SEAT)).await?;
    info!(seat = seed::WALK_IN_SEAT, expires_at = ?hold.expires_at, "Walk-in seat held");

    desk.toggle_pause().await?;
    tokio::time::sleep(pace).await;
    desk.toggle_pause().await?;

    desk.update_duration(45).await?;
    tokio::time::sleep(pace).await;

    let outcome = desk.advance_queue().await?;
    info!(
        completed = ?outcome.completed,
        now_serving = ?outcome.now_serving,
        released_seat = ?outcome.released_seat,
        "Advanced"
    );

    desk.start_service(Some(20)).await?;
    tokio::time::sleep(pace).await;

    let outcome = desk.advance_queue().await?;
    info!(now_serving = ?outcome.now_serving, "Advanced again");

    for view in desk.seat_views().await? {
        info!(seat = %view.seat_id, colour = view.display.color(), "Seat");
    }

    Ok(())
}
