//! Front-desk demo.
//!
//! Runs a serving session against an in-memory salon: accepts and serves a
//! customer, pauses and resizes the countdown, advances the queue, and lets a
//! seat hold lapse while the session ticker renders frames.

mod scenario;
mod seed;

use chrono::Utc;
use salon_queue_core::environment::SystemClock;
use salon_queue_runtime::{DeskConfig, ServingDesk, SessionTicker, SingleSlotQueueStore, TickFrame};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "front_desk=debug,salon_queue_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DeskConfig::from_env();
    info!(
        default_service_minutes = config.default_service_minutes,
        seat_hold_minutes = config.seat_hold_minutes,
        tick_interval_ms = config.tick_interval_ms,
        "Configuration loaded"
    );

    let backend = seed::backend(Utc::now());
    let store = Arc::new(SingleSlotQueueStore::with_config(
        Arc::new(backend.clone()),
        &config,
    ));
    let _feed = store.connect().await?;

    let desk = ServingDesk::new(store, Arc::new(SystemClock), config.clone());
    let ticker = SessionTicker::spawn(desk.clone()).await?;
    let board = tokio::spawn(render(ticker.frames()));

    let pace = config.tick_interval() * 2;
    tokio::select! {
        result = scenario::run(&desk, pace) => result?,
        _ = signal::ctrl_c() => warn!("Interrupted"),
    }

    tokio::time::sleep(pace).await;
    ticker.shutdown().await;
    board.abort();

    info!(slot = %serde_json::to_string(&backend.slot())?, "Final slot");
    Ok(())
}

async fn render(mut frames: watch::Receiver<TickFrame>) {
    while frames.changed().await.is_ok() {
        let frame = frames.borrow_and_update().clone();
        let seats: Vec<String> = frame
            .seats
            .iter()
            .map(|view| format!("{}={}", view.seat_id, view.display.color()))
            .collect();
        info!(
            customer = frame.slot.customer_name.as_deref().unwrap_or("-"),
            countdown = %frame.countdown,
            paused = frame.timer.is_paused,
            low_time = frame.low_time,
            seats = %seats.join(" "),
            "Board"
        );
        match serde_json::to_string(&frame) {
            Ok(json) => tracing::trace!(frame = %json, "Frame"),
            Err(error) => warn!(error = %error, "Frame could not be serialised"),
        }
    }
}
