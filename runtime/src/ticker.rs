//! Per-session recomputation loop.
//!
//! Every screen showing the board runs one [`SessionTicker`]. Once per tick it
//! recomputes the countdown and the seat colours from the latest known slot
//! and seats, and writes lapsed booking holds back as available. Slot and seat
//! changes arriving in between are folded in immediately.
//!
//! The loop never writes the slot. Its only persisted side effect is the
//! seat-expiry write-back, reported once per lapse by
//! [`SeatAvailabilityProjector`].

use crate::backend::{ChangeRecord, ChangeStream, Table};
use crate::desk::ServingDesk;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use salon_queue_core::error::Result;
use salon_queue_core::seats::{SeatAvailabilityProjector, SeatView};
use salon_queue_core::timer::{TimerEngine, TimerSnapshot};
use salon_queue_core::types::{CurrentServingSlot, Seat, SeatUpdate};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What a screen renders at one instant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickFrame {
    /// When the frame was computed
    pub at: DateTime<Utc>,
    /// The slot the frame was computed from
    pub slot: CurrentServingSlot,
    /// Countdown state
    pub timer: TimerSnapshot,
    /// Remaining time as `mm:ss`
    pub countdown: String,
    /// Running and under the low-time threshold
    pub low_time: bool,
    /// Every seat's display state
    pub seats: Vec<SeatView>,
}

impl TickFrame {
    /// Builds the frame for `slot` and the projected `seats` at `at`
    #[must_use]
    pub fn compose(
        slot: &CurrentServingSlot,
        seats: Vec<SeatView>,
        at: DateTime<Utc>,
        low_time_threshold_seconds: u64,
    ) -> Self {
        let timer = TimerEngine::snapshot(slot, at);
        Self {
            at,
            slot: slot.clone(),
            timer,
            countdown: timer.countdown(),
            low_time: timer.is_low(low_time_threshold_seconds),
            seats,
        }
    }
}

/// Handle to a running session loop; dropping it stops the loop.
#[derive(Debug)]
pub struct SessionTicker {
    frames: watch::Receiver<TickFrame>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

struct SessionLoop {
    desk: ServingDesk,
    projector: SeatAvailabilityProjector,
    slot: CurrentServingSlot,
    seats: Vec<Seat>,
    frames: watch::Sender<TickFrame>,
}

impl SessionTicker {
    /// Loads the current slot and seats and starts the loop.
    ///
    /// The seat change feed is optional: when it cannot be opened the loop
    /// re-reads the seats on every tick instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial slot or seat read fails.
    pub async fn spawn(desk: ServingDesk) -> Result<Self> {
        // Subscribe first: a write landing during the reads below is then
        // delivered to the loop instead of being lost.
        let slots = desk.store().subscribe();
        let slot = desk.store().read().await?;
        let seats = desk.seats().await?;

        let seat_feed = match desk.store().backend().subscribe(Table::Seats).await {
            Ok(feed) => Some(feed),
            Err(error) => {
                tracing::warn!(error = %error, "Seat change feed unavailable, polling seats instead");
                None
            }
        };

        let now = desk.clock().now();
        let threshold = desk.config().low_time_threshold_seconds;
        let views = seats
            .iter()
            .map(|seat| SeatAvailabilityProjector::view(seat, &slot, now))
            .collect();
        let first = TickFrame::compose(&slot, views, now, threshold);
        let (frames_tx, frames) = watch::channel(first);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let session = SessionLoop {
            desk,
            projector: SeatAvailabilityProjector::new(),
            slot,
            seats,
            frames: frames_tx,
        };
        let task = tokio::spawn(session.run(slots, seat_feed, shutdown_rx));

        tracing::info!("Session ticker started");
        Ok(Self {
            frames,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Receiver of frames; the current frame is always available.
    #[must_use]
    pub fn frames(&self) -> watch::Receiver<TickFrame> {
        self.frames.clone()
    }

    /// Most recent frame
    #[must_use]
    pub fn latest(&self) -> TickFrame {
        self.frames.borrow().clone()
    }

    /// Stops the loop and waits for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.send(()).ok();
        }
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!(error = %error, "Session ticker ended abnormally");
            }
        }
        tracing::info!("Session ticker stopped");
    }
}

impl Drop for SessionTicker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl SessionLoop {
    async fn run(
        mut self,
        mut slots: crate::store::SlotSubscription,
        mut seat_feed: Option<ChangeStream>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut interval = tokio::time::interval(self.desk.config().tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    if seat_feed.is_none() {
                        self.refresh_seats().await;
                    }
                    self.tick().await;
                }
                snapshot = slots.recv() => match snapshot {
                    Some(slot) => {
                        self.slot = slot;
                        self.publish(self.desk.clock().now());
                    }
                    None => break,
                },
                change = next_change(&mut seat_feed) => match change {
                    Some(change) => self.apply_change(change),
                    None => {
                        tracing::warn!("Seat change feed ended, polling seats instead");
                        seat_feed = None;
                    }
                },
            }
        }

        tracing::debug!("Session loop exited");
    }

    async fn tick(&mut self) {
        let now = self.desk.clock().now();
        let tick = self.projector.tick(&self.seats, &self.slot, now);

        for expired in &tick.expired {
            match self.desk.release_seat(&expired.seat_id).await {
                Ok(()) => {
                    metrics::counter!("seats.expired").increment(1);
                    tracing::info!(
                        seat_id = %expired.seat_id,
                        expired_at = %expired.expired_at,
                        "Seat hold expired"
                    );
                    if let Some(seat) = self.seats.iter_mut().find(|seat| seat.id == expired.seat_id) {
                        seat.apply(&SeatUpdate::release());
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        seat_id = %expired.seat_id,
                        error = %error,
                        "Seat release failed, will retry next tick"
                    );
                    self.projector.forget(&expired.seat_id);
                }
            }
        }

        let frame = TickFrame::compose(
            &self.slot,
            tick.views,
            now,
            self.desk.config().low_time_threshold_seconds,
        );
        tracing::trace!(remaining = frame.timer.remaining_seconds, "Tick");
        self.frames.send_replace(frame);
    }

    fn publish(&self, now: DateTime<Utc>) {
        let views = self
            .seats
            .iter()
            .map(|seat| SeatAvailabilityProjector::view(seat, &self.slot, now))
            .collect();
        self.frames.send_replace(TickFrame::compose(
            &self.slot,
            views,
            now,
            self.desk.config().low_time_threshold_seconds,
        ));
    }

    fn apply_change(&mut self, change: ChangeRecord) {
        match change {
            ChangeRecord::Seat(seat) => {
                match self.seats.iter_mut().find(|known| known.id == seat.id) {
                    Some(known) => *known = seat,
                    None => self.seats.push(seat),
                }
                self.publish(self.desk.clock().now());
            }
            ChangeRecord::ServingSlot(_) | ChangeRecord::Appointment(_) => {}
        }
    }

    async fn refresh_seats(&mut self) {
        match self.desk.seats().await {
            Ok(seats) => self.seats = seats,
            Err(error) => tracing::warn!(error = %error, "Seat refresh failed, keeping last known seats"),
        }
    }
}

async fn next_change(feed: &mut Option<ChangeStream>) -> Option<ChangeRecord> {
    match feed {
        Some(feed) => feed.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use salon_queue_core::seats::SeatDisplay;
    use salon_queue_core::types::{AppointmentId, SeatId};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn idle_frame_shows_zero() {
        let frame = TickFrame::compose(&CurrentServingSlot::idle(), Vec::new(), now(), 60);
        assert_eq!(frame.countdown, "00:00");
        assert!(!frame.timer.is_running);
        assert!(!frame.low_time);
    }

    #[test]
    fn low_time_flag_under_threshold() {
        let slot = CurrentServingSlot {
            customer_name: Some("Jane".to_string()),
            seat_id: Some(SeatId::new("S2")),
            appointment_id: Some(AppointmentId::new("A1")),
            ..CurrentServingSlot::idle()
        };
        let running = TimerEngine::start(&slot, 1, now()).unwrap();

        let early = TickFrame::compose(&running, Vec::new(), now(), 60);
        assert_eq!(early.countdown, "01:00");
        assert!(!early.low_time);

        let late = TickFrame::compose(&running, Vec::new(), now() + chrono::Duration::seconds(15), 60);
        assert_eq!(late.countdown, "00:45");
        assert!(late.low_time);
    }

    #[test]
    fn frame_keeps_seat_views() {
        let view = SeatView {
            seat_id: SeatId::new("S1"),
            label: "Seat 1".to_string(),
            display: SeatDisplay::Available,
            hold_remaining_seconds: None,
        };
        let frame = TickFrame::compose(&CurrentServingSlot::idle(), vec![view.clone()], now(), 60);
        assert_eq!(frame.seats, vec![view]);
    }
}
