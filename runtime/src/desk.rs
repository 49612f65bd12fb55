//! Operator command surface.
//!
//! [`ServingDesk`] is what the front-desk and barber screens call. Each
//! command reads what it needs from the collaborator, runs the matching pure
//! transition from the core crate, and writes the result through the
//! [`SingleSlotQueueStore`]. Errors are returned as-is; the desk never retries
//! a write on the operator's behalf.

use crate::backend::{AppointmentFilter, ServingBackend};
use crate::config::DeskConfig;
use crate::retry::retry_read;
use crate::store::SingleSlotQueueStore;
use salon_queue_core::command::SlotCommand;
use salon_queue_core::environment::Clock;
use salon_queue_core::error::{QueueError, Result};
use salon_queue_core::queue::QueueAdvancer;
use salon_queue_core::seats::{SeatAvailabilityProjector, SeatView};
use salon_queue_core::timer::{TimerEngine, TimerSnapshot};
use salon_queue_core::types::{
    Appointment, AppointmentId, AppointmentStatus, BarberId, CurrentServingSlot, Seat, SeatId,
    SeatUpdate,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What an advance did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceOutcome {
    /// Appointment marked completed by this advance
    pub completed: Option<AppointmentId>,
    /// Seat returned to the available pool
    pub released_seat: Option<SeatId>,
    /// Appointment now in the slot
    pub now_serving: Option<AppointmentId>,
    /// The slot as persisted
    pub slot: CurrentServingSlot,
}

/// Commands available to the salon staff.
#[derive(Clone)]
pub struct ServingDesk {
    store: Arc<SingleSlotQueueStore>,
    clock: Arc<dyn Clock>,
    config: DeskConfig,
}

impl std::fmt::Debug for ServingDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServingDesk")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ServingDesk {
    /// Creates a desk over `store`
    #[must_use]
    pub fn new(store: Arc<SingleSlotQueueStore>, clock: Arc<dyn Clock>, config: DeskConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// The slot store used by this desk
    #[must_use]
    pub const fn store(&self) -> &Arc<SingleSlotQueueStore> {
        &self.store
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &DeskConfig {
        &self.config
    }

    /// Clock used for every timestamp the desk writes
    #[must_use]
    pub const fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn backend(&self) -> &Arc<dyn ServingBackend> {
        self.store.backend()
    }

    const fn advancer(&self) -> QueueAdvancer {
        QueueAdvancer::new(self.config.default_service_minutes)
    }

    async fn run(&self, command: SlotCommand) -> Result<CurrentServingSlot> {
        let name = command.name();
        let now = self.clock.now();
        let result = self.store.write(move |slot| command.apply(slot, now)).await;
        record(name, &result);
        result
    }

    // ------------------------------------------------------------------------
    // Timer
    // ------------------------------------------------------------------------

    /// Starts the countdown for the customer in the slot.
    ///
    /// Uses `minutes` when given, else the slot's recorded duration, else the
    /// configured default.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidState`] when nobody is in the slot.
    #[tracing::instrument(skip(self))]
    pub async fn start_service(&self, minutes: Option<u32>) -> Result<CurrentServingSlot> {
        let minutes = match minutes {
            Some(minutes) => minutes,
            None => self
                .store
                .read()
                .await?
                .approx_duration_minutes
                .unwrap_or(self.config.default_service_minutes),
        };
        let slot = self.run(SlotCommand::StartService { minutes }).await?;
        tracing::info!(
            appointment_id = ?slot.appointment_id,
            minutes,
            "Service started"
        );
        Ok(slot)
    }

    /// Pauses a running countdown, or resumes a paused one.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidState`] when the slot is idle or the countdown
    /// has not been started.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_pause(&self) -> Result<CurrentServingSlot> {
        let slot = self.run(SlotCommand::TogglePause).await?;
        tracing::info!(paused = slot.paused, "Pause toggled");
        Ok(slot)
    }

    /// Restarts the countdown at `minutes`.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidState`] when the slot is idle.
    #[tracing::instrument(skip(self))]
    pub async fn update_duration(&self, minutes: u32) -> Result<CurrentServingSlot> {
        let slot = self.run(SlotCommand::UpdateDuration { minutes }).await?;
        tracing::info!(minutes, "Service duration updated");
        Ok(slot)
    }

    /// Countdown of the service in progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be read.
    pub async fn timer_snapshot(&self) -> Result<TimerSnapshot> {
        let slot = self.store.read().await?;
        Ok(TimerEngine::snapshot(&slot, self.clock.now()))
    }

    // ------------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------------

    async fn appointment(&self, id: &AppointmentId) -> Result<Appointment> {
        let backend = self.backend();
        let appointment = retry_read(self.store.retry_policy(), "get_appointment", || {
            backend.get_appointment(id)
        })
        .await?;
        Ok(appointment)
    }

    async fn appointments(&self, filter: AppointmentFilter) -> Result<Vec<Appointment>> {
        let backend = self.backend();
        let appointments = retry_read(self.store.retry_policy(), "get_appointments", || {
            backend.get_appointments(filter.clone())
        })
        .await?;
        Ok(appointments)
    }

    /// Accepts a pending appointment. The slot is not touched.
    ///
    /// # Errors
    ///
    /// [`QueueError::NotFound`] for an unknown id, [`QueueError::InvalidState`]
    /// unless the appointment is pending.
    #[tracing::instrument(skip(self, id), fields(appointment_id = %id))]
    pub async fn accept_appointment(&self, id: &AppointmentId) -> Result<()> {
        let result = async {
            let appointment = self.appointment(id).await?;
            let status = QueueAdvancer::accept(&appointment)?;
            self.backend().update_appointment_status(id, status).await?;
            Ok::<(), QueueError>(())
        }
        .await;
        record("accept_appointment", &result);
        result?;

        tracing::info!(appointment_id = %id, "Appointment accepted");
        Ok(())
    }

    /// Moves an accepted appointment into the idle slot, timer unstarted.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidState`] when the slot is occupied or the
    /// appointment is not accepted.
    #[tracing::instrument(skip(self, id), fields(appointment_id = %id))]
    pub async fn move_to_serving(&self, id: &AppointmentId) -> Result<CurrentServingSlot> {
        let appointment = self.appointment(id).await?;
        let slot = self
            .run(SlotCommand::MoveToServing {
                appointment: Box::new(appointment),
                default_minutes: self.config.default_service_minutes,
            })
            .await?;
        tracing::info!(
            appointment_id = %id,
            seat_id = ?slot.seat_id,
            "Appointment moved to serving"
        );
        Ok(slot)
    }

    /// Ends the current service and serves the oldest accepted appointment.
    ///
    /// The slot is replaced first, guarded by the appointment read at the
    /// start, so when two desks advance at once exactly one of them moves the
    /// slot and the other gets [`QueueError::Conflict`]. Only the winner then
    /// completes the previous appointment and releases its seat.
    ///
    /// # Errors
    ///
    /// [`QueueError::Conflict`] when another writer advanced first,
    /// [`QueueError::Persistence`] when any write fails.
    #[tracing::instrument(skip(self))]
    pub async fn advance_queue(&self) -> Result<AdvanceOutcome> {
        let result = self.advance().await;
        metrics::counter!(
            "queue.advance",
            "outcome" => result.as_ref().map_or_else(QueueError::kind, |_| "ok")
        )
        .increment(1);
        record("advance_queue", &result);
        result
    }

    async fn advance(&self) -> Result<AdvanceOutcome> {
        let slot = self.store.read().await?;
        let accepted = self
            .appointments(AppointmentFilter::with_status(AppointmentStatus::Accepted))
            .await?;
        let plan = self.advancer().plan_advance(&slot, &accepted);

        // The guarded write is the commit point: a losing advance stops here
        // without touching the appointment or the seat.
        let next_slot = plan.next_slot;
        let persisted = self
            .store
            .write_guarded(slot.appointment_id.clone(), move |_| Ok(next_slot))
            .await?;

        if let Some(id) = &plan.complete {
            self.backend()
                .update_appointment_status(id, AppointmentStatus::Completed)
                .await?;
            tracing::info!(appointment_id = %id, "Appointment completed");
        }

        if let Some(seat_id) = &plan.release_seat {
            self.backend().update_seat(seat_id, SeatUpdate::release()).await?;
            tracing::debug!(seat_id = %seat_id, "Seat released");
        }

        tracing::info!(
            completed = ?plan.complete,
            now_serving = ?plan.next_appointment,
            "Queue advanced"
        );

        Ok(AdvanceOutcome {
            completed: plan.complete,
            released_seat: plan.release_seat,
            now_serving: plan.next_appointment,
            slot: persisted,
        })
    }

    /// Resets the slot to idle without completing the appointment, and frees
    /// its seat.
    ///
    /// # Errors
    ///
    /// [`QueueError::Conflict`] when the slot changed while clearing,
    /// [`QueueError::Persistence`] when a write fails.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) -> Result<CurrentServingSlot> {
        let previous = self.store.read().await?;
        let now = self.clock.now();
        let result = self
            .store
            .write_guarded(previous.appointment_id.clone(), move |slot| {
                SlotCommand::Clear.apply(slot, now)
            })
            .await;
        record("clear", &result);
        let slot = result?;

        if let Some(seat_id) = &previous.seat_id {
            self.backend().update_seat(seat_id, SeatUpdate::release()).await?;
        }
        tracing::info!(appointment_id = ?previous.appointment_id, "Slot cleared");
        Ok(slot)
    }

    /// Accepted appointments in the order they will be served.
    ///
    /// # Errors
    ///
    /// Returns an error if the appointments cannot be read.
    pub async fn queue(&self) -> Result<Vec<Appointment>> {
        let accepted = self
            .appointments(AppointmentFilter::with_status(AppointmentStatus::Accepted))
            .await?;
        Ok(QueueAdvancer::queue(&accepted).into_iter().cloned().collect())
    }

    /// Pending appointments of one barber, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the appointments cannot be read.
    pub async fn pending_for(&self, barber_id: &BarberId) -> Result<Vec<Appointment>> {
        let mut pending = self
            .appointments(
                AppointmentFilter::with_status(AppointmentStatus::Pending)
                    .for_barber(barber_id.clone()),
            )
            .await?;
        pending.sort_by_key(|appointment| appointment.date_time);
        Ok(pending)
    }

    // ------------------------------------------------------------------------
    // Seats
    // ------------------------------------------------------------------------

    /// Every seat, as provisioned.
    ///
    /// # Errors
    ///
    /// Returns an error if the seats cannot be read.
    pub async fn seats(&self) -> Result<Vec<Seat>> {
        let backend = self.backend();
        let seats = retry_read(self.store.retry_policy(), "get_seats", || backend.get_seats()).await?;
        Ok(seats)
    }

    /// Display state of every seat right now.
    ///
    /// # Errors
    ///
    /// Returns an error if the seats or the slot cannot be read.
    pub async fn seat_views(&self) -> Result<Vec<SeatView>> {
        let seats = self.seats().await?;
        let slot = self.store.read().await?;
        let now = self.clock.now();
        Ok(seats
            .iter()
            .map(|seat| SeatAvailabilityProjector::view(seat, &slot, now))
            .collect())
    }

    /// Holds an available seat for the configured hold time.
    ///
    /// # Errors
    ///
    /// [`QueueError::NotFound`] for an unknown seat, [`QueueError::InvalidState`]
    /// when it is already held or being served.
    #[tracing::instrument(skip(self, seat_id), fields(seat_id = %seat_id))]
    pub async fn hold_seat(&self, seat_id: &SeatId) -> Result<SeatUpdate> {
        let seats = self.seats().await?;
        let seat = seats
            .iter()
            .find(|seat| &seat.id == seat_id)
            .ok_or_else(|| QueueError::not_found("seat", seat_id.as_str()))?;
        let slot = self.store.read().await?;

        let update =
            SeatAvailabilityProjector::hold(seat, &slot, self.clock.now(), self.config.seat_hold())?;
        self.backend().update_seat(seat_id, update.clone()).await?;

        tracing::info!(seat_id = %seat_id, expires_at = ?update.expires_at, "Seat held");
        Ok(update)
    }

    /// Returns a seat to the available pool.
    ///
    /// # Errors
    ///
    /// [`QueueError::NotFound`] for an unknown seat,
    /// [`QueueError::Persistence`] when the write fails.
    pub async fn release_seat(&self, seat_id: &SeatId) -> Result<()> {
        self.backend().update_seat(seat_id, SeatUpdate::release()).await?;
        Ok(())
    }
}

fn record<T>(command: &'static str, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(error) => {
            tracing::warn!(command, error = %error, "Command failed");
            error.kind()
        }
    };
    metrics::counter!("queue.commands", "command" => command, "outcome" => outcome).increment(1);
}
