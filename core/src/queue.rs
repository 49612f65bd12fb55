//! FIFO queue advancement.
//!
//! The queue is the set of `accepted` appointments. When a service ends the
//! oldest one (smallest `date_time`) is moved into the slot. Ties keep the
//! order the collaborator returned the records in, which is insertion order.
//!
//! Population is a separate step from acceptance: accepting only changes the
//! appointment status, and the slot is filled either by an explicit
//! "move to serving" or by [`QueueAdvancer::plan_advance`].

use crate::error::{QueueError, Result};
use crate::timer::TimerEngine;
use crate::types::{
    Appointment, AppointmentId, AppointmentStatus, CurrentServingSlot, SeatId,
};

/// Service length used when an appointment enters the slot
pub const DEFAULT_SERVICE_MINUTES: u32 = 30;

/// Everything an advance needs to write, computed up front.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvancePlan {
    /// Appointment to mark completed
    pub complete: Option<AppointmentId>,
    /// Seat to return to the available pool
    pub release_seat: Option<SeatId>,
    /// Appointment moved into the slot
    pub next_appointment: Option<AppointmentId>,
    /// Replacement slot record
    pub next_slot: CurrentServingSlot,
}

/// Selects and installs the next appointment to serve.
#[derive(Clone, Copy, Debug)]
pub struct QueueAdvancer {
    default_minutes: u32,
}

impl Default for QueueAdvancer {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_MINUTES)
    }
}

impl QueueAdvancer {
    /// Creates an advancer that assigns `default_minutes` to new services
    #[must_use]
    pub const fn new(default_minutes: u32) -> Self {
        Self { default_minutes }
    }

    /// Service length assigned on population
    #[must_use]
    pub const fn default_minutes(&self) -> u32 {
        self.default_minutes
    }

    /// Validates `pending → accepted` for `appointment`.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidState`] unless the appointment is pending.
    pub fn accept(appointment: &Appointment) -> Result<AppointmentStatus> {
        Self::transition(appointment, AppointmentStatus::Accepted)
    }

    /// Validates a forward status transition.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidState`] when the transition would go backwards or
    /// leave a terminal state.
    pub fn transition(appointment: &Appointment, next: AppointmentStatus) -> Result<AppointmentStatus> {
        if appointment.status.can_transition_to(next) {
            Ok(next)
        } else {
            Err(QueueError::InvalidState(format!(
                "appointment {} cannot move from {} to {}",
                appointment.id, appointment.status, next
            )))
        }
    }

    /// Oldest accepted appointment, skipping `exclude`.
    ///
    /// `min_by_key` keeps the first of equal keys, so ties resolve to input
    /// order.
    #[must_use]
    pub fn next_in_queue<'a>(
        appointments: &'a [Appointment],
        exclude: Option<&AppointmentId>,
    ) -> Option<&'a Appointment> {
        appointments
            .iter()
            .filter(|appointment| appointment.status == AppointmentStatus::Accepted)
            .filter(|appointment| Some(&appointment.id) != exclude)
            .min_by_key(|appointment| appointment.date_time)
    }

    /// Accepted appointments in service order
    #[must_use]
    pub fn queue(appointments: &[Appointment]) -> Vec<&Appointment> {
        let mut queue: Vec<&Appointment> = appointments
            .iter()
            .filter(|appointment| appointment.status == AppointmentStatus::Accepted)
            .collect();
        queue.sort_by_key(|appointment| appointment.date_time);
        queue
    }

    /// Slot record serving `appointment`, timer not started
    #[must_use]
    pub fn slot_for(&self, appointment: &Appointment) -> CurrentServingSlot {
        CurrentServingSlot {
            customer_name: Some(appointment.customer_name.clone()),
            seat_id: Some(appointment.seat_id.clone()),
            barber_id: Some(appointment.barber_id.clone()),
            appointment_id: Some(appointment.id.clone()),
            approx_duration_minutes: Some(self.default_minutes),
            ..CurrentServingSlot::idle()
        }
    }

    /// Moves an accepted appointment into an idle slot.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidState`] when the slot is occupied or the
    /// appointment is not accepted.
    pub fn populate(
        &self,
        slot: &CurrentServingSlot,
        appointment: &Appointment,
    ) -> Result<CurrentServingSlot> {
        if !slot.is_idle() {
            return Err(QueueError::InvalidState(format!(
                "slot is already serving {}",
                slot.appointment_id
                    .as_ref()
                    .map_or("a walk-in", AppointmentId::as_str)
            )));
        }
        if appointment.status != AppointmentStatus::Accepted {
            return Err(QueueError::InvalidState(format!(
                "appointment {} is {}, only accepted appointments can be served",
                appointment.id, appointment.status
            )));
        }
        Ok(self.slot_for(appointment))
    }

    /// Plans the end of the current service.
    ///
    /// 1. the current appointment is completed, unless it is already
    ///    completed (or unknown), which keeps repeated advances side-effect
    ///    free
    /// 2. the timer stops
    /// 3. the oldest other accepted appointment fills the slot, or the slot
    ///    goes idle
    ///
    /// The current seat is released when the next service does not reuse it.
    #[must_use]
    pub fn plan_advance(
        &self,
        slot: &CurrentServingSlot,
        appointments: &[Appointment],
    ) -> AdvancePlan {
        let current = slot.appointment_id.as_ref();

        let complete = current
            .and_then(|id| appointments.iter().find(|appointment| &appointment.id == id))
            .filter(|appointment| appointment.status.can_transition_to(AppointmentStatus::Completed))
            .map(|appointment| appointment.id.clone());

        let stopped = TimerEngine::stop(slot);
        let next = Self::next_in_queue(appointments, current);
        let next_slot = next.map_or_else(CurrentServingSlot::idle, |appointment| {
            self.slot_for(appointment)
        });

        let release_seat = stopped
            .seat_id
            .filter(|seat_id| next_slot.seat_id.as_ref() != Some(seat_id));

        AdvancePlan {
            complete,
            release_seat,
            next_appointment: next.map(|appointment| appointment.id.clone()),
            next_slot,
        }
    }
}
