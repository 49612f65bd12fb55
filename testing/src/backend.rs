//! In-memory [`ServingBackend`].
//!
//! Behaves like the hosted row store the desk talks to in production:
//! field-replace merges on the slot, guarded writes, stable ordering of
//! appointments and a change feed per table. On top of that it lets a test
//! inject failures, interleave a competing write, and count calls.

#![allow(clippy::unwrap_used)] // Test infrastructure; a poisoned lock means a test already panicked
#![allow(clippy::missing_panics_doc)]

use futures::future::BoxFuture;
use futures::{Future, FutureExt, StreamExt};
use salon_queue_core::types::{
    Appointment, AppointmentId, AppointmentStatus, CurrentServingSlot, Seat, SeatId, SeatUpdate,
    SlotGuard, SlotPatch,
};
use salon_queue_runtime::backend::{
    AppointmentFilter, BackendError, BackendFuture, ChangeRecord, ChangeStream, ServingBackend,
    Table,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

type SlotInterleave = Box<dyn FnOnce(&mut CurrentServingSlot) + Send>;

#[derive(Default)]
struct Records {
    slot: Option<CurrentServingSlot>,
    appointments: Vec<Appointment>,
    seats: Vec<Seat>,
}

struct Shared {
    records: Mutex<Records>,
    changes: broadcast::Sender<ChangeRecord>,
    failures: Mutex<HashMap<&'static str, VecDeque<BackendError>>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    interleave: Mutex<Option<SlotInterleave>>,
    before: Mutex<HashMap<&'static str, BoxFuture<'static, ()>>>,
}

/// In-memory collaborator for tests and the demo binary.
///
/// Clones share the same records, so one handle can be given to the desk and
/// another kept for assertions.
///
/// # Example
///
/// ```
/// use salon_queue_runtime::backend::ServingBackend;
/// use salon_queue_testing::InMemoryBackend;
///
/// # async fn example() {
/// let backend = InMemoryBackend::new();
/// let slot = backend.get_slot().await.unwrap();
/// assert!(slot.is_idle());
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let records = self.shared.records.lock().unwrap();
        f.debug_struct("InMemoryBackend")
            .field("slot", &records.slot)
            .field("appointments", &records.appointments.len())
            .field("seats", &records.seats.len())
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// A backend with an idle slot and no appointments or seats
    #[must_use]
    pub fn new() -> Self {
        let backend = Self::unprovisioned();
        backend.shared.records.lock().unwrap().slot = Some(CurrentServingSlot::idle());
        backend
    }

    /// A backend whose slot record does not exist yet
    #[must_use]
    pub fn unprovisioned() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            shared: Arc::new(Shared {
                records: Mutex::new(Records::default()),
                changes,
                failures: Mutex::new(HashMap::new()),
                calls: Mutex::new(HashMap::new()),
                interleave: Mutex::new(None),
                before: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Adds appointments in insertion order
    #[must_use]
    pub fn with_appointments(self, appointments: impl IntoIterator<Item = Appointment>) -> Self {
        self.shared
            .records
            .lock()
            .unwrap()
            .appointments
            .extend(appointments);
        self
    }

    /// Adds seats in provisioning order
    #[must_use]
    pub fn with_seats(self, seats: impl IntoIterator<Item = Seat>) -> Self {
        self.shared.records.lock().unwrap().seats.extend(seats);
        self
    }

    /// Replaces the slot
    #[must_use]
    pub fn with_slot(self, slot: CurrentServingSlot) -> Self {
        self.shared.records.lock().unwrap().slot = Some(slot);
        self
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Current slot record, if provisioned
    #[must_use]
    pub fn slot(&self) -> Option<CurrentServingSlot> {
        self.shared.records.lock().unwrap().slot.clone()
    }

    /// One appointment by id
    #[must_use]
    pub fn appointment(&self, id: &str) -> Option<Appointment> {
        self.shared
            .records
            .lock()
            .unwrap()
            .appointments
            .iter()
            .find(|appointment| appointment.id.as_str() == id)
            .cloned()
    }

    /// One seat by id
    #[must_use]
    pub fn seat(&self, id: &str) -> Option<Seat> {
        self.shared
            .records
            .lock()
            .unwrap()
            .seats
            .iter()
            .find(|seat| seat.id.as_str() == id)
            .cloned()
    }

    /// How many times `operation` was called (trait method name)
    #[must_use]
    pub fn calls(&self, operation: &str) -> usize {
        self.shared
            .calls
            .lock()
            .unwrap()
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------------

    /// Makes the next call to `operation` fail with `error`.
    ///
    /// Calls queue up: failing twice makes the next two calls fail.
    pub fn fail_next(&self, operation: &'static str, error: BackendError) {
        self.shared
            .failures
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Runs `write` against the stored slot right before the next
    /// `update_slot` checks its guard, as if another client wrote first.
    pub fn interleave_slot_write(&self, write: impl FnOnce(&mut CurrentServingSlot) + Send + 'static) {
        *self.shared.interleave.lock().unwrap() = Some(Box::new(write));
    }

    /// Awaits `work` at the start of the next call to `operation`, before the
    /// call touches any record. Lets a test land a write while the caller is
    /// suspended in that call.
    pub fn run_before_next(
        &self,
        operation: &'static str,
        work: impl Future<Output = ()> + Send + 'static,
    ) {
        self.shared.before.lock().unwrap().insert(operation, work.boxed());
    }

    /// Writes the slot as another client would, notifying subscribers
    pub fn remote_slot_write(&self, slot: CurrentServingSlot) {
        self.shared.records.lock().unwrap().slot = Some(slot.clone());
        self.notify(ChangeRecord::ServingSlot(slot));
    }

    /// Writes a seat as another client would, notifying subscribers
    pub fn remote_seat_write(&self, seat: Seat) {
        {
            let mut records = self.shared.records.lock().unwrap();
            match records.seats.iter_mut().find(|known| known.id == seat.id) {
                Some(known) => *known = seat.clone(),
                None => records.seats.push(seat.clone()),
            }
        }
        self.notify(ChangeRecord::Seat(seat));
    }

    async fn enter(&self, operation: &'static str) -> Result<(), BackendError> {
        let before = self.shared.before.lock().unwrap().remove(operation);
        if let Some(work) = before {
            work.await;
        }

        *self.shared.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
        let injected = self
            .shared
            .failures
            .lock()
            .unwrap()
            .get_mut(operation)
            .and_then(VecDeque::pop_front);
        match injected {
            Some(error) => {
                tracing::debug!(operation, error = %error, "Injected backend failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn notify(&self, change: ChangeRecord) {
        self.shared.changes.send(change).ok();
    }

    fn missing_slot() -> BackendError {
        BackendError::NotFound {
            entity: "slot",
            id: "current_state".to_string(),
        }
    }
}

impl ServingBackend for InMemoryBackend {
    fn get_slot(&self) -> BackendFuture<'_, CurrentServingSlot> {
        Box::pin(async move {
            self.enter("get_slot").await?;
            self.shared
                .records
                .lock()
                .unwrap()
                .slot
                .clone()
                .ok_or_else(Self::missing_slot)
        })
    }

    fn update_slot(&self, patch: SlotPatch, guard: SlotGuard) -> BackendFuture<'_, CurrentServingSlot> {
        Box::pin(async move {
            self.enter("update_slot").await?;
            let interleave = self.shared.interleave.lock().unwrap().take();

            let persisted = {
                let mut records = self.shared.records.lock().unwrap();
                let slot = records.slot.as_mut().ok_or_else(Self::missing_slot)?;

                if let Some(write) = interleave {
                    write(slot);
                }
                if !guard.admits(slot) {
                    let expected = match &guard {
                        SlotGuard::AppointmentIs(expected) => expected.clone(),
                        SlotGuard::Unconditional => None,
                    };
                    return Err(BackendError::PreconditionFailed {
                        expected,
                        actual: slot.appointment_id.clone(),
                    });
                }

                patch.apply_to(slot);
                slot.clone()
            };

            self.notify(ChangeRecord::ServingSlot(persisted.clone()));
            Ok(persisted)
        })
    }

    fn get_appointments(&self, filter: AppointmentFilter) -> BackendFuture<'_, Vec<Appointment>> {
        Box::pin(async move {
            self.enter("get_appointments").await?;
            let mut matching: Vec<Appointment> = self
                .shared
                .records
                .lock()
                .unwrap()
                .appointments
                .iter()
                .filter(|appointment| filter.matches(appointment))
                .cloned()
                .collect();
            matching.sort_by_key(|appointment| appointment.date_time);
            Ok(matching)
        })
    }

    fn get_appointment(&self, id: &AppointmentId) -> BackendFuture<'_, Appointment> {
        let id = id.clone();
        Box::pin(async move {
            self.enter("get_appointment").await?;
            self.appointment(id.as_str()).ok_or(BackendError::NotFound {
                entity: "appointment",
                id: id.to_string(),
            })
        })
    }

    fn update_appointment_status(
        &self,
        id: &AppointmentId,
        status: AppointmentStatus,
    ) -> BackendFuture<'_, ()> {
        let id = id.clone();
        Box::pin(async move {
            self.enter("update_appointment_status").await?;
            let updated = {
                let mut records = self.shared.records.lock().unwrap();
                let appointment = records
                    .appointments
                    .iter_mut()
                    .find(|appointment| appointment.id == id)
                    .ok_or_else(|| BackendError::NotFound {
                        entity: "appointment",
                        id: id.to_string(),
                    })?;
                appointment.status = status;
                appointment.clone()
            };
            self.notify(ChangeRecord::Appointment(updated));
            Ok(())
        })
    }

    fn get_seats(&self) -> BackendFuture<'_, Vec<Seat>> {
        Box::pin(async move {
            self.enter("get_seats").await?;
            Ok(self.shared.records.lock().unwrap().seats.clone())
        })
    }

    fn update_seat(&self, id: &SeatId, update: SeatUpdate) -> BackendFuture<'_, ()> {
        let id = id.clone();
        Box::pin(async move {
            self.enter("update_seat").await?;
            let updated = {
                let mut records = self.shared.records.lock().unwrap();
                let seat = records
                    .seats
                    .iter_mut()
                    .find(|seat| seat.id == id)
                    .ok_or_else(|| BackendError::NotFound {
                        entity: "seat",
                        id: id.to_string(),
                    })?;
                seat.apply(&update);
                seat.clone()
            };
            self.notify(ChangeRecord::Seat(updated));
            Ok(())
        })
    }

    fn subscribe(&self, table: Table) -> BackendFuture<'_, ChangeStream> {
        Box::pin(async move {
            self.enter("subscribe").await?;
            let mut receiver = self.shared.changes.subscribe();

            let stream = async_stream::stream! {
                loop {
                    match receiver.recv().await {
                        Ok(change) => yield change,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "In-memory change feed lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            };

            Ok(stream.filter(move |change| futures::future::ready(change.table() == table)).boxed())
        })
    }
}
