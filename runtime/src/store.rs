//! The shared "now serving" record.
//!
//! [`SingleSlotQueueStore`] owns every access to the singleton slot. Writes
//! are read-modify-write: the persisted slot is read, a pure mutation produces
//! the next record, and the whole record is sent back as one field-replace
//! patch. Local writers are serialised by an async mutex; writers on other
//! clients are only ordered by the collaborator, so unguarded writes are
//! last-write-wins and [`SingleSlotQueueStore::write_guarded`] exists for the
//! transitions where that is not acceptable.
//!
//! Every persisted record (local writes, plus remote ones once
//! [`SingleSlotQueueStore::connect`] is running) is published to subscribers
//! as a full snapshot.

use crate::backend::{ChangeRecord, ServingBackend, Table};
use crate::config::DeskConfig;
use crate::retry::{retry_read, RetryPolicy};
use futures::StreamExt;
use salon_queue_core::error::{QueueError, Result};
use salon_queue_core::types::{AppointmentId, CurrentServingSlot, SlotGuard, SlotPatch};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Default number of snapshots buffered per subscriber
pub const DEFAULT_BROADCAST_CAPACITY: usize = 16;

/// Owner of the singleton slot record.
pub struct SingleSlotQueueStore {
    backend: Arc<dyn ServingBackend>,
    retry: RetryPolicy,
    snapshots: broadcast::Sender<CurrentServingSlot>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for SingleSlotQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleSlotQueueStore")
            .field("retry", &self.retry)
            .field("subscribers", &self.snapshots.receiver_count())
            .finish_non_exhaustive()
    }
}

impl SingleSlotQueueStore {
    /// Creates a store over `backend` with default retry and buffering
    #[must_use]
    pub fn new(backend: Arc<dyn ServingBackend>) -> Self {
        Self::with_settings(backend, RetryPolicy::default(), DEFAULT_BROADCAST_CAPACITY)
    }

    /// Creates a store using the read retry and broadcast settings of `config`
    #[must_use]
    pub fn with_config(backend: Arc<dyn ServingBackend>, config: &DeskConfig) -> Self {
        Self::with_settings(
            backend,
            config.read_retry.policy(),
            config.broadcast_capacity,
        )
    }

    /// Creates a store with explicit settings.
    ///
    /// A zero `capacity` is raised to one.
    #[must_use]
    pub fn with_settings(
        backend: Arc<dyn ServingBackend>,
        retry: RetryPolicy,
        capacity: usize,
    ) -> Self {
        let (snapshots, _) = broadcast::channel(capacity.max(1));
        Self {
            backend,
            retry,
            snapshots,
            write_lock: Mutex::new(()),
        }
    }

    /// The collaborator behind this store
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn ServingBackend> {
        &self.backend
    }

    /// Retry policy applied to reads
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Reads the persisted slot.
    ///
    /// # Errors
    ///
    /// [`QueueError::NotFound`] when the slot was never provisioned,
    /// [`QueueError::Persistence`] when the read fails.
    pub async fn read(&self) -> Result<CurrentServingSlot> {
        let backend = &self.backend;
        let slot = retry_read(&self.retry, "get_slot", || backend.get_slot()).await?;
        Ok(slot)
    }

    /// Applies `mutation` to the persisted slot and writes the result back
    /// (last-write-wins).
    ///
    /// # Errors
    ///
    /// The mutation's own error, [`QueueError::InvalidState`] when it
    /// produces an inconsistent record, or [`QueueError::Persistence`] when
    /// the write fails. Nothing is written on error.
    pub async fn write<F>(&self, mutation: F) -> Result<CurrentServingSlot>
    where
        F: FnOnce(&CurrentServingSlot) -> Result<CurrentServingSlot> + Send,
    {
        self.apply(SlotGuard::Unconditional, mutation).await
    }

    /// Like [`write`](Self::write), but only persists when the slot still
    /// serves `expected`.
    ///
    /// # Errors
    ///
    /// [`QueueError::Conflict`] when another writer moved the slot on, plus
    /// everything [`write`](Self::write) returns.
    pub async fn write_guarded<F>(
        &self,
        expected: Option<AppointmentId>,
        mutation: F,
    ) -> Result<CurrentServingSlot>
    where
        F: FnOnce(&CurrentServingSlot) -> Result<CurrentServingSlot> + Send,
    {
        self.apply(SlotGuard::AppointmentIs(expected), mutation).await
    }

    #[tracing::instrument(skip(self, mutation), name = "slot_write")]
    async fn apply<F>(&self, guard: SlotGuard, mutation: F) -> Result<CurrentServingSlot>
    where
        F: FnOnce(&CurrentServingSlot) -> Result<CurrentServingSlot> + Send,
    {
        let _writer = self.write_lock.lock().await;

        let current = self.read().await?;
        if !guard.admits(&current) {
            return Err(self.reject(&guard, &current));
        }

        let next = mutation(&current)?;
        next.validate()?;

        match self.backend.update_slot(SlotPatch::full(&next), guard).await {
            Ok(persisted) => {
                metrics::counter!("store.writes").increment(1);
                tracing::debug!(
                    appointment_id = ?persisted.appointment_id,
                    paused = persisted.paused,
                    "Slot written"
                );
                self.publish(persisted.clone());
                Ok(persisted)
            }
            Err(error) => {
                let error = QueueError::from(error);
                if matches!(error, QueueError::Conflict { .. }) {
                    metrics::counter!("store.conflicts").increment(1);
                    tracing::warn!(error = %error, "Guarded slot write lost a race");
                } else {
                    tracing::error!(error = %error, "Slot write failed");
                }
                Err(error)
            }
        }
    }

    fn reject(&self, guard: &SlotGuard, current: &CurrentServingSlot) -> QueueError {
        let error = guard.conflict(current);
        metrics::counter!("store.conflicts").increment(1);
        tracing::warn!(
            error = %error,
            subscribers = self.snapshots.receiver_count(),
            "Slot moved on before the guarded write"
        );
        error
    }

    /// Sends `slot` to every subscriber; having none is not an error.
    fn publish(&self, slot: CurrentServingSlot) {
        self.snapshots.send(slot).ok();
    }

    /// Subscribes to slot snapshots.
    ///
    /// Only snapshots published after this call are delivered; read the slot
    /// first for the current value.
    #[must_use]
    pub fn subscribe(&self) -> SlotSubscription {
        SlotSubscription {
            receiver: self.snapshots.subscribe(),
            backend: Arc::clone(&self.backend),
            retry: self.retry.clone(),
            stale: false,
        }
    }

    /// Forwards the collaborator's slot change feed to subscribers, so
    /// writes made by other clients are seen here.
    ///
    /// # Errors
    ///
    /// [`QueueError::Persistence`] when the feed cannot be opened.
    pub async fn connect(&self) -> Result<FeedHandle> {
        let mut changes = self.backend.subscribe(Table::ServingSlot).await?;
        let sender = self.snapshots.clone();

        let task = tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                if let ChangeRecord::ServingSlot(slot) = change {
                    tracing::trace!(appointment_id = ?slot.appointment_id, "Slot change received");
                    sender.send(slot).ok();
                }
            }
            tracing::debug!("Slot change feed ended");
        });

        tracing::info!(table = %Table::ServingSlot, "Connected to slot change feed");
        Ok(FeedHandle { task })
    }
}

/// Receiver of slot snapshots.
///
/// A subscriber that falls behind skips to the newest state: the backlog is
/// dropped and the slot is re-read, since every snapshot replaces the last.
#[derive(Debug)]
pub struct SlotSubscription {
    receiver: broadcast::Receiver<CurrentServingSlot>,
    backend: Arc<dyn ServingBackend>,
    retry: RetryPolicy,
    /// Set on lag until a re-read succeeds or gives up
    stale: bool,
}

impl SlotSubscription {
    /// Next snapshot, or `None` once the store is gone.
    ///
    /// Cancel safe: dropping the future mid re-read leaves the lag pending,
    /// and the next call re-reads before waiting for snapshots.
    pub async fn recv(&mut self) -> Option<CurrentServingSlot> {
        loop {
            if self.stale {
                let backend = &self.backend;
                let reread = retry_read(&self.retry, "get_slot", || backend.get_slot()).await;
                self.stale = false;
                match reread {
                    Ok(slot) => return Some(slot),
                    Err(error) => {
                        tracing::warn!(error = %error, "Re-read after lag failed, waiting for next snapshot");
                    }
                }
            }

            match self.receiver.recv().await {
                Ok(slot) => return Some(slot),
                Err(RecvError::Closed) => return None,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Slot subscriber lagged, re-reading slot");
                    metrics::counter!("store.subscriber_lagged").increment(1);
                    self.receiver = self.receiver.resubscribe();
                    self.stale = true;
                }
            }
        }
    }
}

/// Running change feed; dropping the handle stops forwarding.
#[derive(Debug)]
pub struct FeedHandle {
    task: JoinHandle<()>,
}

impl FeedHandle {
    /// Whether the feed has stopped
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
