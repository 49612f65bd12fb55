//! # Salon Queue Runtime
//!
//! Imperative shell around [`salon_queue_core`].
//!
//! ## Core Components
//!
//! - **Backend**: [`backend::ServingBackend`], the persistence collaborator
//!   holding the slot, appointments and seats, with change notifications
//! - **Store**: [`store::SingleSlotQueueStore`], the only path to the shared
//!   slot; read-modify-write with optional guards, plus snapshot broadcast
//! - **Desk**: [`desk::ServingDesk`], the operator commands
//! - **Ticker**: [`ticker::SessionTicker`], the per-screen loop recomputing the
//!   countdown and seat colours and releasing lapsed holds
//!
//! ## Example
//!
//! ```ignore
//! use salon_queue_runtime::{DeskConfig, ServingDesk, SessionTicker, SingleSlotQueueStore};
//! use salon_queue_core::environment::SystemClock;
//! use std::sync::Arc;
//!
//! let config = DeskConfig::from_env();
//! let store = Arc::new(SingleSlotQueueStore::with_config(backend, &config));
//! let desk = ServingDesk::new(store, Arc::new(SystemClock), config);
//!
//! desk.accept_appointment(&appointment_id).await?;
//! desk.move_to_serving(&appointment_id).await?;
//! desk.start_service(None).await?;
//!
//! let ticker = SessionTicker::spawn(desk.clone()).await?;
//! println!("{}", ticker.latest().countdown);
//! ```

/// Persistence collaborator trait and change notifications
pub mod backend;

/// Bounded retry for collaborator reads
pub mod retry;

/// Desk configuration loaded from the environment
pub mod config;

/// The shared serving slot
pub mod store;

/// Operator commands
pub mod desk;

/// Per-session recomputation loop
pub mod ticker;

pub use backend::{
    AppointmentFilter, BackendError, BackendFuture, ChangeRecord, ChangeStream, ServingBackend,
    Table,
};
pub use config::DeskConfig;
pub use desk::{AdvanceOutcome, ServingDesk};
pub use retry::RetryPolicy;
pub use store::{FeedHandle, SingleSlotQueueStore, SlotSubscription};
pub use ticker::{SessionTicker, TickFrame};
