//! # Poster Synchronization Engine
//!
//! Orchestrates synchronization of media server artwork with externally
//! curated poster sets.
//!
//! ## Components
//!
//! - **File Selector** (`selector`): deterministic filter and ordering of a
//!   set's files by selected artifact types
//! - **Reconciliation Engine** (`engine`): one run-locked pass over all
//!   auto-download subscriptions with partial-failure containment
//! - **Download Queue** (`queue`): durable file-backed record of deferred
//!   and failed tasks
//! - **Repository** (`repository`): SQLite persistence for subscriptions
//! - **Events** (`events`): abstract notification boundary

pub mod engine;
pub mod error;
pub mod events;
pub mod queue;
pub mod repository;
pub mod selector;

pub use engine::{EngineConfig, PassStats, ReconciliationEngine};
pub use error::{Result, SyncError};
pub use events::{EventKind, LogNotifier, Notifier, SyncEvent};
pub use queue::{DownloadQueue, QueueDocument, QueueKey, QueueStatus};
pub use repository::{SqliteSubscriptionRepository, SubscriptionRepository};
pub use selector::select_files;
