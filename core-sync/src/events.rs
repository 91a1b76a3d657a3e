//! Notification boundary
//!
//! The engine reports definitive failures and user-visible warnings as
//! abstract events. Delivery (Discord, Pushover, Gotify, webhooks) is an
//! external collaborator behind the [`Notifier`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Optional enrichment failed or needs user attention; sync continued.
    Warning,
    /// The primary fetch or apply failed entirely for a subscription.
    Error,
}

/// Abstract notification event emitted by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub kind: EventKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: SyncEvent);
}

/// Notifier that forwards events to the log. Used when no delivery
/// transport is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: SyncEvent) {
        match event.kind {
            EventKind::Warning => warn!(title = %event.title, "{}", event.message),
            EventKind::Error => error!(title = %event.title, "{}", event.message),
        }
    }
}
