//! Media server gateway trait and configuration
//!
//! The capability set every backend implements. The concrete backend is
//! selected exactly once at startup from configuration via
//! [`create_gateway`]; call sites only ever see the trait object.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use core_library::models::{MediaItem, MediaItemKind, PosterFileKind, RatingKey};

use crate::emby::EmbyGateway;
use crate::error::Result;
use crate::plex::PlexGateway;

/// Default per-request timeout in seconds. A timeout is a normal,
/// recoverable failure handled by the caller.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Supported media server backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Plex,
    /// Emby and Jellyfin share the same API surface for everything the
    /// gateway needs.
    #[serde(alias = "jellyfin")]
    Emby,
}

/// Gateway configuration, deserialized from the application config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub kind: ServerKind,
    pub base_url: String,
    pub token: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Resolved id and kind of a library section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    pub id: String,
    pub kind: MediaItemKind,
}

/// One page of section items plus the server-reported total.
#[derive(Debug, Clone)]
pub struct ItemPage {
    pub items: Vec<MediaItem>,
    pub total_count: u64,
}

/// Image variants that can be fetched from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Poster,
    Backdrop,
}

/// Capability set of a media server backend.
///
/// Errors are typed and returned, never retried here; retry policy belongs
/// to the caller.
#[async_trait]
pub trait MediaServerGateway: Send + Sync {
    /// Resolve a library section by name. `Ok(None)` when no section with
    /// that name exists.
    async fn fetch_section_info(&self, name: &str) -> Result<Option<SectionInfo>>;

    /// Fetch one page of a section's items starting at `start_index`,
    /// together with the total item count.
    async fn fetch_section_items(&self, section_id: &str, start_index: u64) -> Result<ItemPage>;

    /// Fetch a single item with full detail; for shows this includes the
    /// complete season/episode tree.
    async fn fetch_item(&self, rating_key: &RatingKey, section_title: &str) -> Result<MediaItem>;

    /// Fetch the current image of the given kind for an item.
    async fn fetch_image(&self, rating_key: &RatingKey, kind: ImageKind) -> Result<Bytes>;

    /// Push artwork bytes to the target entity. `kind` is mapped to the
    /// server's native concept by the adapter.
    async fn push_artifact(
        &self,
        target: &RatingKey,
        data: Bytes,
        kind: PosterFileKind,
    ) -> Result<()>;

    /// Trigger a metadata refresh of the given entity.
    async fn refresh(&self, rating_key: &RatingKey) -> Result<()>;
}

/// Build the gateway for the configured backend.
///
/// This is the only place the backend kind is branched on.
pub fn create_gateway(config: &GatewayConfig) -> Result<Arc<dyn MediaServerGateway>> {
    Ok(match config.kind {
        ServerKind::Plex => Arc::new(PlexGateway::new(config)?),
        ServerKind::Emby => Arc::new(EmbyGateway::new(config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_kind_accepts_jellyfin_alias() {
        let kind: ServerKind = serde_json::from_str("\"jellyfin\"").unwrap();
        assert_eq!(kind, ServerKind::Emby);
        let kind: ServerKind = serde_json::from_str("\"plex\"").unwrap();
        assert_eq!(kind, ServerKind::Plex);
    }

    #[test]
    fn config_defaults_timeout() {
        let config: GatewayConfig = serde_json::from_str(
            r#"{"kind":"plex","base_url":"http://localhost:32400","token":"t"}"#,
        )
        .unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }
}
