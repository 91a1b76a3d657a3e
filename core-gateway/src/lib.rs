//! # Media Server Gateway
//!
//! Uniform async interface over the supported media server backends.
//!
//! ## Overview
//!
//! The gateway fetches library and item metadata, fetches and pushes
//! artwork, and triggers metadata refreshes. The backend (Plex, or
//! Emby/Jellyfin) is selected exactly once at startup from configuration;
//! everything downstream works against the [`MediaServerGateway`] trait and
//! never branches on the backend kind.
//!
//! ## Components
//!
//! - **Gateway trait** (`gateway`): capability set, configuration and the
//!   backend factory
//! - **Plex adapter** (`plex`): Plex Media Server MediaContainer API
//! - **Emby adapter** (`emby`): Emby / Jellyfin Items API

pub mod emby;
pub mod error;
pub mod gateway;
pub mod plex;

pub use emby::EmbyGateway;
pub use error::{GatewayError, Result};
pub use gateway::{
    create_gateway, GatewayConfig, ImageKind, ItemPage, MediaServerGateway, SectionInfo,
    ServerKind, DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use plex::PlexGateway;
