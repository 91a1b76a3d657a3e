//! # Artwork Provider
//!
//! Client and normalization layer for the externally curated poster set
//! catalog, plus the staleness primitive the reconciliation engine uses to
//! decide what must be re-fetched.
//!
//! ## Components
//!
//! - **Provider** (`provider`): `PosterSetProvider` trait and the HTTP
//!   implementation with upstream-shape normalization
//! - **Staleness** (`staleness`): fail-open timestamp comparison

pub mod error;
pub mod provider;
pub mod staleness;

pub use error::{ArtworkError, Result};
pub use provider::{
    AssetQuality, HttpPosterSetProvider, PosterSetProvider, ProviderConfig,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use staleness::is_stale;
