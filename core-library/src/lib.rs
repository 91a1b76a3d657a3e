//! # Library Core
//!
//! Domain models and shared state for the poster synchronization engine.
//!
//! ## Components
//!
//! - **Models** (`models`): the uniform domain model every backend and
//!   provider response is normalized into
//! - **Library Index** (`index`): concurrent in-memory cache of library
//!   sections and media items
//! - **Series Detection** (`series`): season/episode addition detection
//!   between two item snapshots

pub mod error;
pub mod index;
pub mod models;
pub mod series;

pub use error::{LibraryError, Result};
pub use index::LibraryIndex;
pub use models::{
    Episode, EpisodeRef, Guid, LibrarySection, MediaItem, MediaItemKind, PosterFile,
    PosterFileKind, PosterSet, PosterSetKind, RatingKey, Season, SeasonRef, SelectedTypes,
    Series, Subscription, SubscriptionKey,
};
pub use series::{episode_was_added, has_more_seasons_or_episodes, season_was_added};
