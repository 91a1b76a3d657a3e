//! Domain models for the poster synchronization core
//!
//! This module contains the uniform model every media server backend and
//! artwork provider is normalized into: library sections and their media
//! items on one side, curated poster sets and their files on the other,
//! and the persisted subscription linking the two.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LibraryError, Result};

// =============================================================================
// ID Types
// =============================================================================

/// Opaque identifier assigned by the media server to a title, season or
/// episode. Only meaningful within one server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RatingKey(pub String);

impl RatingKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RatingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RatingKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Media Items
// =============================================================================

/// Kind of a library item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaItemKind {
    Movie,
    Show,
}

impl MediaItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Show => "show",
        }
    }
}

impl std::str::FromStr for MediaItemKind {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "movie" => Ok(Self::Movie),
            "show" => Ok(Self::Show),
            _ => Err(LibraryError::InvalidInput {
                field: "media_item_kind".to_string(),
                message: format!("unknown kind: {}", s),
            }),
        }
    }
}

/// External identifier attached to a media item, e.g. `("tmdb", "603")`.
///
/// Order is preserved as reported by the server; at most one `tmdb` entry is
/// authoritative for cross-catalog joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guid {
    pub provider: String,
    pub id: String,
}

/// One episode inside a season. Carries its own rating key because episode
/// title cards are pushed directly to the episode entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub number: u32,
    pub rating_key: RatingKey,
    #[serde(default)]
    pub title: String,
}

/// One season of a show, with its episodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub number: u32,
    pub rating_key: RatingKey,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

/// Season/episode tree of a show.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub seasons: Vec<Season>,
}

impl Series {
    pub fn season_count(&self) -> usize {
        self.seasons.len()
    }

    pub fn episode_count(&self) -> usize {
        self.seasons.iter().map(|s| s.episodes.len()).sum()
    }

    pub fn season(&self, number: u32) -> Option<&Season> {
        self.seasons.iter().find(|s| s.number == number)
    }

    pub fn episode(&self, season_number: u32, episode_number: u32) -> Option<&Episode> {
        self.season(season_number)
            .and_then(|s| s.episodes.iter().find(|e| e.number == episode_number))
    }
}

/// A single title in a library section (movie or show).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub rating_key: RatingKey,
    pub kind: MediaItemKind,
    pub title: String,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub guids: Vec<Guid>,
    pub updated_at: DateTime<Utc>,
    /// Present iff `kind == Show`.
    #[serde(default)]
    pub series: Option<Series>,
}

impl MediaItem {
    /// The TMDB id used to join this item to an external artwork set, if the
    /// server reported one.
    pub fn tmdb_id(&self) -> Option<&str> {
        self.guids
            .iter()
            .find(|g| g.provider == "tmdb")
            .map(|g| g.id.as_str())
    }
}

// =============================================================================
// Library Sections
// =============================================================================

/// A media server library section ("Movies", "TV Shows", ...).
///
/// Invariant: `total_size == items.len()` and no duplicate `rating_key`
/// within one section; both are maintained by `LibraryIndex`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySection {
    pub title: String,
    pub kind: MediaItemKind,
    pub items: Vec<MediaItem>,
    pub total_size: usize,
}

impl LibrarySection {
    pub fn new(title: impl Into<String>, kind: MediaItemKind, items: Vec<MediaItem>) -> Self {
        let total_size = items.len();
        Self {
            title: title.into(),
            kind,
            items,
            total_size,
        }
    }
}

// =============================================================================
// Poster Sets
// =============================================================================

/// Kind of a curated artwork set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PosterSetKind {
    Movie,
    Show,
    Collection,
}

impl PosterSetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Show => "show",
            Self::Collection => "collection",
        }
    }
}

/// Kind of an individual artwork file within a set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PosterFileKind {
    Poster,
    Backdrop,
    SeasonPoster,
    Titlecard,
}

impl PosterFileKind {
    /// Ordering rank used by the file selector. The rank is a contract
    /// consumed by progress-reporting UIs.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Poster => 1,
            Self::Backdrop => 2,
            Self::SeasonPoster => 3,
            Self::Titlecard => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poster => "poster",
            Self::Backdrop => "backdrop",
            Self::SeasonPoster => "seasonPoster",
            Self::Titlecard => "titlecard",
        }
    }
}

/// Season reference carried by a `SeasonPoster` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonRef {
    pub number: u32,
}

/// Episode reference carried by a `Titlecard` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRef {
    pub season_number: u32,
    pub episode_number: u32,
    #[serde(default)]
    pub title: String,
}

/// One artwork file inside a poster set.
///
/// `season` is present iff `kind == SeasonPoster`; `episode` iff
/// `kind == Titlecard`; plain posters and backdrops carry neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosterFile {
    pub id: String,
    pub kind: PosterFileKind,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub season: Option<SeasonRef>,
    #[serde(default)]
    pub episode: Option<EpisodeRef>,
}

/// A curated bundle of artwork files for one title or collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosterSet {
    pub id: String,
    pub title: String,
    pub kind: PosterSetKind,
    pub date_updated: DateTime<Utc>,
    pub files: Vec<PosterFile>,
}

// =============================================================================
// Subscriptions
// =============================================================================

/// User-selected artifact types for one subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedTypes {
    #[serde(default)]
    pub poster: bool,
    #[serde(default)]
    pub backdrop: bool,
    #[serde(default)]
    pub season_poster: bool,
    #[serde(default)]
    pub titlecard: bool,
}

impl SelectedTypes {
    pub fn all() -> Self {
        Self {
            poster: true,
            backdrop: true,
            season_poster: true,
            titlecard: true,
        }
    }

    pub fn contains(&self, kind: PosterFileKind) -> bool {
        match kind {
            PosterFileKind::Poster => self.poster,
            PosterFileKind::Backdrop => self.backdrop,
            PosterFileKind::SeasonPoster => self.season_poster,
            PosterFileKind::Titlecard => self.titlecard,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.poster || self.backdrop || self.season_poster || self.titlecard)
    }
}

/// Key identifying a subscription: the cross-catalog TMDB id plus the
/// library section the item lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub tmdb_id: String,
    pub library: String,
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.library, self.tmdb_id)
    }
}

/// Persisted link between a media item, a chosen poster set, the selected
/// artifact types and the auto-sync preference.
///
/// `last_update` is kept as the raw RFC 3339 string it was written with; a
/// value that fails to parse must survive round-trips so the fail-open
/// staleness rule can see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub library_title: String,
    pub item: MediaItem,
    pub set: PosterSet,
    pub selected_types: SelectedTypes,
    pub auto_download: bool,
    #[serde(default)]
    pub last_update: String,
}

impl Subscription {
    /// Key of this subscription, if the stored item carries a TMDB guid.
    pub fn key(&self) -> Option<SubscriptionKey> {
        self.item.tmdb_id().map(|tmdb| SubscriptionKey {
            tmdb_id: tmdb.to_string(),
            library: self.library_title.clone(),
        })
    }
}
