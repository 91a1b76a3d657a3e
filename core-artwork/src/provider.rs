//! # Poster Set Provider
//!
//! Client for the externally curated artwork catalog, keyed by TMDB id.
//!
//! ## Overview
//!
//! Upstream responses come in three shapes (movie sets, show sets,
//! collection sets) with different grouping of their assets. This module
//! normalizes all of them into the uniform `PosterSet`/`PosterFile` model so
//! the rest of the engine never sees an upstream shape. When duplicate
//! upstream grouping keys collide on the same logical artifact (two posters
//! for season 2, say), the latest by modification time wins.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use core_library::models::{
    EpisodeRef, MediaItemKind, PosterFile, PosterFileKind, PosterSet, PosterSetKind, SeasonRef,
};

use crate::error::{ArtworkError, Result};

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Download quality for artifact bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetQuality {
    Thumb,
    Optimized,
    Original,
}

impl AssetQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumb => "thumb",
            Self::Optimized => "optimized",
            Self::Original => "original",
        }
    }
}

/// Provider configuration, deserialized from the application config file.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Source of curated poster sets and their artifact bytes.
#[async_trait]
pub trait PosterSetProvider: Send + Sync {
    /// All sets published for the given TMDB id, normalized.
    async fn fetch_sets_for_item(
        &self,
        tmdb_id: &str,
        kind: MediaItemKind,
    ) -> Result<Vec<PosterSet>>;

    /// One set by its provider-assigned id.
    async fn fetch_set_by_id(&self, set_id: &str) -> Result<PosterSet>;

    /// Raw bytes of one artifact, plus its content type.
    async fn fetch_artifact_bytes(
        &self,
        asset_id: &str,
        modified: DateTime<Utc>,
        quality: AssetQuality,
    ) -> Result<(Bytes, String)>;
}

// ============================================================================
// Upstream DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
struct SetsEnvelope {
    #[serde(default)]
    sets: Vec<UpstreamSet>,
}

#[derive(Debug, Deserialize)]
struct SetEnvelope {
    set: UpstreamSet,
}

#[derive(Debug, Deserialize)]
struct UpstreamSet {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    date_updated: String,
    // Movie and show sets
    #[serde(default)]
    poster: Option<UpstreamAsset>,
    #[serde(default)]
    backdrop: Option<UpstreamAsset>,
    // Show sets
    #[serde(default)]
    season_posters: Vec<UpstreamSeasonAsset>,
    #[serde(default)]
    titlecards: Vec<UpstreamTitlecardAsset>,
    // Collection sets group assets per member movie
    #[serde(default)]
    movies: Vec<UpstreamMovieEntry>,
}

#[derive(Debug, Deserialize)]
struct UpstreamAsset {
    id: String,
    #[serde(default)]
    modified: String,
}

#[derive(Debug, Deserialize)]
struct UpstreamSeasonAsset {
    id: String,
    #[serde(default)]
    modified: String,
    season_number: u32,
}

#[derive(Debug, Deserialize)]
struct UpstreamTitlecardAsset {
    id: String,
    #[serde(default)]
    modified: String,
    season_number: u32,
    episode_number: u32,
    #[serde(default)]
    episode_title: String,
}

#[derive(Debug, Deserialize)]
struct UpstreamMovieEntry {
    #[serde(default)]
    poster: Option<UpstreamAsset>,
    #[serde(default)]
    backdrop: Option<UpstreamAsset>,
}

// ============================================================================
// Normalization
// ============================================================================

fn parse_time(raw: &str, what: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => t.with_timezone(&Utc),
        Err(_) => {
            warn!(raw, what, "unparseable upstream timestamp, using epoch");
            DateTime::<Utc>::UNIX_EPOCH
        }
    }
}

fn plain_file(asset: UpstreamAsset, kind: PosterFileKind) -> PosterFile {
    let modified = parse_time(&asset.modified, kind.as_str());
    PosterFile {
        id: asset.id,
        kind,
        modified,
        season: None,
        episode: None,
    }
}

/// Collapse files that target the same logical slot (same kind plus season/
/// episode coordinates), keeping the latest `modified`.
fn dedupe_latest(files: Vec<PosterFile>) -> Vec<PosterFile> {
    let mut result: Vec<PosterFile> = Vec::with_capacity(files.len());
    for file in files {
        let slot = result.iter_mut().find(|f| {
            f.kind == file.kind && f.season == file.season && {
                match (&f.episode, &file.episode) {
                    (Some(a), Some(b)) => {
                        a.season_number == b.season_number && a.episode_number == b.episode_number
                    }
                    (None, None) => true,
                    _ => false,
                }
            }
        });
        match slot {
            Some(existing) if existing.modified < file.modified => *existing = file,
            Some(_) => {}
            None => result.push(file),
        }
    }
    result
}

fn normalize_set(upstream: UpstreamSet) -> Result<PosterSet> {
    let kind = match upstream.kind.as_str() {
        "movie" => PosterSetKind::Movie,
        "show" => PosterSetKind::Show,
        "collection" => PosterSetKind::Collection,
        other => {
            return Err(ArtworkError::Validation(format!(
                "unexpected set type: {}",
                other
            )))
        }
    };

    let mut files: Vec<PosterFile> = Vec::new();
    if let Some(poster) = upstream.poster {
        files.push(plain_file(poster, PosterFileKind::Poster));
    }
    if let Some(backdrop) = upstream.backdrop {
        files.push(plain_file(backdrop, PosterFileKind::Backdrop));
    }
    for season in upstream.season_posters {
        let modified = parse_time(&season.modified, "seasonPoster");
        files.push(PosterFile {
            id: season.id,
            kind: PosterFileKind::SeasonPoster,
            modified,
            season: Some(SeasonRef {
                number: season.season_number,
            }),
            episode: None,
        });
    }
    for card in upstream.titlecards {
        let modified = parse_time(&card.modified, "titlecard");
        files.push(PosterFile {
            id: card.id,
            kind: PosterFileKind::Titlecard,
            modified,
            season: None,
            episode: Some(EpisodeRef {
                season_number: card.season_number,
                episode_number: card.episode_number,
                title: card.episode_title,
            }),
        });
    }
    // Collection sets carry one poster/backdrop per member movie; every
    // member is its own artifact, so no slot collapsing across members.
    for movie in upstream.movies {
        if let Some(poster) = movie.poster {
            files.push(plain_file(poster, PosterFileKind::Poster));
        }
        if let Some(backdrop) = movie.backdrop {
            files.push(plain_file(backdrop, PosterFileKind::Backdrop));
        }
    }

    let files = if kind == PosterSetKind::Collection {
        files
    } else {
        dedupe_latest(files)
    };

    Ok(PosterSet {
        id: upstream.id,
        title: upstream.title,
        kind,
        date_updated: parse_time(&upstream.date_updated, "set"),
        files,
    })
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// HTTP client for the poster set catalog.
pub struct HttpPosterSetProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPosterSetProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ArtworkError::Validation(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn check(&self, resp: Response, entity: &str, id: &str) -> Result<Response> {
        match resp.status() {
            s if s.is_success() => Ok(resp),
            StatusCode::NOT_FOUND => Err(ArtworkError::not_found(entity, id)),
            s if s.is_server_error() => {
                Err(ArtworkError::Transient(format!("provider returned {}", s)))
            }
            s => Err(ArtworkError::Validation(format!("provider returned {}", s))),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, entity: &str, id: &str) -> Result<T> {
        let mut req = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        let resp = self.check(resp, entity, id)?;
        let body = resp.json::<T>().await?;
        Ok(body)
    }
}

impl std::fmt::Debug for HttpPosterSetProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPosterSetProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PosterSetProvider for HttpPosterSetProvider {
    async fn fetch_sets_for_item(
        &self,
        tmdb_id: &str,
        kind: MediaItemKind,
    ) -> Result<Vec<PosterSet>> {
        let shape = match kind {
            MediaItemKind::Movie => "movie",
            MediaItemKind::Show => "show",
        };
        let envelope: SetsEnvelope = self
            .get_json(
                &format!("/api/sets/{}/{}", shape, urlencoding::encode(tmdb_id)),
                "sets",
                tmdb_id,
            )
            .await?;
        let sets = envelope
            .sets
            .into_iter()
            .map(normalize_set)
            .collect::<Result<Vec<_>>>()?;
        debug!(tmdb_id, count = sets.len(), "fetched poster sets");
        Ok(sets)
    }

    async fn fetch_set_by_id(&self, set_id: &str) -> Result<PosterSet> {
        let envelope: SetEnvelope = self
            .get_json(
                &format!("/api/set/{}", urlencoding::encode(set_id)),
                "set",
                set_id,
            )
            .await?;
        normalize_set(envelope.set)
    }

    async fn fetch_artifact_bytes(
        &self,
        asset_id: &str,
        modified: DateTime<Utc>,
        quality: AssetQuality,
    ) -> Result<(Bytes, String)> {
        let path = format!(
            "/assets/{}/{}",
            quality.as_str(),
            urlencoding::encode(asset_id)
        );
        let mut req = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(&[("modified", modified.to_rfc3339())]);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        let resp = self.check(resp, "asset", asset_id)?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = resp.bytes().await?;
        Ok((bytes, content_type))
    }
}
