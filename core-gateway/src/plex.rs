//! Plex adapter
//!
//! Talks to the Plex Media Server HTTP API (JSON via `Accept` header) and
//! normalizes its `MediaContainer` responses into the uniform domain model.
//! Wire details are internal to this module; nothing outside the crate sees
//! a Plex shape.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use core_library::models::{
    Episode, Guid, MediaItem, MediaItemKind, PosterFileKind, RatingKey, Season, Series,
};

use crate::error::{GatewayError, Result};
use crate::gateway::{GatewayConfig, ImageKind, ItemPage, MediaServerGateway, SectionInfo};

/// Page size for section item listings.
const CONTAINER_PAGE_SIZE: u64 = 200;

/// Plex Media Server gateway.
pub struct PlexGateway {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

// ============================================================================
// Wire DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
struct ContainerResponse<T> {
    #[serde(rename = "MediaContainer")]
    media_container: T,
}

#[derive(Debug, Deserialize)]
struct SectionsContainer {
    #[serde(rename = "Directory", default)]
    directories: Vec<PlexDirectory>,
}

#[derive(Debug, Deserialize)]
struct PlexDirectory {
    key: String,
    title: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ItemsContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<PlexMetadata>,
    #[serde(rename = "totalSize", default)]
    total_size: Option<u64>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PlexMetadata {
    #[serde(rename = "ratingKey")]
    rating_key: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    year: Option<u16>,
    #[serde(rename = "updatedAt", default)]
    updated_at: Option<i64>,
    #[serde(rename = "Guid", default)]
    guids: Vec<PlexGuid>,
    /// Season or episode number for child entities.
    #[serde(default)]
    index: Option<u32>,
    /// Season number on `allLeaves` episode entries.
    #[serde(rename = "parentIndex", default)]
    parent_index: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PlexGuid {
    id: String,
}

/// Parse a Plex guid string like `tmdb://603` into `(provider, id)`.
fn parse_guid(raw: &str) -> Option<Guid> {
    let (provider, id) = raw.split_once("://")?;
    if provider.is_empty() || id.is_empty() {
        return None;
    }
    Some(Guid {
        provider: provider.to_string(),
        id: id.to_string(),
    })
}

/// Upload path for an artifact kind. Backdrops are "arts" in Plex; every
/// other artifact is a "poster" on its target entity.
fn artifact_path(kind: PosterFileKind) -> &'static str {
    match kind {
        PosterFileKind::Backdrop => "arts",
        PosterFileKind::Poster | PosterFileKind::SeasonPoster | PosterFileKind::Titlecard => {
            "posters"
        }
    }
}

fn to_media_item(meta: PlexMetadata) -> Result<MediaItem> {
    let kind = match meta.kind.as_str() {
        "movie" => MediaItemKind::Movie,
        "show" => MediaItemKind::Show,
        other => {
            return Err(GatewayError::Validation(format!(
                "unexpected item type: {}",
                other
            )))
        }
    };
    Ok(MediaItem {
        rating_key: RatingKey::new(meta.rating_key),
        kind,
        title: meta.title,
        year: meta.year,
        guids: meta.guids.iter().filter_map(|g| parse_guid(&g.id)).collect(),
        updated_at: epoch_to_datetime(meta.updated_at),
        series: None,
    })
}

fn epoch_to_datetime(secs: Option<i64>) -> DateTime<Utc> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

// ============================================================================
// Gateway implementation
// ============================================================================

impl PlexGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GatewayError::Validation(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn check(&self, resp: Response, entity: &str, id: &str) -> Result<Response> {
        match resp.status() {
            s if s.is_success() => Ok(resp),
            StatusCode::NOT_FOUND => Err(GatewayError::not_found(entity, id)),
            s if s.is_server_error() => {
                Err(GatewayError::Transient(format!("server returned {}", s)))
            }
            s => Err(GatewayError::Validation(format!("server returned {}", s))),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        entity: &str,
        id: &str,
    ) -> Result<T> {
        let resp = self
            .client
            .get(self.url(path))
            .query(query)
            .header("X-Plex-Token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await?;
        let resp = self.check(resp, entity, id)?;
        let body = resp.json::<T>().await?;
        Ok(body)
    }

    /// Fetch the season/episode tree of a show: `/children` for seasons,
    /// `/allLeaves` for every episode with its parent season number.
    async fn fetch_series_tree(&self, rating_key: &RatingKey) -> Result<Series> {
        let children: ContainerResponse<ItemsContainer> = self
            .get_json(
                &format!("/library/metadata/{}/children", rating_key),
                &[],
                "show",
                rating_key.as_str(),
            )
            .await?;
        let mut seasons: Vec<Season> = children
            .media_container
            .metadata
            .into_iter()
            .filter(|m| m.kind == "season")
            .filter_map(|m| {
                m.index.map(|number| Season {
                    number,
                    rating_key: RatingKey::new(m.rating_key),
                    episodes: Vec::new(),
                })
            })
            .collect();

        let leaves: ContainerResponse<ItemsContainer> = self
            .get_json(
                &format!("/library/metadata/{}/allLeaves", rating_key),
                &[],
                "show",
                rating_key.as_str(),
            )
            .await?;
        for leaf in leaves.media_container.metadata {
            let (Some(season_number), Some(episode_number)) = (leaf.parent_index, leaf.index)
            else {
                continue;
            };
            if let Some(season) = seasons.iter_mut().find(|s| s.number == season_number) {
                season.episodes.push(Episode {
                    number: episode_number,
                    rating_key: RatingKey::new(leaf.rating_key),
                    title: leaf.title,
                });
            }
        }
        seasons.sort_by_key(|s| s.number);
        for season in &mut seasons {
            season.episodes.sort_by_key(|e| e.number);
        }
        Ok(Series { seasons })
    }
}

impl std::fmt::Debug for PlexGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlexGateway")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MediaServerGateway for PlexGateway {
    async fn fetch_section_info(&self, name: &str) -> Result<Option<SectionInfo>> {
        let sections: ContainerResponse<SectionsContainer> = self
            .get_json("/library/sections", &[], "sections", "all")
            .await?;
        let Some(dir) = sections
            .media_container
            .directories
            .into_iter()
            .find(|d| d.title == name)
        else {
            return Ok(None);
        };
        let kind = match dir.kind.as_str() {
            "movie" => MediaItemKind::Movie,
            "show" => MediaItemKind::Show,
            other => {
                return Err(GatewayError::Validation(format!(
                    "unexpected section type: {}",
                    other
                )))
            }
        };
        Ok(Some(SectionInfo { id: dir.key, kind }))
    }

    async fn fetch_section_items(&self, section_id: &str, start_index: u64) -> Result<ItemPage> {
        let page: ContainerResponse<ItemsContainer> = self
            .get_json(
                &format!("/library/sections/{}/all", section_id),
                &[
                    ("includeGuids", "1".to_string()),
                    ("X-Plex-Container-Start", start_index.to_string()),
                    ("X-Plex-Container-Size", CONTAINER_PAGE_SIZE.to_string()),
                ],
                "section",
                section_id,
            )
            .await?;
        let container = page.media_container;
        let total_count = container.total_size.or(container.size).unwrap_or(0);
        let items = container
            .metadata
            .into_iter()
            .map(to_media_item)
            .collect::<Result<Vec<_>>>()?;
        debug!(section = section_id, start = start_index, fetched = items.len(), total = total_count, "fetched section page");
        Ok(ItemPage { items, total_count })
    }

    async fn fetch_item(&self, rating_key: &RatingKey, _section_title: &str) -> Result<MediaItem> {
        let detail: ContainerResponse<ItemsContainer> = self
            .get_json(
                &format!("/library/metadata/{}", rating_key),
                &[("includeGuids", "1".to_string())],
                "item",
                rating_key.as_str(),
            )
            .await?;
        let meta = detail
            .media_container
            .metadata
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::not_found("item", rating_key.as_str()))?;
        let mut item = to_media_item(meta)?;
        if item.kind == MediaItemKind::Show {
            item.series = Some(self.fetch_series_tree(rating_key).await?);
        }
        Ok(item)
    }

    async fn fetch_image(&self, rating_key: &RatingKey, kind: ImageKind) -> Result<Bytes> {
        let path = match kind {
            ImageKind::Poster => format!("/library/metadata/{}/thumb", rating_key),
            ImageKind::Backdrop => format!("/library/metadata/{}/art", rating_key),
        };
        let resp = self
            .client
            .get(self.url(&path))
            .header("X-Plex-Token", &self.token)
            .send()
            .await?;
        let resp = self.check(resp, "image", rating_key.as_str())?;
        Ok(resp.bytes().await?)
    }

    async fn push_artifact(
        &self,
        target: &RatingKey,
        data: Bytes,
        kind: PosterFileKind,
    ) -> Result<()> {
        let path = format!("/library/metadata/{}/{}", target, artifact_path(kind));
        let resp = self
            .client
            .post(self.url(&path))
            .header("X-Plex-Token", &self.token)
            .body(data)
            .send()
            .await?;
        self.check(resp, "artifact target", target.as_str())?;
        debug!(target = %target, kind = kind.as_str(), "pushed artifact");
        Ok(())
    }

    async fn refresh(&self, rating_key: &RatingKey) -> Result<()> {
        let resp = self
            .client
            .put(self.url(&format!("/library/metadata/{}/refresh", rating_key)))
            .header("X-Plex-Token", &self.token)
            .send()
            .await?;
        self.check(resp, "item", rating_key.as_str())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_guid_strings() {
        let guid = parse_guid("tmdb://603").unwrap();
        assert_eq!(guid.provider, "tmdb");
        assert_eq!(guid.id, "603");
        assert!(parse_guid("plex://movie/abc").is_some());
        assert!(parse_guid("no-scheme").is_none());
        assert!(parse_guid("tmdb://").is_none());
    }

    #[test]
    fn backdrops_upload_as_arts() {
        assert_eq!(artifact_path(PosterFileKind::Backdrop), "arts");
        assert_eq!(artifact_path(PosterFileKind::Poster), "posters");
        assert_eq!(artifact_path(PosterFileKind::SeasonPoster), "posters");
        assert_eq!(artifact_path(PosterFileKind::Titlecard), "posters");
    }

    #[test]
    fn deserializes_section_listing() {
        let body = r#"{
            "MediaContainer": {
                "Directory": [
                    {"key": "1", "title": "Movies", "type": "movie"},
                    {"key": "2", "title": "TV Shows", "type": "show"}
                ]
            }
        }"#;
        let parsed: ContainerResponse<SectionsContainer> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.media_container.directories.len(), 2);
        assert_eq!(parsed.media_container.directories[1].kind, "show");
    }

    #[test]
    fn normalizes_metadata_into_media_item() {
        let body = r#"{
            "MediaContainer": {
                "totalSize": 1,
                "Metadata": [{
                    "ratingKey": "49915",
                    "title": "The Matrix",
                    "type": "movie",
                    "year": 1999,
                    "updatedAt": 1706745600,
                    "Guid": [
                        {"id": "imdb://tt0133093"},
                        {"id": "tmdb://603"}
                    ]
                }]
            }
        }"#;
        let parsed: ContainerResponse<ItemsContainer> = serde_json::from_str(body).unwrap();
        let item = to_media_item(parsed.media_container.metadata.into_iter().next().unwrap())
            .unwrap();
        assert_eq!(item.rating_key.as_str(), "49915");
        assert_eq!(item.kind, MediaItemKind::Movie);
        assert_eq!(item.year, Some(1999));
        assert_eq!(item.tmdb_id(), Some("603"));
        assert_eq!(item.updated_at.to_rfc3339(), "2024-02-01T00:00:00+00:00");
    }

    #[test]
    fn unknown_item_type_is_a_validation_error() {
        let meta = PlexMetadata {
            rating_key: "1".to_string(),
            title: "Some Photo".to_string(),
            kind: "photo".to_string(),
            year: None,
            updated_at: None,
            guids: Vec::new(),
            index: None,
            parent_index: None,
        };
        assert!(matches!(
            to_media_item(meta),
            Err(GatewayError::Validation(_))
        ));
    }
}
