//! Emby/Jellyfin adapter
//!
//! Both servers expose the same Items API for everything the gateway needs,
//! so one adapter covers the pair. Artwork uploads go through the Images
//! endpoint, which expects a base64-encoded body.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use core_library::models::{
    Episode, Guid, MediaItem, MediaItemKind, PosterFileKind, RatingKey, Season, Series,
};

use crate::error::{GatewayError, Result};
use crate::gateway::{GatewayConfig, ImageKind, ItemPage, MediaServerGateway, SectionInfo};

/// Page size for section item listings.
const ITEMS_PAGE_SIZE: u64 = 200;

/// Emby / Jellyfin gateway.
pub struct EmbyGateway {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

// ============================================================================
// Wire DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<BaseItem>,
    #[serde(default)]
    total_record_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BaseItem {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "Type", default)]
    item_type: String,
    #[serde(default)]
    collection_type: Option<String>,
    #[serde(default)]
    production_year: Option<u16>,
    #[serde(default)]
    index_number: Option<u32>,
    #[serde(default)]
    parent_index_number: Option<u32>,
    #[serde(default)]
    provider_ids: Option<HashMap<String, String>>,
    #[serde(default)]
    date_last_saved: Option<String>,
}

fn to_guids(provider_ids: Option<HashMap<String, String>>) -> Vec<Guid> {
    let mut guids: Vec<Guid> = provider_ids
        .unwrap_or_default()
        .into_iter()
        .map(|(provider, id)| Guid {
            provider: provider.to_lowercase(),
            id,
        })
        .collect();
    // HashMap iteration order is unstable; keep the guid list deterministic.
    guids.sort_by(|a, b| a.provider.cmp(&b.provider));
    guids
}

fn parse_date(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn to_media_item(item: BaseItem) -> Result<MediaItem> {
    let kind = match item.item_type.as_str() {
        "Movie" => MediaItemKind::Movie,
        "Series" => MediaItemKind::Show,
        other => {
            return Err(GatewayError::Validation(format!(
                "unexpected item type: {}",
                other
            )))
        }
    };
    Ok(MediaItem {
        rating_key: RatingKey::new(item.id),
        kind,
        title: item.name,
        year: item.production_year,
        guids: to_guids(item.provider_ids),
        updated_at: parse_date(item.date_last_saved.as_deref()),
        series: None,
    })
}

/// Image type name for an artifact kind. Everything except backdrops is the
/// entity's primary image.
fn image_type(kind: PosterFileKind) -> &'static str {
    match kind {
        PosterFileKind::Backdrop => "Backdrop",
        PosterFileKind::Poster | PosterFileKind::SeasonPoster | PosterFileKind::Titlecard => {
            "Primary"
        }
    }
}

// ============================================================================
// Gateway implementation
// ============================================================================

impl EmbyGateway {
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
            .header("X-Emby-Token", &self.token)
            .send()
            .await?;
        let resp = self.check(resp, entity, id)?;
        let body = resp.json::<T>().await?;
        Ok(body)
    }

    async fn fetch_series_tree(&self, series_id: &RatingKey) -> Result<Series> {
        let seasons_resp: ItemsResponse = self
            .get_json(
                &format!("/Shows/{}/Seasons", series_id),
                &[],
                "show",
                series_id.as_str(),
            )
            .await?;
        let mut seasons: Vec<Season> = seasons_resp
            .items
            .into_iter()
            .filter_map(|s| {
                s.index_number.map(|number| Season {
                    number,
                    rating_key: RatingKey::new(s.id),
                    episodes: Vec::new(),
                })
            })
            .collect();

        let episodes_resp: ItemsResponse = self
            .get_json(
                &format!("/Shows/{}/Episodes", series_id),
                &[],
                "show",
                series_id.as_str(),
            )
            .await?;
        for episode in episodes_resp.items {
            let (Some(season_number), Some(episode_number)) =
                (episode.parent_index_number, episode.index_number)
            else {
                continue;
            };
            if let Some(season) = seasons.iter_mut().find(|s| s.number == season_number) {
                season.episodes.push(Episode {
                    number: episode_number,
                    rating_key: RatingKey::new(episode.id),
                    title: episode.name,
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

impl std::fmt::Debug for EmbyGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbyGateway")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MediaServerGateway for EmbyGateway {
    async fn fetch_section_info(&self, name: &str) -> Result<Option<SectionInfo>> {
        let folders: ItemsResponse = self
            .get_json("/Library/MediaFolders", &[], "sections", "all")
            .await?;
        let Some(folder) = folders.items.into_iter().find(|f| f.name == name) else {
            return Ok(None);
        };
        let kind = match folder.collection_type.as_deref() {
            Some("movies") => MediaItemKind::Movie,
            Some("tvshows") => MediaItemKind::Show,
            other => {
                return Err(GatewayError::Validation(format!(
                    "unexpected collection type: {:?}",
                    other
                )))
            }
        };
        Ok(Some(SectionInfo {
            id: folder.id,
            kind,
        }))
    }

    async fn fetch_section_items(&self, section_id: &str, start_index: u64) -> Result<ItemPage> {
        let page: ItemsResponse = self
            .get_json(
                "/Items",
                &[
                    ("ParentId", section_id.to_string()),
                    ("Recursive", "true".to_string()),
                    ("IncludeItemTypes", "Movie,Series".to_string()),
                    ("Fields", "ProviderIds,DateLastSaved".to_string()),
                    ("StartIndex", start_index.to_string()),
                    ("Limit", ITEMS_PAGE_SIZE.to_string()),
                ],
                "section",
                section_id,
            )
            .await?;
        let total_count = page.total_record_count.unwrap_or(0);
        let items = page
            .items
            .into_iter()
            .map(to_media_item)
            .collect::<Result<Vec<_>>>()?;
        debug!(section = section_id, start = start_index, fetched = items.len(), total = total_count, "fetched section page");
        Ok(ItemPage { items, total_count })
    }

    async fn fetch_item(&self, rating_key: &RatingKey, _section_title: &str) -> Result<MediaItem> {
        let detail: ItemsResponse = self
            .get_json(
                "/Items",
                &[
                    ("Ids", rating_key.to_string()),
                    ("Fields", "ProviderIds,DateLastSaved".to_string()),
                ],
                "item",
                rating_key.as_str(),
            )
            .await?;
        let base = detail
            .items
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::not_found("item", rating_key.as_str()))?;
        let mut item = to_media_item(base)?;
        if item.kind == MediaItemKind::Show {
            item.series = Some(self.fetch_series_tree(rating_key).await?);
        }
        Ok(item)
    }

    async fn fetch_image(&self, rating_key: &RatingKey, kind: ImageKind) -> Result<Bytes> {
        let path = match kind {
            ImageKind::Poster => format!("/Items/{}/Images/Primary", rating_key),
            ImageKind::Backdrop => format!("/Items/{}/Images/Backdrop/0", rating_key),
        };
        let resp = self
            .client
            .get(self.url(&path))
            .header("X-Emby-Token", &self.token)
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
        let path = format!("/Items/{}/Images/{}", target, image_type(kind));
        let resp = self
            .client
            .post(self.url(&path))
            .header("X-Emby-Token", &self.token)
            .header("Content-Type", "image/jpeg")
            .body(BASE64.encode(&data))
            .send()
            .await?;
        self.check(resp, "artifact target", target.as_str())?;
        debug!(target = %target, kind = kind.as_str(), "pushed artifact");
        Ok(())
    }

    async fn refresh(&self, rating_key: &RatingKey) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/Items/{}/Refresh", rating_key)))
            .header("X-Emby-Token", &self.token)
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
    fn normalizes_base_item() {
        let body = r#"{
            "Items": [{
                "Id": "f137a2dd21bbc1b99aa5c0f6bf02a805",
                "Name": "The Matrix",
                "Type": "Movie",
                "ProductionYear": 1999,
                "ProviderIds": {"Tmdb": "603", "Imdb": "tt0133093"},
                "DateLastSaved": "2024-02-01T00:00:00.0000000Z"
            }],
            "TotalRecordCount": 1
        }"#;
        let parsed: ItemsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.total_record_count, Some(1));
        let item = to_media_item(parsed.items.into_iter().next().unwrap()).unwrap();
        assert_eq!(item.kind, MediaItemKind::Movie);
        assert_eq!(item.tmdb_id(), Some("603"));
        assert_eq!(item.year, Some(1999));
        assert_eq!(item.updated_at.to_rfc3339(), "2024-02-01T00:00:00+00:00");
    }

    #[test]
    fn provider_ids_are_lowercased_and_sorted() {
        let mut ids = HashMap::new();
        ids.insert("Tmdb".to_string(), "603".to_string());
        ids.insert("Imdb".to_string(), "tt0133093".to_string());
        let guids = to_guids(Some(ids));
        assert_eq!(guids[0].provider, "imdb");
        assert_eq!(guids[1].provider, "tmdb");
    }

    #[test]
    fn missing_date_falls_back_to_epoch() {
        assert_eq!(parse_date(None), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(parse_date(Some("garbage")), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn artifact_kinds_map_to_image_types() {
        assert_eq!(image_type(PosterFileKind::Poster), "Primary");
        assert_eq!(image_type(PosterFileKind::SeasonPoster), "Primary");
        assert_eq!(image_type(PosterFileKind::Titlecard), "Primary");
        assert_eq!(image_type(PosterFileKind::Backdrop), "Backdrop");
    }
}
