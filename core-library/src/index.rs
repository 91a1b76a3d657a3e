//! # Library Index
//!
//! Concurrent in-memory cache of the media server's library, used to answer
//! lookups without re-querying the server.
//!
//! ## Overview
//!
//! The index holds whole `LibrarySection`s keyed by section title. Gateway
//! fetches write into it; everything else reads from it. It is an explicitly
//! constructed instance injected into its consumers, with a process-scoped
//! lifetime owned by whoever built it.
//!
//! ## Concurrency
//!
//! One read/write lock per instance: many concurrent readers, one writer.
//! Network I/O never happens under the lock; callers fetch first and only
//! take the lock for the in-memory merge. Mutations are O(section size),
//! which is bounded by the library catalog, not by unbounded growth.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{LibrarySection, MediaItem};

/// Concurrent cache of library sections and their media items.
#[derive(Debug, Default)]
pub struct LibraryIndex {
    sections: RwLock<HashMap<String, LibrarySection>>,
}

impl LibraryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a whole section.
    ///
    /// If the section already exists, items are merged by rating key: an item
    /// present in both replaces the existing one in its slot (foreign
    /// iteration over the section sees a stable order), items only in the new
    /// section are appended. `total_size` is recomputed after the merge.
    pub async fn update(&self, section: LibrarySection) {
        let mut sections = self.sections.write().await;
        match sections.get_mut(&section.title) {
            Some(existing) => {
                for item in section.items {
                    match existing
                        .items
                        .iter_mut()
                        .find(|i| i.rating_key == item.rating_key)
                    {
                        Some(slot) => *slot = item,
                        None => existing.items.push(item),
                    }
                }
                existing.kind = section.kind;
                existing.total_size = existing.items.len();
                debug!(
                    section = %existing.title,
                    total = existing.total_size,
                    "merged library section"
                );
            }
            None => {
                let mut section = section;
                section.total_size = section.items.len();
                debug!(section = %section.title, total = section.total_size, "inserted library section");
                sections.insert(section.title.clone(), section);
            }
        }
    }

    /// Upsert a single item within one section by rating key; appends when
    /// the item is not present. A miss on the section title is a no-op.
    pub async fn update_media_item(&self, section_title: &str, item: MediaItem) {
        let mut sections = self.sections.write().await;
        let Some(section) = sections.get_mut(section_title) else {
            debug!(section = section_title, "update_media_item: unknown section");
            return;
        };
        match section
            .items
            .iter_mut()
            .find(|i| i.rating_key == item.rating_key)
        {
            Some(slot) => *slot = item,
            None => section.items.push(item),
        }
        section.total_size = section.items.len();
    }

    pub async fn get(&self, title: &str) -> Option<LibrarySection> {
        self.sections.read().await.get(title).cloned()
    }

    /// All sections, sorted ascending by title (stable).
    pub async fn get_all_sorted(&self) -> Vec<LibrarySection> {
        let sections = self.sections.read().await;
        let mut all: Vec<LibrarySection> = sections.values().cloned().collect();
        all.sort_by(|a, b| a.title.cmp(&b.title));
        all
    }

    pub async fn remove(&self, title: &str) {
        self.sections.write().await.remove(title);
    }

    pub async fn clear(&self) {
        self.sections.write().await.clear();
    }

    pub async fn is_empty(&self) -> bool {
        self.sections.read().await.is_empty()
    }

    /// Look up an item in one section by its TMDB guid.
    ///
    /// Duplicate library data can attach the same TMDB id to several items;
    /// the one with the greatest `updated_at` wins.
    pub async fn get_media_item_by_tmdb_id(
        &self,
        section_title: &str,
        tmdb_id: &str,
    ) -> Option<MediaItem> {
        let sections = self.sections.read().await;
        let section = sections.get(section_title)?;
        section
            .items
            .iter()
            .filter(|i| i.tmdb_id() == Some(tmdb_id))
            .max_by_key(|i| i.updated_at)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Guid, MediaItemKind, RatingKey};
    use chrono::{TimeZone, Utc};

    fn movie(key: &str, title: &str) -> MediaItem {
        MediaItem {
            rating_key: RatingKey::from(key),
            kind: MediaItemKind::Movie,
            title: title.to_string(),
            year: None,
            guids: Vec::new(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            series: None,
        }
    }

    fn movies_section(title: &str, items: Vec<MediaItem>) -> LibrarySection {
        LibrarySection::new(title, MediaItemKind::Movie, items)
    }

    #[tokio::test]
    async fn update_inserts_and_merges() {
        let index = LibraryIndex::new();
        index
            .update(movies_section("Movies", vec![movie("1", "A"), movie("2", "B")]))
            .await;

        // Same rating key replaces in place, new key appends.
        index
            .update(movies_section("Movies", vec![movie("2", "B2"), movie("3", "C")]))
            .await;

        let section = index.get("Movies").await.unwrap();
        assert_eq!(section.total_size, 3);
        assert_eq!(section.items.len(), 3);
        // Replaced item keeps its slot.
        assert_eq!(section.items[1].title, "B2");
        assert_eq!(section.items[2].title, "C");
    }

    #[tokio::test]
    async fn no_duplicate_rating_keys_after_interleaved_updates() {
        let index = LibraryIndex::new();
        index.update(movies_section("Movies", vec![movie("1", "A")])).await;
        index.update_media_item("Movies", movie("2", "B")).await;
        index.update_media_item("Movies", movie("1", "A2")).await;
        index
            .update(movies_section("Movies", vec![movie("2", "B2"), movie("3", "C")]))
            .await;

        let section = index.get("Movies").await.unwrap();
        assert_eq!(section.total_size, 3);
        let mut keys: Vec<&str> = section.items.iter().map(|i| i.rating_key.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 3);
    }

    #[tokio::test]
    async fn get_all_sorted_orders_by_title() {
        let index = LibraryIndex::new();
        index.update(movies_section("TV Shows", Vec::new())).await;
        index.update(movies_section("Anime", Vec::new())).await;
        index.update(movies_section("Movies", Vec::new())).await;

        let titles: Vec<String> = index
            .get_all_sorted()
            .await
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["Anime", "Movies", "TV Shows"]);
    }

    #[tokio::test]
    async fn remove_clear_is_empty() {
        let index = LibraryIndex::new();
        assert!(index.is_empty().await);
        index.update(movies_section("Movies", Vec::new())).await;
        assert!(!index.is_empty().await);
        index.remove("Movies").await;
        assert!(index.is_empty().await);
        index.update(movies_section("Movies", Vec::new())).await;
        index.clear().await;
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn tmdb_lookup_newest_wins() {
        let tmdb = |key: &str, ts: u32| {
            let mut m = movie(key, "Dup");
            m.guids = vec![Guid {
                provider: "tmdb".to_string(),
                id: "603".to_string(),
            }];
            m.updated_at = Utc.with_ymd_and_hms(2024, 1, ts, 0, 0, 0).unwrap();
            m
        };
        let index = LibraryIndex::new();
        index
            .update(movies_section("Movies", vec![tmdb("1", 5), tmdb("2", 9), tmdb("3", 7)]))
            .await;

        let found = index.get_media_item_by_tmdb_id("Movies", "603").await.unwrap();
        assert_eq!(found.rating_key.as_str(), "2");
        assert!(index.get_media_item_by_tmdb_id("Movies", "9999").await.is_none());
        assert!(index.get_media_item_by_tmdb_id("Other", "603").await.is_none());
    }
}
