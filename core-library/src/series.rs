//! Season/episode addition detection
//!
//! Compares a previously recorded `MediaItem` snapshot with a freshly
//! fetched one to surface titles where the media server gained seasons or
//! episodes that the curated artwork set cannot cover yet. This is a
//! detection used for user-visible warnings, not an automatic remediation.

use crate::models::MediaItem;

fn counts(item: &MediaItem) -> (usize, usize) {
    item.series
        .as_ref()
        .map(|s| (s.season_count(), s.episode_count()))
        .unwrap_or((0, 0))
}

/// True iff the fresh snapshot has more seasons or more episodes than the
/// recorded one.
pub fn has_more_seasons_or_episodes(old: &MediaItem, new: &MediaItem) -> bool {
    let (old_seasons, old_episodes) = counts(old);
    let (new_seasons, new_episodes) = counts(new);
    new_seasons > old_seasons || new_episodes > old_episodes
}

/// True iff `season_number` is absent in the recorded snapshot but present
/// in the fresh one.
pub fn season_was_added(season_number: u32, old: &MediaItem, new: &MediaItem) -> bool {
    let in_old = old
        .series
        .as_ref()
        .is_some_and(|s| s.season(season_number).is_some());
    let in_new = new
        .series
        .as_ref()
        .is_some_and(|s| s.season(season_number).is_some());
    !in_old && in_new
}

/// True iff the episode is absent in the recorded snapshot but present in
/// the fresh one, scoped to one season.
pub fn episode_was_added(
    season_number: u32,
    episode_number: u32,
    old: &MediaItem,
    new: &MediaItem,
) -> bool {
    let in_old = old
        .series
        .as_ref()
        .is_some_and(|s| s.episode(season_number, episode_number).is_some());
    let in_new = new
        .series
        .as_ref()
        .is_some_and(|s| s.episode(season_number, episode_number).is_some());
    !in_old && in_new
}
