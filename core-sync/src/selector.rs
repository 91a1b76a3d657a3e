//! File selection and ordering
//!
//! Pure, deterministic filter over a set's files. The output order is a
//! contract consumed by progress-reporting UIs: it must be identical for
//! any permutation of the input and any subset of selected types.

use core_library::models::{PosterFile, SelectedTypes};

/// Total-order sort key: kind rank, then season number, then
/// (season, episode), then file id.
fn sort_key(file: &PosterFile) -> (u8, u32, u32, u32, &str) {
    let season = file.season.map(|s| s.number).unwrap_or(0);
    let (episode_season, episode_number) = file
        .episode
        .as_ref()
        .map(|e| (e.season_number, e.episode_number))
        .unwrap_or((0, 0));
    (
        file.kind.rank(),
        season,
        episode_season,
        episode_number,
        file.id.as_str(),
    )
}

/// Drop files whose kind is not selected, then order deterministically:
/// posters, backdrops, season posters by season, title cards by
/// (season, episode), ties broken by file id.
pub fn select_files(files: &[PosterFile], selected: &SelectedTypes) -> Vec<PosterFile> {
    let mut result: Vec<PosterFile> = files
        .iter()
        .filter(|f| selected.contains(f.kind))
        .cloned()
        .collect();
    // The key is a total order, so an unstable sort is deterministic too.
    result.sort_unstable_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    result
}
