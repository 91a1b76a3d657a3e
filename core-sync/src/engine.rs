//! # Reconciliation Engine
//!
//! One synchronization pass over all auto-download subscriptions.
//!
//! ## Overview
//!
//! For each subscription the engine fetches the latest poster set, selects
//! the user's artifact types, keeps only files whose modification time is
//! newer than the last successful sync, and applies them in selector order:
//! resolve the push target, fetch bytes, push, refresh. Per-file failures
//! are recovered locally; a subscription-level fetch failure skips only that
//! subscription for the pass. The subscription is re-persisted (new set,
//! advanced `last_update`) only when at least one file succeeded, so failed
//! work is retried on the next pass.
//!
//! ## Concurrency
//!
//! Passes are mutually exclusive: a run-lock makes an overlapping pass
//! return [`SyncError::PassInProgress`] instead of double-downloading.
//! Within a pass, subscriptions are processed on a bounded concurrent
//! stream; subscription keys are unique (repository primary key), so no two
//! workers ever share a key.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use core_artwork::{is_stale, AssetQuality, PosterSetProvider};
use core_gateway::MediaServerGateway;
use core_library::models::{
    MediaItem, MediaItemKind, PosterFile, PosterFileKind, RatingKey, Subscription,
    SubscriptionKey,
};
use core_library::series::has_more_seasons_or_episodes;
use core_library::LibraryIndex;

use crate::error::{Result, SyncError};
use crate::events::{EventKind, Notifier, SyncEvent};
use crate::queue::{DownloadQueue, QueueKey};
use crate::repository::SubscriptionRepository;
use crate::selector::select_files;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum subscriptions reconciled concurrently within one pass.
    pub max_concurrent_subscriptions: usize,
    /// Quality requested when fetching artifact bytes.
    pub download_quality: AssetQuality,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_subscriptions: 4,
            download_quality: AssetQuality::Optimized,
        }
    }
}

/// Counters for one completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Subscriptions where at least one file was pushed.
    pub subscriptions_synced: usize,
    /// Subscriptions with nothing stale.
    pub subscriptions_up_to_date: usize,
    /// Subscriptions skipped without mutation (no tmdb guid, empty
    /// selection, empty set).
    pub subscriptions_skipped: usize,
    /// Subscriptions where the fetch or every file failed.
    pub subscriptions_failed: usize,
    pub files_pushed: usize,
    pub files_failed: usize,
}

enum Outcome {
    Synced { pushed: usize, failed: usize },
    UpToDate,
    Skipped,
    Failed { files_failed: usize },
}

/// Resolve the entity an artifact is pushed to: the item itself for posters
/// and backdrops, the season or episode entity for the rest. A lookup miss
/// in the season/episode tree is a `NotFound`.
fn resolve_target(item: &MediaItem, file: &PosterFile) -> Result<RatingKey> {
    match file.kind {
        PosterFileKind::Poster | PosterFileKind::Backdrop => Ok(item.rating_key.clone()),
        PosterFileKind::SeasonPoster => {
            let season_ref = file.season.ok_or_else(|| {
                SyncError::Validation(format!("season poster {} has no season ref", file.id))
            })?;
            item.series
                .as_ref()
                .and_then(|s| s.season(season_ref.number))
                .map(|s| s.rating_key.clone())
                .ok_or_else(|| {
                    SyncError::not_found("season", format!("{}", season_ref.number))
                })
        }
        PosterFileKind::Titlecard => {
            let episode_ref = file.episode.as_ref().ok_or_else(|| {
                SyncError::Validation(format!("titlecard {} has no episode ref", file.id))
            })?;
            item.series
                .as_ref()
                .and_then(|s| s.episode(episode_ref.season_number, episode_ref.episode_number))
                .map(|e| e.rating_key.clone())
                .ok_or_else(|| {
                    SyncError::not_found(
                        "episode",
                        format!(
                            "S{:02}E{:02}",
                            episode_ref.season_number, episode_ref.episode_number
                        ),
                    )
                })
        }
    }
}

/// Orchestrates reconciliation passes.
pub struct ReconciliationEngine {
    config: EngineConfig,
    gateway: Arc<dyn MediaServerGateway>,
    provider: Arc<dyn PosterSetProvider>,
    repository: Arc<dyn SubscriptionRepository>,
    queue: Arc<DownloadQueue>,
    index: Arc<LibraryIndex>,
    notifier: Arc<dyn Notifier>,
    pass_lock: Mutex<()>,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    pub fn new(
        config: EngineConfig,
        gateway: Arc<dyn MediaServerGateway>,
        provider: Arc<dyn PosterSetProvider>,
        repository: Arc<dyn SubscriptionRepository>,
        queue: Arc<DownloadQueue>,
        index: Arc<LibraryIndex>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            gateway,
            provider,
            repository,
            queue,
            index,
            notifier,
            pass_lock: Mutex::new(()),
        }
    }

    /// Run one reconciliation pass over all auto-download subscriptions.
    ///
    /// Returns [`SyncError::PassInProgress`] if a pass is already running.
    pub async fn run_pass(&self) -> Result<PassStats> {
        let _guard = self
            .pass_lock
            .try_lock()
            .map_err(|_| SyncError::PassInProgress)?;

        let subscriptions = self.repository.get_auto_download().await?;
        info!(count = subscriptions.len(), "starting reconciliation pass");

        let outcomes: Vec<Outcome> = stream::iter(subscriptions)
            .map(|sub| self.sync_subscription(sub))
            .buffer_unordered(self.config.max_concurrent_subscriptions.max(1))
            .collect()
            .await;

        let mut stats = PassStats::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Synced { pushed, failed } => {
                    stats.subscriptions_synced += 1;
                    stats.files_pushed += pushed;
                    stats.files_failed += failed;
                }
                Outcome::UpToDate => stats.subscriptions_up_to_date += 1,
                Outcome::Skipped => stats.subscriptions_skipped += 1,
                Outcome::Failed { files_failed } => {
                    stats.subscriptions_failed += 1;
                    stats.files_failed += files_failed;
                }
            }
        }
        info!(
            synced = stats.subscriptions_synced,
            up_to_date = stats.subscriptions_up_to_date,
            skipped = stats.subscriptions_skipped,
            failed = stats.subscriptions_failed,
            files_pushed = stats.files_pushed,
            files_failed = stats.files_failed,
            "reconciliation pass complete"
        );
        Ok(stats)
    }

    async fn sync_subscription(&self, subscription: Subscription) -> Outcome {
        let Some(key) = subscription.key() else {
            warn!(item = %subscription.item.title, "subscription has no tmdb guid, skipping");
            return Outcome::Skipped;
        };
        if subscription.selected_types.is_empty() {
            self.record(
                &key,
                &subscription,
                EventKind::Warning,
                "no artifact types selected".to_string(),
            )
            .await;
            return Outcome::Skipped;
        }
        match self.reconcile(&key, &subscription).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(key = %key, "subscription fetch failed, will retry next pass: {}", e);
                self.record(
                    &key,
                    &subscription,
                    EventKind::Error,
                    format!("poster set fetch failed: {}", e),
                )
                .await;
                Outcome::Failed { files_failed: 0 }
            }
        }
    }

    async fn reconcile(
        &self,
        key: &SubscriptionKey,
        subscription: &Subscription,
    ) -> Result<Outcome> {
        let set = self.provider.fetch_set_by_id(&subscription.set.id).await?;
        if set.files.is_empty() {
            self.record(
                key,
                subscription,
                EventKind::Warning,
                format!("poster set {} has no files", set.id),
            )
            .await;
            return Ok(Outcome::Skipped);
        }

        // Fresh item snapshot: push targets for newly added seasons/episodes
        // only exist in the fresh tree. A failed refetch is optional
        // enrichment, the stored snapshot still works.
        let mut item = subscription.item.clone();
        if subscription.item.kind == MediaItemKind::Show {
            match self
                .gateway
                .fetch_item(&subscription.item.rating_key, &subscription.library_title)
                .await
            {
                Ok(fresh) => {
                    if has_more_seasons_or_episodes(&subscription.item, &fresh) {
                        self.record(
                            key,
                            subscription,
                            EventKind::Warning,
                            "server has new seasons or episodes not covered by the set"
                                .to_string(),
                        )
                        .await;
                    }
                    self.index
                        .update_media_item(&subscription.library_title, fresh.clone())
                        .await;
                    item = fresh;
                }
                Err(e) => {
                    warn!(key = %key, "item snapshot refresh failed: {}", e);
                }
            }
        }

        if !is_stale(&subscription.last_update, set.date_updated) {
            // Set-level timestamp is only a hint; per-file times decide.
            debug!(set = %set.id, "set timestamp unchanged, checking files individually");
        }

        let selected = select_files(&set.files, &subscription.selected_types);
        let stale: Vec<PosterFile> = selected
            .into_iter()
            .filter(|f| is_stale(&subscription.last_update, f.modified))
            .collect();
        if stale.is_empty() {
            debug!(key = %key, "subscription up to date");
            return Ok(Outcome::UpToDate);
        }

        let total = stale.len();
        let mut pushed = 0usize;
        let mut failed = 0usize;
        let mut newest: Option<DateTime<Utc>> = None;
        for file in &stale {
            match self.apply_file(&item, file).await {
                Ok(()) => {
                    pushed += 1;
                    newest = Some(newest.map_or(file.modified, |n| n.max(file.modified)));
                }
                Err(e) => {
                    // One failure never aborts the remaining files.
                    warn!(key = %key, file = %file.id, kind = file.kind.as_str(), "file failed: {}", e);
                    failed += 1;
                }
            }
        }

        if pushed > 0 {
            let mut candidate = set.date_updated;
            if let Some(newest) = newest {
                candidate = candidate.max(newest);
            }
            // last_update never regresses, whatever upstream reports.
            if let Ok(previous) = DateTime::parse_from_rfc3339(&subscription.last_update) {
                candidate = candidate.max(previous.with_timezone(&Utc));
            }

            let mut updated = subscription.clone();
            updated.set = set;
            if item.tmdb_id() == Some(key.tmdb_id.as_str()) {
                updated.item = item;
            }
            updated.last_update = candidate.to_rfc3339();

            match self.repository.upsert(&updated).await {
                Ok(()) => {
                    if failed == 0 {
                        // Warnings (e.g. a new season on the server) stay
                        // visible even after a fully successful sync.
                        if let Err(e) = self.queue.remove_resolved(&QueueKey::from(key)).await {
                            warn!(key = %key, "queue cleanup failed: {}", e);
                        }
                    }
                }
                Err(e) => {
                    // Pushed artwork stays applied; the stale last_update
                    // causes an idempotent retry next pass.
                    error!(key = %key, "failed to persist subscription: {}", e);
                    self.record(
                        key,
                        subscription,
                        EventKind::Error,
                        format!("persistence failed after {} pushed files: {}", pushed, e),
                    )
                    .await;
                }
            }
        }

        if failed > 0 {
            self.record(
                key,
                subscription,
                EventKind::Error,
                format!("{} of {} stale files failed", failed, total),
            )
            .await;
        }

        if pushed > 0 {
            Ok(Outcome::Synced { pushed, failed })
        } else {
            Ok(Outcome::Failed {
                files_failed: failed,
            })
        }
    }

    /// Apply one file: resolve the target, fetch bytes, push, refresh. The
    /// artifact is fully fetched before any push, so a fetch failure never
    /// leaves a partially applied image.
    async fn apply_file(&self, item: &MediaItem, file: &PosterFile) -> Result<()> {
        let target = resolve_target(item, file)?;
        let (bytes, content_type) = self
            .provider
            .fetch_artifact_bytes(&file.id, file.modified, self.config.download_quality)
            .await?;
        debug!(target = %target, content_type, size = bytes.len(), "fetched artifact");
        self.gateway.push_artifact(&target, bytes, file.kind).await?;
        if let Err(e) = self.gateway.refresh(&target).await {
            // Artwork is already applied; a failed refresh only delays the
            // server noticing it.
            warn!(target = %target, "metadata refresh failed: {}", e);
        }
        Ok(())
    }

    /// Record a definitive warning or error: durable queue document plus
    /// notification event. Recording must never fail the pass.
    async fn record(
        &self,
        key: &SubscriptionKey,
        subscription: &Subscription,
        kind: EventKind,
        message: String,
    ) {
        let queue_key = QueueKey::from(key);
        if let Err(e) = self.queue.enqueue(&queue_key, subscription).await {
            warn!(key = %key, "queue enqueue failed: {}", e);
            return;
        }
        let marked = match kind {
            EventKind::Warning => self.queue.mark_warning(&queue_key, message.clone()).await,
            EventKind::Error => self.queue.mark_error(&queue_key, message.clone()).await,
        };
        if let Err(e) = marked {
            warn!(key = %key, "queue status update failed: {}", e);
        }
        self.notifier
            .notify(SyncEvent {
                kind,
                title: subscription.item.title.clone(),
                message,
                image_url: None,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_library::models::{
        Episode, EpisodeRef, Guid, Season, SeasonRef, Series,
    };

    fn show() -> MediaItem {
        MediaItem {
            rating_key: RatingKey::from("10"),
            kind: MediaItemKind::Show,
            title: "Severance".to_string(),
            year: Some(2022),
            guids: vec![Guid {
                provider: "tmdb".to_string(),
                id: "95396".to_string(),
            }],
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            series: Some(Series {
                seasons: vec![Season {
                    number: 1,
                    rating_key: RatingKey::from("s1"),
                    episodes: vec![Episode {
                        number: 4,
                        rating_key: RatingKey::from("s1e4"),
                        title: "The You You Are".to_string(),
                    }],
                }],
            }),
        }
    }

    fn file(kind: PosterFileKind) -> PosterFile {
        PosterFile {
            id: "f-1".to_string(),
            kind,
            modified: DateTime::<Utc>::UNIX_EPOCH,
            season: None,
            episode: None,
        }
    }

    #[test]
    fn poster_and_backdrop_target_the_item() {
        let item = show();
        for kind in [PosterFileKind::Poster, PosterFileKind::Backdrop] {
            let target = resolve_target(&item, &file(kind)).unwrap();
            assert_eq!(target, item.rating_key);
        }
    }

    #[test]
    fn season_poster_targets_the_season_entity() {
        let item = show();
        let mut season_file = file(PosterFileKind::SeasonPoster);
        season_file.season = Some(SeasonRef { number: 1 });
        assert_eq!(
            resolve_target(&item, &season_file).unwrap(),
            RatingKey::from("s1")
        );

        season_file.season = Some(SeasonRef { number: 2 });
        assert!(matches!(
            resolve_target(&item, &season_file),
            Err(SyncError::NotFound { .. })
        ));
    }

    #[test]
    fn titlecard_targets_the_episode_entity() {
        let item = show();
        let mut card = file(PosterFileKind::Titlecard);
        card.episode = Some(EpisodeRef {
            season_number: 1,
            episode_number: 4,
            title: String::new(),
        });
        assert_eq!(resolve_target(&item, &card).unwrap(), RatingKey::from("s1e4"));

        card.episode = Some(EpisodeRef {
            season_number: 1,
            episode_number: 5,
            title: String::new(),
        });
        assert!(matches!(
            resolve_target(&item, &card),
            Err(SyncError::NotFound { .. })
        ));
    }

    #[test]
    fn malformed_file_refs_are_validation_errors() {
        let item = show();
        assert!(matches!(
            resolve_target(&item, &file(PosterFileKind::SeasonPoster)),
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            resolve_target(&item, &file(PosterFileKind::Titlecard)),
            Err(SyncError::Validation(_))
        ));
    }
}
