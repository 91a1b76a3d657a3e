//! # Subscription Repository
//!
//! Persistence boundary for subscriptions: the link between a media item,
//! its chosen poster set, the selected artifact types and the auto-sync
//! preference. Snapshots are stored as JSON columns; the `(tmdb_id,
//! library)` pair is the primary key.

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

use core_library::models::{Subscription, SubscriptionKey};

use crate::error::{Result, SyncError};

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for subscription persistence.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Create the backing table if needed.
    async fn initialize(&self) -> Result<()>;

    /// All persisted subscriptions.
    async fn get_all(&self) -> Result<Vec<Subscription>>;

    /// Subscriptions with auto-download enabled; the reconciliation pass
    /// input.
    async fn get_auto_download(&self) -> Result<Vec<Subscription>>;

    /// One subscription by key.
    async fn get(&self, key: &SubscriptionKey) -> Result<Option<Subscription>>;

    /// Insert or replace a subscription. The stored item must carry a TMDB
    /// guid, otherwise the subscription would be unkeyable.
    async fn upsert(&self, subscription: &Subscription) -> Result<()>;

    /// Delete a subscription by key. Deleting a missing key is a no-op.
    async fn delete(&self, key: &SubscriptionKey) -> Result<()>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of `SubscriptionRepository`.
pub struct SqliteSubscriptionRepository {
    pool: SqlitePool,
}

impl SqliteSubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for SqliteSubscriptionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSubscriptionRepository").finish()
    }
}

/// Database row representation of a subscription.
#[derive(Debug, FromRow)]
struct SubscriptionRow {
    library: String,
    auto_download: i64,
    last_update: String,
    selected_types: String,
    item: String,
    poster_set: String,
}

impl SubscriptionRow {
    fn into_subscription(self) -> Result<Subscription> {
        Ok(Subscription {
            library_title: self.library,
            item: serde_json::from_str(&self.item)?,
            set: serde_json::from_str(&self.poster_set)?,
            selected_types: serde_json::from_str(&self.selected_types)?,
            auto_download: self.auto_download != 0,
            last_update: self.last_update,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT library, auto_download, last_update, selected_types, item, poster_set \
     FROM subscriptions";

#[async_trait]
impl SubscriptionRepository for SqliteSubscriptionRepository {
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS subscriptions (
                tmdb_id TEXT NOT NULL,
                library TEXT NOT NULL,
                auto_download INTEGER NOT NULL,
                last_update TEXT NOT NULL DEFAULT '',
                selected_types TEXT NOT NULL,
                item TEXT NOT NULL,
                poster_set TEXT NOT NULL,
                PRIMARY KEY (tmdb_id, library)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> =
            sqlx::query_as(&format!("{} ORDER BY library, tmdb_id", SELECT_COLUMNS))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(|r| r.into_subscription()).collect()
    }

    async fn get_auto_download(&self) -> Result<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE auto_download = 1 ORDER BY library, tmdb_id",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| r.into_subscription()).collect()
    }

    async fn get(&self, key: &SubscriptionKey) -> Result<Option<Subscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE tmdb_id = ? AND library = ?",
            SELECT_COLUMNS
        ))
        .bind(&key.tmdb_id)
        .bind(&key.library)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| r.into_subscription()).transpose()
    }

    async fn upsert(&self, subscription: &Subscription) -> Result<()> {
        let key = subscription.key().ok_or_else(|| {
            SyncError::Validation("subscription item has no tmdb guid".to_string())
        })?;
        sqlx::query(
            "INSERT INTO subscriptions
                (tmdb_id, library, auto_download, last_update, selected_types, item, poster_set)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (tmdb_id, library) DO UPDATE SET
                auto_download = excluded.auto_download,
                last_update = excluded.last_update,
                selected_types = excluded.selected_types,
                item = excluded.item,
                poster_set = excluded.poster_set",
        )
        .bind(&key.tmdb_id)
        .bind(&key.library)
        .bind(subscription.auto_download as i64)
        .bind(&subscription.last_update)
        .bind(serde_json::to_string(&subscription.selected_types)?)
        .bind(serde_json::to_string(&subscription.item)?)
        .bind(serde_json::to_string(&subscription.set)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &SubscriptionKey) -> Result<()> {
        sqlx::query("DELETE FROM subscriptions WHERE tmdb_id = ? AND library = ?")
            .bind(&key.tmdb_id)
            .bind(&key.library)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
