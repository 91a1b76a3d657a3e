//! # Download Queue
//!
//! Durable, file-backed record of deferred and failed synchronization
//! tasks, used for observability and crash recovery.
//!
//! ## Overview
//!
//! Each task is one JSON document in the queue directory: a subscription
//! snapshot plus an explicit `status` field (`pending`/`error`/`warning`).
//! Presence of the document is itself the "task exists" signal; no
//! in-memory queue state survives a restart. Writes go through a temp file
//! and an atomic rename so a crash never leaves a half-written document.
//!
//! Concurrent writers racing on the same key are accepted: the document
//! content is idempotent, so last write wins is safe.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use core_library::models::{Subscription, SubscriptionKey};

use crate::error::{Result, SyncError};

/// Lifecycle state recorded inside each queue document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Error,
    Warning,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "error" => Ok(Self::Error),
            "warning" => Ok(Self::Warning),
            _ => Err(SyncError::Validation(format!("unknown queue status: {}", s))),
        }
    }
}

/// Document key: library plus cross-catalog id, with an optional sequence
/// for batches that need more than one document per subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueKey {
    pub library: String,
    pub tmdb_id: String,
    #[serde(default)]
    pub sequence: Option<u32>,
}

impl QueueKey {
    pub fn new(library: impl Into<String>, tmdb_id: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            tmdb_id: tmdb_id.into(),
            sequence: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// True when `other` addresses the same subscription, ignoring the
    /// sequence component.
    pub fn same_subscription(&self, other: &QueueKey) -> bool {
        self.library == other.library && self.tmdb_id == other.tmdb_id
    }

    fn file_name(&self) -> String {
        let stem = format!(
            "{}__{}__{}",
            sanitize(&self.library),
            sanitize(&self.tmdb_id),
            key_digest(&self.library, &self.tmdb_id)
        );
        match self.sequence {
            Some(seq) => format!("{}__{}.json", stem, seq),
            None => format!("{}.json", stem),
        }
    }
}

impl From<&SubscriptionKey> for QueueKey {
    fn from(key: &SubscriptionKey) -> Self {
        Self::new(key.library.clone(), key.tmdb_id.clone())
    }
}

/// Keep filenames portable; the authoritative key lives inside the document.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Short digest of the unsanitized key. Sanitization is lossy (`"A B"` and
/// `"A_B"` both sanitize to `A_B`); the digest keeps distinct keys on
/// distinct paths.
fn key_digest(library: &str, tmdb_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(library.as_bytes());
    hasher.update([0x1f]);
    hasher.update(tmdb_id.as_bytes());
    hasher
        .finalize()
        .iter()
        .take(4)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// One durable queue document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDocument {
    pub key: QueueKey,
    pub status: QueueStatus,
    #[serde(default)]
    pub detail: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub subscription: Subscription,
}

/// Durable, file-backed work queue.
#[derive(Debug)]
pub struct DownloadQueue {
    dir: PathBuf,
}

impl DownloadQueue {
    /// Open (and create if missing) a queue rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &QueueKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    async fn write_document(&self, doc: &QueueDocument) -> Result<()> {
        let path = self.path_for(&doc.key);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(doc)?;
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read_document(path: &Path) -> Result<QueueDocument> {
        let body = fs::read(path).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Write a pending document for the key. Idempotent: if a document for
    /// the key already exists the call is a no-op that logs a coalescing
    /// warning; no duplicate task is created.
    pub async fn enqueue(&self, key: &QueueKey, subscription: &Subscription) -> Result<()> {
        let path = self.path_for(key);
        if fs::try_exists(&path).await? {
            warn!(key = %path.display(), "queue document already exists, coalescing");
            return Ok(());
        }
        let doc = QueueDocument {
            key: key.clone(),
            status: QueueStatus::Pending,
            detail: None,
            enqueued_at: Utc::now(),
            subscription: subscription.clone(),
        };
        self.write_document(&doc).await?;
        debug!(library = %key.library, tmdb_id = %key.tmdb_id, "enqueued download task");
        Ok(())
    }

    async fn list_by_status(&self, status: QueueStatus) -> Result<Vec<QueueDocument>> {
        let mut docs = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_document(&path).await {
                Ok(doc) if doc.status == status => docs.push(doc),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), "skipping unreadable queue document: {}", e),
            }
        }
        // Directory order is platform-dependent.
        docs.sort_by(|a, b| {
            (&a.key.library, &a.key.tmdb_id, a.key.sequence)
                .cmp(&(&b.key.library, &b.key.tmdb_id, b.key.sequence))
        });
        Ok(docs)
    }

    pub async fn list_pending(&self) -> Result<Vec<QueueDocument>> {
        self.list_by_status(QueueStatus::Pending).await
    }

    pub async fn list_errors(&self) -> Result<Vec<QueueDocument>> {
        self.list_by_status(QueueStatus::Error).await
    }

    pub async fn list_warnings(&self) -> Result<Vec<QueueDocument>> {
        self.list_by_status(QueueStatus::Warning).await
    }

    async fn mark(&self, key: &QueueKey, status: QueueStatus, detail: String) -> Result<()> {
        let path = self.path_for(key);
        if !fs::try_exists(&path).await? {
            return Err(SyncError::not_found("queue document", key.file_name()));
        }
        let mut doc = Self::read_document(&path).await?;
        doc.status = status;
        doc.detail = Some(detail);
        self.write_document(&doc).await
    }

    /// Flip an existing document to `error` with the given detail.
    pub async fn mark_error(&self, key: &QueueKey, detail: impl Into<String>) -> Result<()> {
        self.mark(key, QueueStatus::Error, detail.into()).await
    }

    /// Flip an existing document to `warning` with the given detail.
    pub async fn mark_warning(&self, key: &QueueKey, detail: impl Into<String>) -> Result<()> {
        self.mark(key, QueueStatus::Warning, detail.into()).await
    }

    /// Delete the key's pending and error documents, independent of
    /// sequence. Warnings stay: a successful sync resolves failed work, not
    /// conditions that still need the user's attention.
    pub async fn remove_resolved(&self, key: &QueueKey) -> Result<()> {
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_document(&path).await {
                Ok(doc)
                    if doc.key.same_subscription(key)
                        && doc.status != QueueStatus::Warning =>
                {
                    fs::remove_file(&path).await?;
                    debug!(path = %path.display(), "removed resolved queue document");
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), "skipping unreadable queue document: {}", e),
            }
        }
        Ok(())
    }

    /// Delete every document for the key's subscription, independent of
    /// sequence and status.
    pub async fn remove(&self, key: &QueueKey) -> Result<()> {
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_document(&path).await {
                Ok(doc) if doc.key.same_subscription(key) => {
                    fs::remove_file(&path).await?;
                    debug!(path = %path.display(), "removed queue document");
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), "skipping unreadable queue document: {}", e),
            }
        }
        Ok(())
    }
}
