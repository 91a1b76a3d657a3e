use thiserror::Error;

use core_artwork::ArtworkError;
use core_gateway::GatewayError;

#[derive(Error, Debug)]
pub enum SyncError {
    /// A reconciliation pass is already running; passes are mutually
    /// exclusive by construction.
    #[error("A reconciliation pass is already in progress")]
    PassInProgress,

    #[error("Not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Queue I/O error: {0}")]
    QueueIo(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Artwork(#[from] ArtworkError),
}

impl SyncError {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
