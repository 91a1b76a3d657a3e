use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    /// Network-level failure (timeout, connect, transfer). Retryable on the
    /// next pass; the gateway itself never retries.
    #[error("Transient I/O error: {0}")]
    Transient(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl GatewayError {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Validation(format!("malformed response: {}", e))
        } else {
            Self::Transient(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
