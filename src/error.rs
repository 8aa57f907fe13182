use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    // Configuration errors
    #[error("metric: '{metric}' not added or not supported")]
    UnsupportedMetric { metric: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),

    // Connection errors
    #[error("cannot reach database at {url}: {reason}")]
    Connection { url: String, reason: String },

    // Schema errors
    #[error("schema error for class {class}: {reason}")]
    Schema { class: String, reason: String },

    // Upload errors
    #[error("upload of object {identifier} rejected: {message}")]
    UploadItem { identifier: u64, message: String },

    // Transport errors (retryable)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    // Query errors
    #[error("query error: {0}")]
    Query(String),

    #[error("class {class} is not ready for queries")]
    NotReady { class: String },

    // Serialization errors
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LoaderError>;

impl LoaderError {
    /// Whether the failure happened at the transport level, meaning the
    /// request did not complete and may be retried as a whole.
    pub fn is_transient(&self) -> bool {
        match self {
            LoaderError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            LoaderError::Timeout(_) => true,
            LoaderError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn schema(class: &str, reason: impl Into<String>) -> Self {
        LoaderError::Schema {
            class: class.to_string(),
            reason: reason.into(),
        }
    }
}
