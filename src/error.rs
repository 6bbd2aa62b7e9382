use thiserror::Error;

/// Errors raised by the synchronizer and its clients.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    #[error("invalid configuration for {name}: {reason}")]
    InvalidConfig { name: &'static str, reason: String },

    /// Non-success response from the document API.
    #[error("notion query failed with status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("cache command {command} failed: {message}")]
    Cache { command: String, message: String },

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
