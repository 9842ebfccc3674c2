use std::time::Duration;

use thiserror::Error;

/// Failures that stop a category (or, for sink and setup errors, the run).
///
/// Degraded-but-usable conditions (no themes found, page never became ready,
/// no next-page control) are not errors; they surface as statuses instead.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("render session error: {0:#}")]
    Render(#[from] anyhow::Error),

    #[error("category '{theme}' timed out after {elapsed:?}")]
    Timeout { theme: String, elapsed: Duration },

    #[error("category '{0}' cancelled")]
    Cancelled(String),

    #[error("worker for category '{0}' panicked")]
    WorkerPanicked(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl CollectError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CollectError>;
