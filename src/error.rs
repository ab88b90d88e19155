use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrainerError>;

/// Every failure the pipeline can surface.
///
/// `Format` is fatal for the offending record or operation and is never retried.
/// `Network` and `Http` are transient; only the backup sink retries them.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("format error: {0}")]
    Format(String),
    #[error("network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },
    #[error("{0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("dictionary training failed: {0}")]
    Training(String),
    #[error("worker pool failure: {0}")]
    Worker(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TrainerError {
    pub fn format(msg: impl Into<String>) -> Self {
        TrainerError::Format(msg.into())
    }

    pub fn network(url: &str, source: reqwest::Error) -> Self {
        TrainerError::Network { url: url.to_string(), source }
    }

    /// Errors worth another attempt against the same endpoint.
    pub fn is_transient(&self) -> bool {
        matches!(self, TrainerError::Network { .. } | TrainerError::Http { .. })
    }
}
