//! Error taxonomy for the crawler.
//!
//! Errors are split by how far they are allowed to travel:
//!
//! - [`FetchError`]: a single page request or interaction failed. Contained at
//!   the article (or listing seed) boundary and never aborts a run.
//! - [`SinkError`]: a persistence operation failed. Per-record failures are
//!   contained; failing to open the sink is fatal.
//! - [`ConfigError`]: adapter or CLI configuration is unusable. Fatal.
//! - [`PipelineError`]: the only error [`crate::pipeline::IngestionPipeline::run`]
//!   surfaces to its caller. It always wraps the originating cause.

use std::time::Duration;
use thiserror::Error;

/// A page fetch or render interaction failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("render backend error: {0}")]
    Backend(String),
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    ///
    /// Client errors (4xx other than 408/429) and missing elements are final;
    /// everything network- or render-shaped is worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Http(_) | FetchError::Backend(_) => true,
            FetchError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            FetchError::ElementNotFound(_) => false,
        }
    }
}

/// A persistence operation failed.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration could not be loaded or validated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown site adapter '{0}'")]
    UnknownSite(String),

    #[error("adapter '{site}': invalid selector '{selector}': {reason}")]
    InvalidSelector {
        site: String,
        selector: String,
        reason: String,
    },

    #[error("adapter '{site}': invalid URL '{url}': {source}")]
    InvalidUrl {
        site: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("no listing seeds given and adapter '{0}' defines none")]
    NoSeeds(String),

    #[error("invalid setting: {0}")]
    Invalid(String),

    #[error("failed to read adapter file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse adapter file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Infrastructure-level failure that aborts a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("rendering backend unavailable: {0}")]
    Backend(#[source] FetchError),

    #[error("persistence unavailable: {0}")]
    Sink(#[source] SinkError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
