//! AniList crawler: a polite media harvester
//!
//! This crate walks the paginated media listing of a GraphQL API and writes every
//! record it discovers to one or more idempotent sinks (SQLite, a search index,
//! and the filesystem), using a bounded pool of workers fed on demand by the
//! page frontier.

pub mod api;
pub mod config;
pub mod crawler;
pub mod output;
pub mod sink;
pub mod state;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] api::AuthError),

    #[error("Request rejected by the API (HTTP {status})")]
    ClientError { status: u16 },

    #[error("Request failed after {attempts} attempts, last outcome: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Malformed API response: {0}")]
    MalformedResponse(String),

    #[error("Item {0} not found")]
    ItemNotFound(i64),

    #[error("Sink error: {0}")]
    Sink(#[from] sink::SinkError),

    #[error("Invalid page range '{0}', expected START, START- or START-END")]
    InvalidRange(String),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::WorkerState,
        to: state::WorkerState,
    },

    #[error("Worker pool stopped before the frontier was exhausted")]
    PoolStopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use api::{FetchOutcome, Fetcher, Item, PageCursor};
pub use config::Config;
pub use crawler::{run_crawl, Controller, RunMode, RunReport, RunSpec, RunStatus};
pub use sink::{SinkWriteResult, SinkWriter};
pub use state::WorkerState;
