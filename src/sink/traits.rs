//! Sink traits and error types
//!
//! This module defines the interface shared by all sinks, the per-item write
//! result, and the `ItemWriter` seam the dispatcher writes through.

use crate::api::Item;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while writing to a sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Document {id} rejected with HTTP {status}: {body}")]
    Rejected { id: i64, status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Skipped because the {0} write failed")]
    DependencyFailed(SinkKind),

    #[error("Database connection lock poisoned")]
    Poisoned,

    #[error("{0}")]
    Other(String),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// The kinds of durable store an item can be written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    Relational,
    SearchIndex,
    Filesystem,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::SearchIndex => "search-index",
            Self::Filesystem => "filesystem",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A store that accepts one JSON document per id
///
/// Implementations must upsert: putting the same document twice leaves the
/// store as if it had been put once.
#[async_trait]
pub trait Sink: Send + Sync {
    fn kind(&self) -> SinkKind;

    async fn put(&self, id: i64, document: &Value) -> SinkResult<()>;
}

/// Writes one item to every configured sink
#[async_trait]
pub trait ItemWriter: Send + Sync + 'static {
    async fn write(&self, item: &Item) -> SinkWriteResult;
}

/// Per-sink outcomes for one item
#[derive(Debug)]
pub struct SinkWriteResult {
    item_id: i64,
    outcomes: Vec<(SinkKind, SinkResult<()>)>,
}

impl SinkWriteResult {
    pub fn new(item_id: i64) -> Self {
        Self {
            item_id,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, kind: SinkKind, result: SinkResult<()>) {
        self.outcomes.push((kind, result));
    }

    pub fn item_id(&self) -> i64 {
        self.item_id
    }

    /// An item is complete only when every configured sink acknowledged it
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, result)| result.is_ok())
    }

    pub fn outcomes(&self) -> &[(SinkKind, SinkResult<()>)] {
        &self.outcomes
    }

    pub fn failures(&self) -> impl Iterator<Item = (SinkKind, &SinkError)> {
        self.outcomes
            .iter()
            .filter_map(|(kind, result)| result.as_ref().err().map(|e| (*kind, e)))
    }

    /// One line describing every failed sink, for logs
    pub fn failure_summary(&self) -> String {
        self.failures()
            .map(|(kind, e)| format!("{}: {}", kind, e))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
