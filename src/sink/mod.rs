//! Sink module for persisting media records
//!
//! This module handles every durable store an item is written to:
//! - SQLite relational store with upsert-by-id and an optional merge view
//! - Search index documents via HTTP `PUT`
//! - One JSON file per item on the filesystem
//! - The run ledger kept alongside the relational store
//!
//! All sinks are idempotent upserts, so re-running a range is always a safe repair.

mod filesystem;
mod schema;
mod search;
mod sqlite;
mod traits;
mod writer;

pub use filesystem::FilesystemSink;
pub use schema::initialize_schema;
pub use search::SearchIndexSink;
pub use sqlite::{RunRecord, SqliteSink};
pub use traits::{ItemWriter, Sink, SinkError, SinkKind, SinkResult, SinkWriteResult};
pub use writer::SinkWriter;
