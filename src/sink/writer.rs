//! Fan-out of one item to every configured sink
//!
//! The relational write and the search-index write form a chain when a merge
//! view is configured: the merged document is read back only after the upsert
//! is acknowledged, and is what the index receives. The filesystem write runs
//! alongside that chain.

use crate::api::Item;
use crate::config::SinksConfig;
use crate::sink::filesystem::FilesystemSink;
use crate::sink::search::SearchIndexSink;
use crate::sink::sqlite::SqliteSink;
use crate::sink::traits::{ItemWriter, Sink, SinkError, SinkKind, SinkResult, SinkWriteResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;

/// Writes items to the relational store, search index and filesystem
#[derive(Default)]
pub struct SinkWriter {
    relational: Option<Arc<SqliteSink>>,
    search: Option<Box<dyn Sink>>,
    filesystem: Option<Box<dyn Sink>>,
}

impl SinkWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the sinks named in the configuration
    pub fn from_config(config: &SinksConfig, client: &Client) -> SinkResult<Self> {
        let mut writer = Self::new();

        if let Some(sqlite) = &config.sqlite {
            writer = writer.with_relational(Arc::new(SqliteSink::from_config(sqlite)?));
        }
        if let Some(search) = &config.search {
            writer = writer.with_search_index(SearchIndexSink::from_config(search, client.clone()));
        }
        if let Some(fs) = &config.filesystem {
            writer = writer.with_filesystem(FilesystemSink::from_config(fs)?);
        }

        Ok(writer)
    }

    pub fn with_relational(mut self, sink: Arc<SqliteSink>) -> Self {
        self.relational = Some(sink);
        self
    }

    pub fn with_search_index(mut self, sink: impl Sink + 'static) -> Self {
        self.search = Some(Box::new(sink));
        self
    }

    pub fn with_filesystem(mut self, sink: impl Sink + 'static) -> Self {
        self.filesystem = Some(Box::new(sink));
        self
    }

    /// The relational sink, which also holds the run ledger
    pub fn relational(&self) -> Option<&Arc<SqliteSink>> {
        self.relational.as_ref()
    }

    /// Kinds of the configured sinks, in write order
    pub fn kinds(&self) -> Vec<SinkKind> {
        let mut kinds = Vec::new();
        if self.relational.is_some() {
            kinds.push(SinkKind::Relational);
        }
        if let Some(search) = &self.search {
            kinds.push(search.kind());
        }
        if let Some(fs) = &self.filesystem {
            kinds.push(fs.kind());
        }
        kinds
    }

    /// Upserts into the relational store, returning the merged document if any
    fn write_relational(db: &SqliteSink, item: &Item) -> SinkResult<Option<Value>> {
        db.upsert(item.id(), item.payload())?;
        let merged = db.read_merged(item.id())?;
        if merged.is_none() && db.has_merge_view() {
            tracing::debug!("No merged row for anime {}, indexing raw record", item.id());
        }
        Ok(merged)
    }

    async fn write_chain(&self, item: &Item) -> Vec<(SinkKind, SinkResult<()>)> {
        let mut outcomes = Vec::with_capacity(2);
        let mut document = Cow::Borrowed(item.payload());
        let mut search_blocked = false;

        if let Some(db) = &self.relational {
            match Self::write_relational(db, item) {
                Ok(merged) => {
                    if let Some(merged) = merged {
                        document = Cow::Owned(merged);
                    }
                    outcomes.push((SinkKind::Relational, Ok(())));
                }
                Err(e) => {
                    search_blocked = db.has_merge_view();
                    outcomes.push((SinkKind::Relational, Err(e)));
                }
            }
        }

        if let Some(search) = &self.search {
            let result = if search_blocked {
                Err(SinkError::DependencyFailed(SinkKind::Relational))
            } else {
                search.put(item.id(), &document).await
            };
            outcomes.push((search.kind(), result));
        }

        outcomes
    }

    async fn write_filesystem(&self, item: &Item) -> Option<(SinkKind, SinkResult<()>)> {
        match &self.filesystem {
            Some(fs) => Some((fs.kind(), fs.put(item.id(), item.payload()).await)),
            None => None,
        }
    }
}

#[async_trait]
impl ItemWriter for SinkWriter {
    async fn write(&self, item: &Item) -> SinkWriteResult {
        let (chain, fs) = tokio::join!(self.write_chain(item), self.write_filesystem(item));

        let mut result = SinkWriteResult::new(item.id());
        for (kind, outcome) in chain.into_iter().chain(fs) {
            result.record(kind, outcome);
        }
        result
    }
}
