//! Search index sink
//!
//! Documents are stored with `PUT {endpoint}/{index}/{type}/{id}`, which the
//! index treats as an overwrite for an existing id.

use crate::config::SearchSinkConfig;
use crate::sink::traits::{Sink, SinkError, SinkKind, SinkResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

pub struct SearchIndexSink {
    client: Client,
    endpoint: String,
    index: String,
    doc_type: String,
}

impl SearchIndexSink {
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        index: impl Into<String>,
        doc_type: impl Into<String>,
    ) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index: index.into(),
            doc_type: doc_type.into(),
        }
    }

    pub fn from_config(config: &SearchSinkConfig, client: Client) -> Self {
        Self::new(client, &config.endpoint, &config.index, &config.doc_type)
    }

    pub fn document_url(&self, id: i64) -> String {
        format!("{}/{}/{}/{}", self.endpoint, self.index, self.doc_type, id)
    }
}

#[async_trait]
impl Sink for SearchIndexSink {
    fn kind(&self) -> SinkKind {
        SinkKind::SearchIndex
    }

    async fn put(&self, id: i64, document: &Value) -> SinkResult<()> {
        let response = self
            .client
            .put(self.document_url(id))
            .json(document)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                id,
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        tracing::debug!("Indexed anime {} at {}", id, self.document_url(id));
        Ok(())
    }
}
