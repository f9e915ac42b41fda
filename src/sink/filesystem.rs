//! Filesystem sink: one pretty-printed `{id}.json` per item

use crate::config::FilesystemSinkConfig;
use crate::sink::traits::{Sink, SinkKind, SinkResult};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub struct FilesystemSink {
    dir: PathBuf,
}

impl FilesystemSink {
    /// Creates the sink, creating `dir` if needed
    pub fn new(dir: impl Into<PathBuf>) -> SinkResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn from_config(config: &FilesystemSinkConfig) -> SinkResult<Self> {
        Self::new(&config.output_dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: i64) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

#[async_trait]
impl Sink for FilesystemSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Filesystem
    }

    async fn put(&self, id: i64, document: &Value) -> SinkResult<()> {
        let bytes = serde_json::to_vec_pretty(document)?;
        let target = self.path_for(id);
        // readers never observe a half-written file
        let staging = self.dir.join(format!("{}.json.tmp", id));

        tokio::fs::write(&staging, &bytes).await?;
        tokio::fs::rename(&staging, &target).await?;

        tracing::debug!("Saved anime {} to {}", id, target.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_writes_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FilesystemSink::new(dir.path().join("anilist_anime")).unwrap();
        let doc = json!({ "id": 101, "title": { "native": "Test" } });

        sink.put(101, &doc).await.unwrap();

        let text = std::fs::read_to_string(sink.path_for(101)).unwrap();
        assert!(text.contains('\n'));
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), doc);
        assert!(!sink.dir().join("101.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_put_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FilesystemSink::new(dir.path()).unwrap();
        let doc = json!({ "id": 7 });

        sink.put(7, &doc).await.unwrap();
        let first = std::fs::read(sink.path_for(7)).unwrap();
        sink.put(7, &doc).await.unwrap();
        let second = std::fs::read(sink.path_for(7)).unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FilesystemSink::new(dir.path()).unwrap();

        sink.put(7, &json!({ "id": 7, "episodes": 1 })).await.unwrap();
        sink.put(7, &json!({ "id": 7, "episodes": 2 })).await.unwrap();

        let text = std::fs::read_to_string(sink.path_for(7)).unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({ "id": 7, "episodes": 2 })
        );
    }
}
