//! JSON file sink

use crate::{SnapshotSink, StorageError};
use async_trait::async_trait;
use obd_session::SessionSnapshot;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name used when none is configured
pub const DEFAULT_FILE_NAME: &str = "obd_session.json";

/// Writes each snapshot as pretty-printed JSON, replacing the previous file
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
    file_name: String,
}

impl JsonFileSink {
    /// Sink writing `obd_session.json` inside `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file_name: DEFAULT_FILE_NAME.to_string(),
        }
    }

    /// Use a different file name inside the same directory
    pub fn with_file_name(mut self, file_name: &str) -> Self {
        self.file_name = file_name.to_string();
        self
    }

    /// Full path written by [`store`](SnapshotSink::store)
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl SnapshotSink for JsonFileSink {
    async fn store(&self, snapshot: &SessionSnapshot) -> Result<String, StorageError> {
        let json = serde_json::to_string_pretty(snapshot)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path();
        tokio::fs::write(&path, json).await?;

        info!("Saved session snapshot to {}", path.display());
        Ok(path.display().to_string())
    }
}
