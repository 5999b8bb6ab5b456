//! Storage Layer
//!
//! Receives finished session snapshots. The session engine never persists
//! anything itself; a [`SnapshotSink`] decides where a snapshot goes.

mod json_file;
mod memory;

pub use json_file::{JsonFileSink, DEFAULT_FILE_NAME};
pub use memory::MemorySink;

use async_trait::async_trait;
use obd_session::SessionSnapshot;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Lock error: {0}")]
    Lock(String),
}

/// Destination for finished snapshots
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Store one snapshot; returns a human-readable location
    async fn store(&self, snapshot: &SessionSnapshot) -> Result<String, StorageError>;
}
