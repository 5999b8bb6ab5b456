//! Byte-stream transport contract
//!
//! The protocol engine only needs five operations from the link to the
//! adapter. Every method takes `&self` so that `close` can run while another
//! task is parked in `read_until`; implementations must make that pending
//! read return promptly with [`ObdError::Transport`].

use crate::error::ObdError;
use async_trait::async_trait;
use tokio::time::Instant;

/// Completion test applied to the bytes accumulated so far
pub type ReadPredicate<'a> = &'a (dyn Fn(&[u8]) -> bool + Send + Sync);

/// Bidirectional byte stream to an OBD-II adapter
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the stream to `device` (port path, radio address, ...)
    async fn open(&self, device: &str) -> Result<(), ObdError>;

    /// Drop whatever has been received but not yet read
    ///
    /// Called before every command so a reply that arrived after its
    /// deadline is not taken for the answer to the next command.
    async fn discard_input(&self) -> Result<(), ObdError>;

    /// Write and flush all of `bytes`
    async fn write(&self, bytes: &[u8]) -> Result<(), ObdError>;

    /// Read until `done` accepts the buffer or `deadline` passes
    async fn read_until(
        &self,
        done: ReadPredicate<'_>,
        deadline: Instant,
    ) -> Result<Vec<u8>, ObdError>;

    /// Close the stream. Closing twice is not an error.
    async fn close(&self) -> Result<(), ObdError>;
}

/// Resolve once the close flag behind `rx` is raised (or its sender is gone)
pub(crate) async fn wait_closed(rx: &mut tokio::sync::watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}
