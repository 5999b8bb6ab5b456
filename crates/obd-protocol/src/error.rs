//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur during OBD-II communication
///
/// Decode anomalies (short or malformed hex in a PID or DTC response) are
/// deliberately not represented here: the decoders absorb them and return
/// zero values or partial lists instead.
#[derive(Debug, Error)]
pub enum ObdError {
    /// Byte-stream failure: open, write, read or close, including a stream
    /// closed underneath a pending read
    #[error("Transport error: {0}")]
    Transport(String),

    /// No prompt seen before the deadline
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// Caller broke the half-duplex or connection contract
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// A step of the adapter handshake failed
    #[error("Adapter initialization failed at {command}: {source}")]
    Initialization {
        command: String,
        #[source]
        source: Box<ObdError>,
    },
}

impl ObdError {
    /// Whether this error (or the handshake step it wraps) is a timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            ObdError::Timeout(_) => true,
            ObdError::Initialization { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

/// Programming-contract errors; always fatal to the call that raised them
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// A second command was issued while one is still outstanding
    #[error("command {attempted:?} issued while {outstanding:?} is outstanding")]
    CommandOutstanding {
        attempted: String,
        outstanding: String,
    },

    /// A command or read was issued without a live adapter link
    #[error("{0} requested while not connected")]
    NotConnected(String),

    /// `connect` was called on a session that is not disconnected
    #[error("connect requested while session is {0}")]
    AlreadyConnected(String),
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::Transport(err.to_string())
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::Transport(err.to_string())
    }
}
