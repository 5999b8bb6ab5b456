//! OBD-II Session Engine
//!
//! Guards an ELM327 link with a connection state machine and turns read
//! cycles into timestamped snapshots for a storage sink.

mod config;
mod engine;
mod snapshot;
mod state;

pub use config::SessionConfig;
pub use engine::SessionEngine;
pub use snapshot::{ReadCycle, SessionSnapshot};
pub use state::ConnectionState;
