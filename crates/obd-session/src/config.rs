//! Session configuration

use obd_protocol::{AdapterInitializer, ObdProtocol, DEFAULT_INIT_DELAY_MS, DEFAULT_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and protocol settings for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Reply deadline for every command, handshake included (ms)
    pub command_timeout_ms: u64,
    /// Pause between handshake commands (ms)
    pub init_delay_ms: u64,
    /// Protocol selected at the end of the handshake
    pub protocol: ObdProtocol,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: DEFAULT_TIMEOUT_MS,
            init_delay_ms: DEFAULT_INIT_DELAY_MS,
            protocol: ObdProtocol::Auto,
        }
    }
}

impl SessionConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn init_delay(&self) -> Duration {
        Duration::from_millis(self.init_delay_ms)
    }

    /// Handshake runner for these settings
    pub fn initializer(&self) -> AdapterInitializer {
        AdapterInitializer::new(self.protocol, self.init_delay(), self.command_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.command_timeout(), Duration::from_secs(2));
        assert_eq!(config.init_delay(), Duration::from_millis(100));
        assert_eq!(config.initializer().commands()[4], "ATSP0");
    }

    #[test]
    fn test_partial_override() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"command_timeout_ms": 5000, "protocol": "iso15765_4_can11bit500"}"#)
                .unwrap();
        assert_eq!(config.command_timeout_ms, 5000);
        assert_eq!(config.init_delay_ms, DEFAULT_INIT_DELAY_MS);
        assert_eq!(config.protocol, ObdProtocol::Iso15765_4Can11bit500);
    }
}
