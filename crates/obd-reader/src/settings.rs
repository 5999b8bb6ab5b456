//! Layered settings: defaults, then `obd-reader.toml`, then `OBD_READER_*`

use config::{Config, ConfigError, Environment, File};
use obd_protocol::DEFAULT_BAUD_RATE;
use obd_session::SessionConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Device name that selects the simulated adapter
pub const MOCK_DEVICE: &str = "mock";

/// Reader settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Serial device of the adapter, or `mock`
    pub device: String,
    pub baud_rate: u32,
    /// Directory the snapshot file is written to
    pub output_dir: PathBuf,
    pub file_name: String,
    /// Read cycles to run before disconnecting
    pub read_cycles: u32,
    /// Pause between read cycles (ms)
    pub read_interval_ms: u64,
    /// Max tracing level (`error` .. `trace`)
    pub log_level: String,
    pub session: SessionConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: "/dev/rfcomm0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            output_dir: PathBuf::from("Documents"),
            file_name: storage::DEFAULT_FILE_NAME.to_string(),
            read_cycles: 1,
            read_interval_ms: 1000,
            log_level: "info".to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl Settings {
    /// Load from `./obd-reader.toml` (optional) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("obd-reader")
    }

    /// Load from `<file_stem>.{toml,yaml,json,...}` (optional) and the
    /// environment, e.g. `OBD_READER_DEVICE` or
    /// `OBD_READER_SESSION__COMMAND_TIMEOUT_MS`
    pub fn load_from(file_stem: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(file_stem).required(false))
            .add_source(
                Environment::with_prefix("OBD_READER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms)
    }

    pub fn is_mock(&self) -> bool {
        self.device.eq_ignore_ascii_case(MOCK_DEVICE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("absent");
        let settings = Settings::load_from(stem.to_str().unwrap()).unwrap();

        assert_eq!(settings.baud_rate, 38400);
        assert_eq!(settings.read_cycles, 1);
        assert_eq!(settings.file_name, "obd_session.json");
        assert_eq!(settings.session, SessionConfig::default());
    }

    #[test]
    fn test_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("obd-reader.toml"),
            r#"
device = "mock"
read_cycles = 3
output_dir = "/tmp/obd"

[session]
command_timeout_ms = 4000
protocol = "iso15765_4_can11bit500"
"#,
        )
        .unwrap();

        let stem = dir.path().join("obd-reader");
        let settings = Settings::load_from(stem.to_str().unwrap()).unwrap();

        assert!(settings.is_mock());
        assert_eq!(settings.read_cycles, 3);
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/obd"));
        assert_eq!(settings.session.command_timeout_ms, 4000);
        assert_eq!(settings.session.init_delay_ms, 100);
        assert_eq!(
            settings.session.protocol,
            obd_protocol::ObdProtocol::Iso15765_4Can11bit500
        );
    }
}
