//! Read-cycle results and exportable session snapshots

use chrono::{DateTime, SubsecRound, Utc};
use obd_protocol::{DiagnosticCode, LiveReading};
use serde::{Deserialize, Serialize};

/// Everything decoded by one `read_data` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadCycle {
    pub live: LiveReading,
    /// Stored trouble codes in adapter order, duplicates kept
    pub dtcs: Vec<DiagnosticCode>,
}

/// Timestamped session state handed to a storage sink
///
/// Serializes as
/// `{"timestamp": "...Z", "dtcs": ["P0301"], "live": {"rpm": .., "speed_kmh": .., "coolant_c": .., "battery_v": ..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// UTC, second precision
    #[serde(with = "utc_seconds")]
    pub timestamp: DateTime<Utc>,
    pub dtcs: Vec<DiagnosticCode>,
    pub live: LiveReading,
}

impl SessionSnapshot {
    /// Snapshot of `cycle` taken at `at` (sub-second part dropped)
    pub fn new(cycle: &ReadCycle, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at.trunc_subsecs(0),
            dtcs: cycle.dtcs.clone(),
            live: cycle.live,
        }
    }

    /// Timestamp as written to storage, e.g. `2026-10-16T08:30:00Z`
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(utc_seconds::FORMAT).to_string()
    }
}

mod utc_seconds {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&at.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&text, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}
