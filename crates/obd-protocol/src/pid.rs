//! OBD-II PID Definitions and Response Parsing
//!
//! Defines the Mode 01 Parameter IDs read each cycle, their decoding
//! formulas, and the adapter voltage reading.
//!
//! # Best-effort decoding
//!
//! [`decode_pid`] and [`decode_voltage`] never fail. A reply that is too
//! short, not hex, or otherwise malformed decodes to zero, exactly like a
//! genuine zero reading. This tolerates adapter noise but can also hide a
//! faulty adapter or an unsupported PID, so a zero must not be read as
//! "unsupported". Callers that need to tell the two apart use
//! [`try_decode_pid`] / [`try_decode_voltage`], which return `None` in
//! every case where the plain decoders substitute zero.

use crate::hex::{byte_at, compact};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hex offset of payload byte A; the first three bytes are header/echo
pub const PAYLOAD_OFFSET: usize = 6;

/// Mode 01 PIDs read by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
}

impl Pid {
    /// Read order within a cycle
    pub const ALL: [Pid; 3] = [Pid::Rpm, Pid::Speed, Pid::CoolantTemp];

    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Static decoding entry for this PID
    pub fn spec(&self) -> &'static PidSpec {
        match self {
            Pid::Rpm => &PID_TABLE[0],
            Pid::Speed => &PID_TABLE[1],
            Pid::CoolantTemp => &PID_TABLE[2],
        }
    }

    /// Command text sent to the adapter, e.g. `010C`
    pub fn command(&self) -> &'static str {
        self.spec().code
    }

    /// Look a PID up by its command text (case-insensitive)
    pub fn from_command(code: &str) -> Option<Pid> {
        PID_TABLE
            .iter()
            .find(|spec| spec.code.eq_ignore_ascii_case(code.trim()))
            .map(|spec| spec.pid)
    }

    /// Best-effort decode of a reply to this PID
    pub fn decode(&self, raw: &str) -> i32 {
        self.spec().decode(raw)
    }
}

/// Decoding rule for one PID
pub struct PidSpec {
    pub pid: Pid,
    /// Command text (mode + PID)
    pub code: &'static str,
    /// Shortest compacted reply that carries the whole payload
    pub min_hex_len: usize,
    /// Payload bytes to physical value
    pub formula: fn(&[u8]) -> i32,
}

impl std::fmt::Debug for PidSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PidSpec")
            .field("pid", &self.pid)
            .field("code", &self.code)
            .field("min_hex_len", &self.min_hex_len)
            .finish_non_exhaustive()
    }
}

impl PidSpec {
    fn payload_len(&self) -> usize {
        (self.min_hex_len - PAYLOAD_OFFSET) / 2
    }

    /// Decode, or `None` if the reply does not carry a well-formed payload
    pub fn try_decode(&self, raw: &str) -> Option<i32> {
        let hex = compact(raw);
        if hex.len() < self.min_hex_len {
            return None;
        }

        let payload = (0..self.payload_len())
            .map(|i| byte_at(&hex, PAYLOAD_OFFSET + 2 * i))
            .collect::<Option<Vec<u8>>>()?;

        Some((self.formula)(&payload))
    }

    /// Decode, substituting zero for any anomaly
    pub fn decode(&self, raw: &str) -> i32 {
        self.try_decode(raw).unwrap_or_else(|| {
            debug!("PID {} reply {:?} not decodable, using 0", self.code, raw);
            0
        })
    }
}

// RPM: ((A*256)+B)/4, truncated
fn rpm(payload: &[u8]) -> i32 {
    match payload {
        [a, b, ..] => (256 * i32::from(*a) + i32::from(*b)) / 4,
        _ => 0,
    }
}

// Speed: A (km/h)
fn speed(payload: &[u8]) -> i32 {
    payload.first().map_or(0, |a| i32::from(*a))
}

// Coolant Temp: A - 40 (°C)
fn coolant(payload: &[u8]) -> i32 {
    payload.first().map_or(0, |a| i32::from(*a) - 40)
}

/// Decoding table, one entry per [`Pid`]
pub static PID_TABLE: [PidSpec; 3] = [
    PidSpec {
        pid: Pid::Rpm,
        code: "010C",
        min_hex_len: PAYLOAD_OFFSET + 4,
        formula: rpm,
    },
    PidSpec {
        pid: Pid::Speed,
        code: "010D",
        min_hex_len: PAYLOAD_OFFSET + 2,
        formula: speed,
    },
    PidSpec {
        pid: Pid::CoolantTemp,
        code: "0105",
        min_hex_len: PAYLOAD_OFFSET + 2,
        formula: coolant,
    },
];

/// Decode a reply to `pid` (command text such as `010C`); see the module
/// docs for the zero-on-anomaly policy. Unknown PIDs decode to zero.
pub fn decode_pid(pid: &str, raw: &str) -> i32 {
    try_decode_pid(pid, raw).unwrap_or(0)
}

/// Strict variant of [`decode_pid`]
pub fn try_decode_pid(pid: &str, raw: &str) -> Option<i32> {
    match Pid::from_command(pid) {
        Some(known) => {
            let value = known.spec().try_decode(raw);
            if value.is_none() {
                debug!("PID {} reply {:?} not decodable", pid, raw);
            }
            value
        }
        None => {
            debug!("PID {} has no decoding rule", pid);
            None
        }
    }
}

/// Decode an `ATRV` reply such as `12.3V`; anomalies give `0.0`
pub fn decode_voltage(raw: &str) -> f64 {
    try_decode_voltage(raw).unwrap_or_else(|| {
        debug!("Voltage reply {:?} not decodable, using 0.0", raw);
        0.0
    })
}

/// Strict variant of [`decode_voltage`]; rejects non-finite and negative values
pub fn try_decode_voltage(raw: &str) -> Option<f64> {
    let text = raw.trim().trim_end_matches('>').trim();
    let number = text
        .strip_suffix('V')
        .or_else(|| text.strip_suffix('v'))
        .unwrap_or(text)
        .trim();

    number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Live telemetry from one read cycle
///
/// Replaced wholesale each cycle, never patched field by field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveReading {
    /// Engine RPM
    pub rpm: u16,
    /// Vehicle speed (km/h)
    pub speed_kmh: u8,
    /// Coolant temperature (°C)
    pub coolant_c: i16,
    /// Adapter supply voltage (V)
    pub battery_v: f64,
}

impl LiveReading {
    /// Build from decoded values; anything outside a field's range becomes 0
    pub fn from_decoded(rpm: i32, speed_kmh: i32, coolant_c: i32, battery_v: f64) -> Self {
        Self {
            rpm: u16::try_from(rpm).unwrap_or(0),
            speed_kmh: u8::try_from(speed_kmh).unwrap_or(0),
            coolant_c: i16::try_from(coolant_c).unwrap_or(0),
            battery_v: if battery_v.is_finite() && battery_v >= 0.0 {
                battery_v
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rpm_decode() {
        // 1A F8 => ((0x1A * 256) + 0xF8) / 4 = (6656 + 248) / 4 = 1726
        assert_eq!(decode_pid("010C", "04 41 0C 1A F8"), 1726);
        // 1A 2B => 6699 / 4 = 1674 (truncated)
        assert_eq!(decode_pid("010C", "04410C1A2B"), 1674);
    }

    #[test]
    fn test_speed_decode() {
        // 0x28 = 40 km/h
        assert_eq!(decode_pid("010D", "03 41 0D 28"), 40);
        assert_eq!(Pid::Speed.decode("03 41 0D FF"), 255);
    }

    #[test]
    fn test_coolant_temp_decode() {
        // 0x7B = 123, so temp = 123 - 40 = 83°C
        assert_eq!(decode_pid("0105", "03 41 05 7B"), 83);
        // 0x0A = 10, so temp = -30°C
        assert_eq!(decode_pid("0105", "03 41 05 0A"), -30);
    }

    #[test]
    fn test_short_reply_is_zero() {
        // Headers off: the payload is not where the 3-byte prefix puts it
        assert_eq!(decode_pid("010C", "41 0C 1A F8"), 0);
        assert_eq!(decode_pid("010D", "41 0D"), 0);
        assert_eq!(try_decode_pid("010C", "41 0C 1A F8"), None);
    }

    #[test]
    fn test_malformed_reply_is_zero() {
        assert_eq!(decode_pid("010C", "NO DATA"), 0);
        assert_eq!(decode_pid("0105", "UNABLE TO CONNECT"), 0);
        assert_eq!(decode_pid("010D", "03 41 0D ZZ"), 0);
        assert_eq!(try_decode_pid("0105", "UNABLE TO CONNECT"), None);
    }

    #[test]
    fn test_unknown_pid_is_zero() {
        assert_eq!(decode_pid("0111", "03 41 11 80"), 0);
        assert_eq!(try_decode_pid("0111", "03 41 11 80"), None);
    }

    #[test]
    fn test_searching_prefix_ignored() {
        assert_eq!(decode_pid("010D", "SEARCHING...\r03 41 0D 28"), 40);
    }

    #[test]
    fn test_pid_table_lookup() {
        assert_eq!(Pid::from_command("010c"), Some(Pid::Rpm));
        assert_eq!(Pid::CoolantTemp.command(), "0105");
        assert_eq!(Pid::Rpm.as_hex(), 0x0C);
        for pid in Pid::ALL {
            assert_eq!(pid.spec().pid, pid);
        }
    }

    #[test]
    fn test_voltage_decode() {
        assert!((decode_voltage("12.3V") - 12.3).abs() < 1e-9);
        assert!((decode_voltage(" 14.1V\r") - 14.1).abs() < 1e-9);
        assert_eq!(decode_voltage("?"), 0.0);
        assert_eq!(decode_voltage(""), 0.0);
        assert_eq!(decode_voltage("NaNV"), 0.0);
        assert_eq!(try_decode_voltage("-1.0V"), None);
    }

    #[test]
    fn test_live_reading_clamps() {
        let reading = LiveReading::from_decoded(70000, 300, -40, f64::NAN);
        assert_eq!(reading.rpm, 0);
        assert_eq!(reading.speed_kmh, 0);
        assert_eq!(reading.coolant_c, -40);
        assert_eq!(reading.battery_v, 0.0);
    }

    proptest! {
        #[test]
        fn prop_rpm_formula(a in 0u8..=255, b in 0u8..=255) {
            let raw = format!("04 41 0C {:02X} {:02X}", a, b);
            prop_assert_eq!(decode_pid("010C", &raw), (256 * a as i32 + b as i32) / 4);
        }

        #[test]
        fn prop_coolant_formula(a in 0u8..=255) {
            let raw = format!("03 41 05 {:02X}", a);
            prop_assert_eq!(decode_pid("0105", &raw), a as i32 - 40);
        }

        #[test]
        fn prop_short_reply_is_zero(hex in "[0-9A-F]{0,7}") {
            prop_assert_eq!(decode_pid("010D", &hex), 0);
            prop_assert_eq!(decode_pid("0105", &hex), 0);
            prop_assert_eq!(decode_pid("010C", &hex), 0);
        }

        #[test]
        fn prop_never_panics(raw in "\\PC*") {
            for pid in Pid::ALL {
                let _ = pid.decode(&raw);
            }
            let _ = decode_voltage(&raw);
        }
    }
}
