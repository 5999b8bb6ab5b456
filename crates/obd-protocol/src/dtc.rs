//! Diagnostic Trouble Code decoding (Mode 03)
//!
//! Like the PID decoders, [`decode_dtcs`] is best-effort: a malformed group
//! ends the list early instead of raising an error, so a garbled reply can
//! under-report stored codes. Truncation is logged at `debug`.

use crate::hex::{byte_at, compact_lines};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Marker an ELM327 prints when the ECU did not answer
pub const NO_DATA: &str = "NO DATA";

/// Compacted reply meaning "zero stored codes"
const ZERO_COUNT_REPLY: &str = "4300";

/// Hex characters of mode echo (and count byte) before the first code
const HEADER_LEN: usize = 4;

/// System a trouble code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DtcCategory {
    /// Powertrain
    P,
    /// Chassis
    C,
    /// Body
    B,
    /// Network
    U,
}

impl DtcCategory {
    /// Category from the top two bits of the first code byte
    pub fn from_first_byte(byte: u8) -> Self {
        match byte >> 6 {
            0 => DtcCategory::P,
            1 => DtcCategory::C,
            2 => DtcCategory::B,
            _ => DtcCategory::U,
        }
    }

    fn letter(&self) -> char {
        match self {
            DtcCategory::P => 'P',
            DtcCategory::C => 'C',
            DtcCategory::B => 'B',
            DtcCategory::U => 'U',
        }
    }
}

/// One stored trouble code, e.g. `P0301`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagnosticCode {
    pub category: DtcCategory,
    /// 14-bit code number, shown as four hex digits
    pub code: u16,
}

impl DiagnosticCode {
    /// Decode the two bytes of one code
    pub fn from_bytes(byte1: u8, byte2: u8) -> Self {
        Self {
            category: DtcCategory::from_first_byte(byte1),
            code: (u16::from(byte1 & 0x3F) << 8) | u16::from(byte2),
        }
    }

    /// The four-digit part, uppercase and zero-padded
    pub fn code_hex(&self) -> String {
        format!("{:04X}", self.code)
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:04X}", self.category.letter(), self.code)
    }
}

/// Text that is not a `P0301`-style code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid trouble code: {0:?}")]
pub struct ParseDtcError(String);

impl FromStr for DiagnosticCode {
    type Err = ParseDtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseDtcError(s.to_string());

        let mut chars = s.chars();
        let category = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('P') => DtcCategory::P,
            Some('C') => DtcCategory::C,
            Some('B') => DtcCategory::B,
            Some('U') => DtcCategory::U,
            _ => return Err(invalid()),
        };

        let digits = chars.as_str();
        if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let code = u16::from_str_radix(digits, 16).map_err(|_| invalid())?;
        if code > 0x3FFF {
            return Err(invalid());
        }

        Ok(Self { category, code })
    }
}

impl Serialize for DiagnosticCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DiagnosticCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Decode a Mode 03 reply into trouble codes, in reply order
///
/// Each line is one ECU's answer with its own `43` header. Duplicates are
/// kept. A `00 00` group ends its line; the first group that is not hex ends
/// decoding altogether and whatever was decoded before is returned.
pub fn decode_dtcs(raw: &str) -> Vec<DiagnosticCode> {
    if raw.to_ascii_uppercase().contains(NO_DATA) {
        return Vec::new();
    }

    let mut codes = Vec::new();
    for hex in compact_lines(raw) {
        if hex.starts_with(ZERO_COUNT_REPLY) {
            continue;
        }
        if !decode_line(&hex, &mut codes) {
            debug!("DTC reply {:?} malformed, keeping {} codes", raw, codes.len());
            break;
        }
    }

    codes
}

/// Append the codes of one compacted line; false if a group was malformed
fn decode_line(hex: &str, codes: &mut Vec<DiagnosticCode>) -> bool {
    let mut offset = HEADER_LEN;

    while offset + 4 <= hex.len() {
        let (Some(byte1), Some(byte2)) = (byte_at(hex, offset), byte_at(hex, offset + 2)) else {
            return false;
        };

        if byte1 == 0 && byte2 == 0 {
            break;
        }

        codes.push(DiagnosticCode::from_bytes(byte1, byte2));
        offset += 4;
    }

    true
}
