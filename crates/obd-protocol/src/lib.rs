//! OBD-II Protocol Implementation
//!
//! This crate talks to ELM327-compatible OBD-II adapters over a half-duplex
//! byte stream: it frames AT/OBD commands, runs the adapter handshake, and
//! decodes Mode 01 telemetry and Mode 03 trouble codes.

mod channel;
mod dtc;
mod error;
mod hex;
mod init;
mod mock;
mod pid;
mod protocol;
mod serial;
mod transport;

pub use channel::{CommandChannel, RawResponse, PROMPT};
pub use dtc::{decode_dtcs, DiagnosticCode, DtcCategory, ParseDtcError, NO_DATA};
pub use error::{ObdError, ProtocolViolation};
pub use init::{AdapterInitializer, DEFAULT_INIT_DELAY_MS};
pub use mock::MockAdapter;
pub use pid::{
    decode_pid, decode_voltage, try_decode_pid, try_decode_voltage, LiveReading, Pid, PidSpec,
    PID_TABLE,
};
pub use protocol::ObdProtocol;
pub use serial::{SerialTransport, DEFAULT_BAUD_RATE};
pub use transport::{ReadPredicate, Transport};

/// Default timeout for OBD commands
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// ELM327 command strings
pub mod command {
    /// Full adapter reset
    pub const RESET: &str = "ATZ";
    /// Stop echoing commands back
    pub const ECHO_OFF: &str = "ATE0";
    /// No linefeed after carriage returns
    pub const LINEFEEDS_OFF: &str = "ATL0";
    /// Hide CAN/bus headers in replies
    pub const HEADERS_OFF: &str = "ATH0";
    /// Adapter supply voltage
    pub const READ_VOLTAGE: &str = "ATRV";
    /// Mode 03: stored diagnostic trouble codes
    pub const READ_DTC: &str = "03";
}
