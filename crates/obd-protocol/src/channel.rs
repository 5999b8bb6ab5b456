//! Half-duplex command channel
//!
//! Serializes command/response exchanges over a [`Transport`]. An ELM327
//! handles one command at a time, so the channel holds a single in-flight
//! slot: a second `send` while the first is outstanding is rejected with
//! [`ProtocolViolation::CommandOutstanding`] instead of being interleaved.

use crate::error::{ObdError, ProtocolViolation};
use crate::transport::Transport;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Prompt character ending every adapter reply
pub const PROMPT: u8 = b'>';

fn ends_with_prompt(buffer: &[u8]) -> bool {
    buffer.contains(&PROMPT)
}

/// Reply to one command with prompt, whitespace and echo removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    command: String,
    text: String,
}

impl RawResponse {
    /// Normalize the raw bytes read for `command`
    pub fn normalize(command: &str, raw: &[u8]) -> Self {
        let decoded = String::from_utf8_lossy(raw).replace('\0', "");

        let mut lines = decoded
            .split(['\r', '\n'])
            .map(|line| line.trim_matches(|c: char| c.is_whitespace() || c == '>'))
            .filter(|line| !line.is_empty())
            .peekable();

        // Echo is on until ATE0 has been processed
        if lines
            .peek()
            .is_some_and(|first| first.eq_ignore_ascii_case(command))
        {
            lines.next();
        }

        Self {
            command: command.to_string(),
            text: lines.collect::<Vec<_>>().join("\n"),
        }
    }

    /// Command this reply answers
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Reply text, one adapter line per `\n`
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Take the reply text
    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Clears the in-flight slot when a send finishes or is dropped
struct InFlight<'a> {
    slot: &'a Mutex<Option<String>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Command/response channel to an ELM327 adapter
pub struct CommandChannel<T> {
    transport: T,
    /// Set while the transport is open and commands may flow
    linked: AtomicBool,
    /// Command currently awaiting its prompt
    in_flight: Mutex<Option<String>>,
}

impl<T: Transport> CommandChannel<T> {
    /// Wrap a transport; the link starts detached
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            linked: AtomicBool::new(false),
            in_flight: Mutex::new(None),
        }
    }

    /// Underlying transport, for open/close
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Allow commands to flow (transport is open)
    pub fn attach(&self) {
        self.linked.store(true, Ordering::SeqCst);
    }

    /// Refuse further commands (transport closing or closed)
    pub fn detach(&self) {
        self.linked.store(false, Ordering::SeqCst);
    }

    /// Whether commands may currently be sent
    pub fn is_attached(&self) -> bool {
        self.linked.load(Ordering::SeqCst)
    }

    /// Command currently awaiting a reply, if any
    pub fn outstanding(&self) -> Option<String> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn claim(&self, command: &str) -> Result<InFlight<'_>, ProtocolViolation> {
        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(outstanding) = slot.as_ref() {
            return Err(ProtocolViolation::CommandOutstanding {
                attempted: command.to_string(),
                outstanding: outstanding.clone(),
            });
        }
        *slot = Some(command.to_string());
        Ok(InFlight {
            slot: &self.in_flight,
        })
    }

    /// Send `command` and wait up to `timeout` for the prompt
    ///
    /// A timeout leaves the transport open; whether to disconnect is the
    /// caller's decision. Input still buffered from an earlier command is
    /// discarded before writing, so a reply that missed its deadline is never
    /// returned for this one.
    pub async fn send(&self, command: &str, timeout: Duration) -> Result<RawResponse, ObdError> {
        if !self.is_attached() {
            return Err(ProtocolViolation::NotConnected(format!("command {:?}", command)).into());
        }
        let _in_flight = self.claim(command)?;

        debug!("-> {}", command);
        let deadline = Instant::now() + timeout;
        let timed_out = || ObdError::Timeout(timeout.as_millis() as u64);

        let mut frame = Vec::with_capacity(command.len() + 1);
        frame.extend_from_slice(command.as_bytes());
        frame.push(b'\r');

        tokio::time::timeout_at(deadline, async {
            self.transport.discard_input().await?;
            self.transport.write(&frame).await
        })
        .await
        .map_err(|_| timed_out())??;

        let raw = match self.transport.read_until(&ends_with_prompt, deadline).await {
            Ok(raw) => raw,
            Err(ObdError::Timeout(_)) => {
                warn!("No prompt for {} within {:?}", command, timeout);
                return Err(timed_out());
            }
            Err(e) => return Err(e),
        };

        let response = RawResponse::normalize(command, &raw);
        trace!("<- {}: {:?}", command, response.as_str());
        Ok(response)
    }
}
