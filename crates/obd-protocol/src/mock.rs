//! Simulated ELM327 adapter
//!
//! A scripted [`Transport`] that answers like a real adapter: echo is on
//! until `ATE0`, every reply ends with the `>` prompt, and unknown commands
//! get `?`. Commands can be told to never answer, or to answer only after
//! the reader gave up, so deadlines, cancellation and late replies can be
//! exercised without hardware.

use crate::error::ObdError;
use crate::transport::{wait_closed, ReadPredicate, Transport};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct AdapterState {
    open: bool,
    echo: bool,
    /// Bytes "on the wire" waiting to be read
    pending: Vec<u8>,
    /// Commands whose next reply arrives only after the read deadline
    late: HashSet<String>,
    /// Reply held back until the current read times out
    withheld: Vec<u8>,
    /// Partial command text, terminated by `\r`
    line: String,
    sent: Vec<String>,
    opens: usize,
    closes: usize,
}

/// In-memory ELM327 for tests and dry runs
pub struct MockAdapter {
    responses: HashMap<String, String>,
    ignored: HashSet<String>,
    refuse_open: Option<String>,
    state: Mutex<AdapterState>,
    closed: watch::Sender<bool>,
}

impl MockAdapter {
    /// Adapter with stock replies for the handshake, RPM/speed/coolant,
    /// `ATRV` and a single stored trouble code
    pub fn elm327() -> Self {
        let responses = [
            ("ATZ", "\r\rELM327 v1.5"),
            ("ATE0", "OK"),
            ("ATL0", "OK"),
            ("ATH0", "OK"),
            ("ATSP0", "OK"),
            ("ATRV", "12.3V"),
            // Payload bytes sit behind a 3-byte prefix (length, mode, pid)
            ("010C", "04 41 0C 1A F8"),
            ("010D", "03 41 0D 28"),
            ("0105", "03 41 05 7B"),
            ("03", "43 01 03 01 00 00"),
        ]
        .into_iter()
        .map(|(cmd, reply)| (cmd.to_string(), reply.to_string()))
        .collect();

        let (closed, _) = watch::channel(true);
        Self {
            responses,
            ignored: HashSet::new(),
            refuse_open: None,
            state: Mutex::new(AdapterState {
                open: false,
                echo: true,
                pending: Vec::new(),
                late: HashSet::new(),
                withheld: Vec::new(),
                line: String::new(),
                sent: Vec::new(),
                opens: 0,
                closes: 0,
            }),
            closed,
        }
    }

    /// Replace (or add) the reply body for `command`; the prompt is appended
    pub fn with_response(mut self, command: &str, reply: &str) -> Self {
        self.responses
            .insert(command.to_ascii_uppercase(), reply.to_string());
        self
    }

    /// Never answer `command`, so reads for it run into their deadline
    pub fn ignoring(mut self, command: &str) -> Self {
        self.ignored.insert(command.to_ascii_uppercase());
        self
    }

    /// Deliver the next reply to `command` only once its read has timed out
    pub fn answering_late(mut self, command: &str) -> Self {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .late
            .insert(command.to_ascii_uppercase());
        self
    }

    /// Fail every `open` with `reason`
    pub fn refusing_open(mut self, reason: &str) -> Self {
        self.refuse_open = Some(reason.to_string());
        self
    }

    /// Commands received so far, in order
    pub fn sent_commands(&self) -> Vec<String> {
        self.lock().map(|s| s.sent.clone()).unwrap_or_default()
    }

    /// Whether the simulated link is currently open
    pub fn is_open(&self) -> bool {
        self.lock().map(|s| s.open).unwrap_or(false)
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.lock().map(|s| s.opens).unwrap_or(0)
    }

    /// Number of closes of an open link
    pub fn close_count(&self) -> usize {
        self.lock().map(|s| s.closes).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, AdapterState>, ObdError> {
        self.state
            .lock()
            .map_err(|e| ObdError::Transport(format!("Lock error: {}", e)))
    }

    fn reply_to(&self, state: &mut AdapterState, command: &str) {
        state.sent.push(command.to_string());

        if self.ignored.contains(command) {
            debug!("Mock adapter ignoring {}", command);
            return;
        }

        let body = self
            .responses
            .get(command)
            .map(String::as_str)
            .unwrap_or("?");

        let mut reply = Vec::with_capacity(command.len() + body.len() + 4);
        if state.echo {
            reply.extend_from_slice(command.as_bytes());
            reply.push(b'\r');
        }
        reply.extend_from_slice(body.as_bytes());
        reply.extend_from_slice(b"\r\r>");

        if state.late.remove(command) {
            debug!("Mock adapter holding back reply to {}", command);
            state.withheld.extend_from_slice(&reply);
        } else {
            state.pending.extend_from_slice(&reply);
        }

        match command {
            "ATE0" => state.echo = false,
            "ATE1" => state.echo = true,
            "ATZ" => state.echo = true,
            _ => {}
        }
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::elm327()
    }
}

#[async_trait]
impl Transport for MockAdapter {
    async fn open(&self, device: &str) -> Result<(), ObdError> {
        if let Some(reason) = &self.refuse_open {
            return Err(ObdError::Transport(format!("{}: {}", device, reason)));
        }

        let mut state = self.lock()?;
        state.open = true;
        state.echo = true;
        state.pending.clear();
        state.withheld.clear();
        state.opens += 1;
        self.closed.send_replace(false);
        Ok(())
    }

    async fn discard_input(&self) -> Result<(), ObdError> {
        let mut state = self.lock()?;
        if !state.open {
            return Err(ObdError::Transport("mock adapter not open".to_string()));
        }
        if !state.pending.is_empty() {
            debug!("Mock adapter discarding {} stale bytes", state.pending.len());
            state.pending.clear();
        }
        Ok(())
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), ObdError> {
        let mut state = self.lock()?;
        if !state.open {
            return Err(ObdError::Transport("mock adapter not open".to_string()));
        }

        for &byte in bytes {
            match byte {
                b'\r' => {
                    let command = std::mem::take(&mut state.line).trim().to_ascii_uppercase();
                    if !command.is_empty() {
                        self.reply_to(&mut state, &command);
                    }
                }
                b'\n' => {}
                other => state.line.push(other as char),
            }
        }
        Ok(())
    }

    async fn read_until(
        &self,
        done: ReadPredicate<'_>,
        deadline: Instant,
    ) -> Result<Vec<u8>, ObdError> {
        let started = Instant::now();
        let mut closed = self.closed.subscribe();

        {
            let mut state = self.lock()?;
            if !state.open {
                return Err(ObdError::Transport("mock adapter not open".to_string()));
            }
            if done(&state.pending) {
                return Ok(std::mem::take(&mut state.pending));
            }
        }

        // Replies are produced synchronously on write, so anything still
        // missing will never arrive: wait for close or the deadline.
        tokio::select! {
            _ = wait_closed(&mut closed) => {
                Err(ObdError::Transport("mock adapter closed".to_string()))
            }
            _ = tokio::time::sleep_until(deadline) => {
                let mut state = self.lock()?;
                let late = std::mem::take(&mut state.withheld);
                state.pending.extend_from_slice(&late);
                Err(ObdError::Timeout(started.elapsed().as_millis() as u64))
            }
        }
    }

    async fn close(&self) -> Result<(), ObdError> {
        self.closed.send_replace(true);
        let mut state = self.lock()?;
        if state.open {
            state.open = false;
            state.closes += 1;
        }
        state.pending.clear();
        state.withheld.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn prompt(buf: &[u8]) -> bool {
        buf.contains(&b'>')
    }

    #[tokio::test]
    async fn test_echo_until_ate0() {
        let adapter = MockAdapter::elm327();
        adapter.open("mock").await.unwrap();
        let deadline = Instant::now() + Duration::from_millis(100);

        adapter.write(b"ATE0\r").await.unwrap();
        let reply = adapter.read_until(&prompt, deadline).await.unwrap();
        assert_eq!(reply, b"ATE0\rOK\r\r>".to_vec());

        adapter.write(b"010D\r").await.unwrap();
        let reply = adapter.read_until(&prompt, deadline).await.unwrap();
        assert_eq!(reply, b"03 41 0D 28\r\r>".to_vec());
    }

    #[tokio::test]
    async fn test_unknown_command_gets_question_mark() {
        let adapter = MockAdapter::elm327();
        adapter.open("mock").await.unwrap();
        adapter.write(b"ATXYZ\r").await.unwrap();
        let deadline = Instant::now() + Duration::from_millis(100);
        let reply = adapter.read_until(&prompt, deadline).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&reply), "ATXYZ\r?\r\r>");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_command_times_out() {
        let adapter = MockAdapter::elm327().ignoring("03");
        adapter.open("mock").await.unwrap();
        adapter.write(b"03\r").await.unwrap();
        let deadline = Instant::now() + Duration::from_millis(500);
        let err = adapter.read_until(&prompt, deadline).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(adapter.sent_commands(), vec!["03".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_lands_after_deadline() {
        let adapter = MockAdapter::elm327().answering_late("010C");
        adapter.open("mock").await.unwrap();
        adapter.write(b"ATE0\r").await.unwrap();
        adapter.discard_input().await.unwrap();

        adapter.write(b"010C\r").await.unwrap();
        let deadline = Instant::now() + Duration::from_millis(500);
        assert!(adapter.read_until(&prompt, deadline).await.unwrap_err().is_timeout());

        // Now on the wire, and gone once discarded
        let reply = adapter.read_until(&prompt, deadline).await.unwrap();
        assert_eq!(reply, b"04 41 0C 1A F8\r\r>".to_vec());
        adapter.write(b"010C\r").await.unwrap();
        adapter.discard_input().await.unwrap();
        assert!(adapter.read_until(&prompt, deadline).await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_refused_open() {
        let adapter = MockAdapter::elm327().refusing_open("no such device");
        let err = adapter.open("00:11:22:33:44:55").await.unwrap_err();
        assert!(matches!(err, ObdError::Transport(_)));
        assert!(!adapter.is_open());
        assert_eq!(adapter.open_count(), 0);
    }

    #[tokio::test]
    async fn test_close_counts_once() {
        let adapter = MockAdapter::elm327();
        adapter.open("mock").await.unwrap();
        adapter.close().await.unwrap();
        adapter.close().await.unwrap();
        assert_eq!(adapter.close_count(), 1);
        assert!(adapter.write(b"ATZ\r").await.is_err());
    }
}
