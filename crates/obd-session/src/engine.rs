//! Session Engine Implementation
//!
//! Owns the command channel to one adapter and drives it through
//! connect → read cycles → disconnect. Every operation takes `&self`, so an
//! engine shared behind an `Arc` can be disconnected from one task while
//! another is blocked in `read_data`; closing the transport is what releases
//! that read.

use crate::config::SessionConfig;
use crate::snapshot::{ReadCycle, SessionSnapshot};
use crate::state::ConnectionState;
use chrono::Utc;
use obd_protocol::{
    command, decode_dtcs, decode_voltage, AdapterInitializer, CommandChannel, DiagnosticCode,
    LiveReading, ObdError, Pid, ProtocolViolation, Transport,
};
use std::sync::{Mutex, PoisonError};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

/// Connection state machine and read-cycle driver for one adapter
pub struct SessionEngine<T> {
    channel: CommandChannel<T>,
    initializer: AdapterInitializer,
    config: SessionConfig,
    state: watch::Sender<ConnectionState>,
    latest: watch::Sender<ReadCycle>,
    last_failure: Mutex<Option<String>>,
    /// FIFO gate serving connect/read_data in call order
    operations: AsyncMutex<()>,
}

impl<T: Transport> SessionEngine<T> {
    /// Create a disconnected engine over `transport`
    pub fn new(transport: T, config: SessionConfig) -> Self {
        info!("Creating OBD session engine with config: {:?}", config);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (latest, _) = watch::channel(ReadCycle::default());

        Self {
            channel: CommandChannel::new(transport),
            initializer: config.initializer(),
            config,
            state,
            latest,
            last_failure: Mutex::new(None),
            operations: AsyncMutex::new(()),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Watch connection state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Result of the most recent successful read cycle
    pub fn latest(&self) -> ReadCycle {
        self.latest.borrow().clone()
    }

    /// Reason the most recent connect attempt failed, if it did
    pub fn last_failure(&self) -> Option<String> {
        self.last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The engine's transport, for inspection
    pub fn transport(&self) -> &T {
        self.channel.transport()
    }

    fn record_failure(&self, reason: Option<String>) {
        *self
            .last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = reason;
    }

    /// Move from `from` to `to` atomically; false if the state had moved on
    fn advance(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == from {
                *current = to;
                true
            } else {
                false
            }
        })
    }

    async fn close_quietly(&self) {
        self.channel.detach();
        if let Err(e) = self.channel.transport().close().await {
            warn!("Ignoring transport close error: {}", e);
        }
    }

    /// Open `device` and run the adapter handshake
    ///
    /// Only valid while disconnected. On failure the transport is closed,
    /// the reason is kept in [`last_failure`](Self::last_failure) and the
    /// state returns to `Disconnected`.
    pub async fn connect(&self, device: &str) -> Result<(), ObdError> {
        let _turn = self.operations.lock().await;

        let current = self.state();
        if !self.advance(ConnectionState::Disconnected, ConnectionState::Connecting) {
            return Err(ProtocolViolation::AlreadyConnected(current.to_string()).into());
        }
        self.record_failure(None);
        info!("Connecting to OBD adapter at {}", device);

        let result = match self.channel.transport().open(device).await {
            Ok(()) => {
                self.channel.attach();
                self.initializer.initialize(&self.channel).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) if self.advance(ConnectionState::Connecting, ConnectionState::Connected) => {
                info!("Connected to OBD adapter at {}", device);
                Ok(())
            }
            Ok(()) => {
                // A disconnect landed while the handshake was running
                self.close_quietly().await;
                Err(ObdError::Transport(
                    "connection cancelled by disconnect".to_string(),
                ))
            }
            Err(e) => {
                let reason = e.to_string();
                warn!("Connection to {} failed: {}", device, reason);
                self.close_quietly().await;
                self.record_failure(Some(reason.clone()));
                let failed = ConnectionState::Failed(reason);
                if self.advance(ConnectionState::Connecting, failed.clone()) {
                    self.advance(failed, ConnectionState::Disconnected);
                }
                Err(e)
            }
        }
    }

    /// Close the link from any state
    ///
    /// Never waits for an in-progress connect or read: it detaches the
    /// channel and closes the transport, which fails the pending command
    /// with a transport error. A no-op when already disconnected.
    pub async fn disconnect(&self) {
        let previous = self.state.send_replace(ConnectionState::Disconnected);
        if previous.is_disconnected() {
            debug!("Disconnect requested while already disconnected");
            return;
        }

        info!("Disconnecting OBD session (was {})", previous);
        self.close_quietly().await;
    }

    /// Read RPM, speed, coolant, battery voltage and stored DTCs
    ///
    /// Commands go out one at a time. A transport error or timeout on any of
    /// them fails the whole cycle and leaves the session connected; the
    /// caller decides whether to disconnect. Decode anomalies do not fail the
    /// cycle (see [`obd_protocol::decode_pid`]).
    pub async fn read_data(&self) -> Result<ReadCycle, ObdError> {
        let _turn = self.operations.lock().await;

        let connected = self.state.borrow().is_connected();
        if !connected {
            return Err(ProtocolViolation::NotConnected("read_data".to_string()).into());
        }

        let rpm = self.read_pid(Pid::Rpm).await?;
        let speed = self.read_pid(Pid::Speed).await?;
        let coolant = self.read_pid(Pid::CoolantTemp).await?;
        let battery_v = self.read_voltage().await?;
        let dtcs = self.read_dtcs().await?;

        let cycle = ReadCycle {
            live: LiveReading::from_decoded(rpm, speed, coolant, battery_v),
            dtcs,
        };
        debug!(
            "Read cycle: {:?}, {} stored DTCs",
            cycle.live,
            cycle.dtcs.len()
        );

        self.latest.send_replace(cycle.clone());
        Ok(cycle)
    }

    /// Snapshot of the latest read cycle, stamped now
    pub fn build_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::new(&self.latest.borrow(), Utc::now())
    }

    async fn read_pid(&self, pid: Pid) -> Result<i32, ObdError> {
        let reply = self
            .channel
            .send(pid.command(), self.config.command_timeout())
            .await?;
        Ok(pid.decode(reply.as_str()))
    }

    async fn read_voltage(&self) -> Result<f64, ObdError> {
        let reply = self
            .channel
            .send(command::READ_VOLTAGE, self.config.command_timeout())
            .await?;
        Ok(decode_voltage(reply.as_str()))
    }

    async fn read_dtcs(&self) -> Result<Vec<DiagnosticCode>, ObdError> {
        let reply = self
            .channel
            .send(command::READ_DTC, self.config.command_timeout())
            .await?;
        Ok(decode_dtcs(reply.as_str()))
    }
}
