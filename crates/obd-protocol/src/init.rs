//! ELM327 initialization handshake

use crate::channel::CommandChannel;
use crate::command;
use crate::error::ObdError;
use crate::protocol::ObdProtocol;
use crate::transport::Transport;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default pause between handshake commands
pub const DEFAULT_INIT_DELAY_MS: u64 = 100;

/// Puts a freshly connected adapter into a known state
#[derive(Debug, Clone)]
pub struct AdapterInitializer {
    /// Protocol selected in the last step
    protocol: ObdProtocol,
    /// Pause between commands, for adapter processing time
    delay: Duration,
    /// Per-command reply deadline
    timeout: Duration,
}

impl AdapterInitializer {
    /// Create an initializer selecting `protocol`
    pub fn new(protocol: ObdProtocol, delay: Duration, timeout: Duration) -> Self {
        Self {
            protocol,
            delay,
            timeout,
        }
    }

    /// Handshake commands, in the order they are sent
    pub fn commands(&self) -> [&'static str; 5] {
        [
            command::RESET,
            command::ECHO_OFF,
            command::LINEFEEDS_OFF,
            command::HEADERS_OFF,
            self.protocol.to_elm_command(),
        ]
    }

    /// Run the handshake; replies are read and discarded
    ///
    /// The first failing command aborts the sequence. The inter-command
    /// pause is a timer await, so only the calling task waits.
    pub async fn initialize<T: Transport>(
        &self,
        channel: &CommandChannel<T>,
    ) -> Result<(), ObdError> {
        info!("Initializing OBD adapter ({:?})", self.protocol);

        for (i, command) in self.commands().into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.delay).await;
            }

            match channel.send(command, self.timeout).await {
                Ok(reply) => debug!("{} -> {:?}", command, reply.as_str()),
                Err(e) => {
                    warn!("Adapter initialization failed at {}: {}", command, e);
                    return Err(ObdError::Initialization {
                        command: command.to_string(),
                        source: Box::new(e),
                    });
                }
            }
        }

        info!("OBD adapter initialized successfully");
        Ok(())
    }
}

impl Default for AdapterInitializer {
    fn default() -> Self {
        Self::new(
            ObdProtocol::Auto,
            Duration::from_millis(DEFAULT_INIT_DELAY_MS),
            Duration::from_millis(crate::DEFAULT_TIMEOUT_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdapter;
    use tokio::time::Instant;

    async fn attached(adapter: MockAdapter) -> CommandChannel<MockAdapter> {
        let channel = CommandChannel::new(adapter);
        channel.transport().open("mock").await.unwrap();
        channel.attach();
        channel
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_order() {
        let channel = attached(MockAdapter::elm327()).await;
        AdapterInitializer::default()
            .initialize(&channel)
            .await
            .unwrap();

        assert_eq!(
            channel.transport().sent_commands(),
            vec!["ATZ", "ATE0", "ATL0", "ATH0", "ATSP0"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_commands() {
        let channel = attached(MockAdapter::elm327()).await;
        let started = Instant::now();
        AdapterInitializer::default()
            .initialize(&channel)
            .await
            .unwrap();

        // Four gaps between five commands
        assert!(started.elapsed() >= Duration::from_millis(4 * DEFAULT_INIT_DELAY_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replies_are_not_validated() {
        let channel = attached(MockAdapter::elm327().with_response("ATH0", "?")).await;
        assert!(AdapterInitializer::default().initialize(&channel).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_aborts_sequence() {
        let channel = attached(MockAdapter::elm327().ignoring("ATL0")).await;
        let err = AdapterInitializer::default()
            .initialize(&channel)
            .await
            .unwrap_err();

        match &err {
            ObdError::Initialization { command, .. } => assert_eq!(command, "ATL0"),
            other => panic!("expected Initialization, got {other:?}"),
        }
        assert!(err.is_timeout());
        assert_eq!(
            channel.transport().sent_commands(),
            vec!["ATZ", "ATE0", "ATL0"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pinned_protocol() {
        let channel = attached(MockAdapter::elm327().with_response("ATSP6", "OK")).await;
        let initializer = AdapterInitializer::new(
            ObdProtocol::Iso15765_4Can11bit500,
            Duration::from_millis(10),
            Duration::from_millis(200),
        );
        initializer.initialize(&channel).await.unwrap();
        assert_eq!(channel.transport().sent_commands().last().unwrap(), "ATSP6");
    }
}
