//! Serial port transport for ELM327 adapters
//!
//! Covers USB adapters and Bluetooth SPP links exposed as a serial device
//! (e.g. `/dev/rfcomm0`, `/dev/ttyUSB0` or `COM3`).

use crate::error::ObdError;
use crate::transport::{wait_closed, ReadPredicate, Transport};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

/// Default baud rate; most ELM327 clones ship configured for 38400
pub const DEFAULT_BAUD_RATE: u32 = 38400;

const READ_CHUNK: usize = 256;

/// [`Transport`] over a tokio-serial port
pub struct SerialTransport {
    /// Baud rate used when opening
    baud_rate: u32,
    /// Open port, if any
    port: Mutex<Option<SerialStream>>,
    /// Raised by `close` to release a pending read
    closed: watch::Sender<bool>,
}

impl SerialTransport {
    /// Create an unopened serial transport
    pub fn new(baud_rate: u32) -> Self {
        let (closed, _) = watch::channel(true);
        Self {
            baud_rate,
            port: Mutex::new(None),
            closed,
        }
    }

    /// Baud rate used when opening
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&self, device: &str) -> Result<(), ObdError> {
        info!("Opening serial port {} at {} baud", device, self.baud_rate);

        let stream = tokio_serial::new(device, self.baud_rate).open_native_async()?;
        *self.port.lock().await = Some(stream);
        self.closed.send_replace(false);
        Ok(())
    }

    async fn discard_input(&self) -> Result<(), ObdError> {
        let guard = self.port.lock().await;
        let port = guard
            .as_ref()
            .ok_or_else(|| ObdError::Transport("serial port not open".to_string()))?;

        SerialPort::clear(port, ClearBuffer::Input)?;
        Ok(())
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), ObdError> {
        let mut guard = self.port.lock().await;
        let port = guard
            .as_mut()
            .ok_or_else(|| ObdError::Transport("serial port not open".to_string()))?;

        port.write_all(bytes).await?;
        port.flush().await?;
        Ok(())
    }

    async fn read_until(
        &self,
        done: ReadPredicate<'_>,
        deadline: Instant,
    ) -> Result<Vec<u8>, ObdError> {
        let started = Instant::now();
        let mut closed = self.closed.subscribe();

        let mut guard = tokio::select! {
            guard = self.port.lock() => guard,
            _ = wait_closed(&mut closed) => {
                return Err(ObdError::Transport("serial port closed".to_string()));
            }
        };
        let port = guard
            .as_mut()
            .ok_or_else(|| ObdError::Transport("serial port not open".to_string()))?;

        let mut buffer = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            tokio::select! {
                read = port.read(&mut chunk) => match read {
                    Ok(0) => {
                        return Err(ObdError::Transport("serial port closed by peer".to_string()));
                    }
                    Ok(n) => {
                        buffer.extend_from_slice(&chunk[..n]);
                        if done(&buffer) {
                            return Ok(buffer);
                        }
                    }
                    Err(e) => return Err(e.into()),
                },
                _ = wait_closed(&mut closed) => {
                    return Err(ObdError::Transport("serial port closed".to_string()));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    debug!("Serial read timed out with {} bytes buffered", buffer.len());
                    return Err(ObdError::Timeout(started.elapsed().as_millis() as u64));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), ObdError> {
        self.closed.send_replace(true);
        if self.port.lock().await.take().is_some() {
            info!("Serial port closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_write_before_open_fails() {
        let transport = SerialTransport::default();
        let err = transport.write(b"ATZ\r").await.unwrap_err();
        assert!(matches!(err, ObdError::Transport(_)));
    }

    #[tokio::test]
    async fn test_discard_before_open_fails() {
        let transport = SerialTransport::default();
        let err = transport.discard_input().await.unwrap_err();
        assert!(matches!(err, ObdError::Transport(_)));
    }

    #[tokio::test]
    async fn test_read_before_open_fails_fast() {
        let transport = SerialTransport::default();
        let deadline = Instant::now() + Duration::from_secs(30);
        let err = transport
            .read_until(&|buf: &[u8]| buf.contains(&b'>'), deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, ObdError::Transport(_)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = SerialTransport::new(115200);
        assert_eq!(transport.baud_rate(), 115200);
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_device_is_transport_error() {
        let transport = SerialTransport::default();
        let err = transport
            .open("/dev/does-not-exist-obd")
            .await
            .unwrap_err();
        assert!(matches!(err, ObdError::Transport(_)));
    }
}
