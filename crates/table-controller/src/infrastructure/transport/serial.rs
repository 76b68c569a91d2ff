//! RS232 serial transport (roulette wheel).
//!
//! The wheel writes ASCII frames terminated by `\n`.  A single `read()` on
//! the port may return half a frame or several frames at once, so every chunk
//! goes through a [`FrameAssembler`] and `read` hands out one complete frame
//! at a time.
//!
//! Partial frames are bounded twice: a byte cap (`max_frame_len`) and an age
//! limit (`frame_stale_ms`).  Either way the dropped bytes come back as
//! [`Payload::Discarded`] so they are reported instead of silently lost.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use table_core::protocol::{FrameAssembler, FrameError};

use super::{Payload, Transport, TransportError};

/// Hardware/software flow control setting for the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(value: FlowControl) -> Self {
        match value {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

/// `[transport]` settings for `kind = "serial"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout.  The wheel heartbeats faster than this when healthy.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub flow_control: FlowControl,
    /// Bytes written before waiting for the handshake frame.  Empty means
    /// wait for the next unsolicited frame.
    #[serde(default = "default_probe")]
    pub handshake_probe: String,
}

fn default_baud_rate() -> u32 {
    9600
}
fn default_timeout_ms() -> u64 {
    2_000
}
fn default_probe() -> String {
    String::from_utf8_lossy(table_core::protocol::roulette::STATUS_PROBE).into_owned()
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            flow_control: FlowControl::default(),
            handshake_probe: default_probe(),
        }
    }
}

/// Serial port transport with frame reassembly.
pub struct SerialTransport {
    config: SerialConfig,
    port: Option<SerialStream>,
    assembler: FrameAssembler,
    ready: VecDeque<Result<Vec<u8>, FrameError>>,
}

impl SerialTransport {
    pub fn new(config: SerialConfig, max_frame_len: usize, frame_stale: Duration) -> Self {
        Self {
            config,
            port: None,
            assembler: FrameAssembler::lines(max_frame_len, frame_stale),
            ready: VecDeque::new(),
        }
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }
}

fn pop_ready(ready: &mut VecDeque<Result<Vec<u8>, FrameError>>) -> Option<Payload> {
    ready.pop_front().map(|item| match item {
        Ok(frame) => Payload::Frame(frame),
        Err(err) => Payload::Discarded(err),
    })
}

/// Reads chunks from `port` until the assembler yields a frame or the
/// deadline passes.  Extra frames from the same chunk stay in `ready`.
async fn read_framed<R: AsyncRead + Unpin>(
    port: &mut R,
    assembler: &mut FrameAssembler,
    ready: &mut VecDeque<Result<Vec<u8>, FrameError>>,
    read_timeout: Duration,
) -> Result<Payload, TransportError> {
    let deadline = Instant::now() + read_timeout;
    let mut chunk = [0u8; 256];
    loop {
        match tokio::time::timeout_at(deadline, port.read(&mut chunk)).await {
            Ok(Ok(0)) => return Err(TransportError::Closed("end of stream".to_string())),
            Ok(Ok(n)) => {
                ready.extend(assembler.push(&chunk[..n], Instant::now().into_std()));
                if let Some(payload) = pop_ready(ready) {
                    return Ok(payload);
                }
            }
            // The driver-level timeout fired before ours.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Ok(Err(e)) => return Err(TransportError::Closed(e.to_string())),
            Err(_) => {
                if let Some(stale) = assembler.expire(Instant::now().into_std()) {
                    return Ok(Payload::Discarded(stale));
                }
                return Err(TransportError::Timeout {
                    ms: read_timeout.as_millis() as u64,
                });
            }
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn name(&self) -> &'static str {
        "serial"
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        let port = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .timeout(self.read_timeout())
            .flow_control(self.config.flow_control.into())
            .open_native_async()
            .map_err(|e| TransportError::Unavailable(format!("{}: {e}", self.config.port)))?;

        info!(
            port = %self.config.port,
            baud = self.config.baud_rate,
            "serial port opened"
        );
        self.port = Some(port);
        self.assembler.clear();
        self.ready.clear();
        Ok(())
    }

    async fn handshake(&mut self) -> Result<(), TransportError> {
        if !self.config.handshake_probe.is_empty() {
            let probe = self.config.handshake_probe.clone().into_bytes();
            self.write(&probe).await?;
        }
        // Any complete frame proves the wheel is talking.
        loop {
            match self.read().await? {
                Payload::Frame(frame) => {
                    debug!(frame = %String::from_utf8_lossy(&frame), "serial handshake frame");
                    return Ok(());
                }
                other => debug!(kind = other.kind(), "ignored during serial handshake"),
            }
        }
    }

    async fn read(&mut self) -> Result<Payload, TransportError> {
        if let Some(payload) = pop_ready(&mut self.ready) {
            return Ok(payload);
        }
        let read_timeout = self.read_timeout();
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| TransportError::Closed("port not open".to_string()))?;
        read_framed(port, &mut self.assembler, &mut self.ready, read_timeout).await
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| TransportError::Write("port not open".to_string()))?;
        let write_timeout = Duration::from_millis(self.config.timeout_ms);
        match timeout(write_timeout, port.write_all(bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Write(e.to_string())),
            Err(_) => Err(TransportError::Write("write timed out".to_string())),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut port) = self.port.take() {
            debug!(port = %self.config.port, "closing serial port");
            port.shutdown()
                .await
                .map_err(|e| TransportError::Closed(e.to_string()))?;
        }
        self.assembler.clear();
        self.ready.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_defaults() {
        // Arrange / Act
        let cfg: SerialConfig = toml::from_str(r#"port = "/dev/ttyS1""#).unwrap();

        // Assert
        assert_eq!(cfg.port, "/dev/ttyS1");
        assert_eq!(cfg.baud_rate, 9600);
        assert_eq!(cfg.timeout_ms, 2_000);
        assert_eq!(cfg.flow_control, FlowControl::None);
        assert_eq!(cfg.handshake_probe, "*?\r\n");
    }

    #[test]
    fn test_flow_control_parses_lowercase() {
        let cfg: SerialConfig =
            toml::from_str("port = \"COM3\"\nflow_control = \"hardware\"").unwrap();
        assert_eq!(cfg.flow_control, FlowControl::Hardware);
    }

    #[tokio::test]
    async fn test_read_before_open_reports_closed() {
        // Arrange
        let mut transport =
            SerialTransport::new(SerialConfig::default(), 512, Duration::from_secs(2));

        // Act
        let result = transport.read().await;

        // Assert
        assert!(matches!(result, Err(TransportError::Closed(_))));
    }

    #[tokio::test]
    async fn test_open_missing_port_is_unavailable() {
        let mut transport = SerialTransport::new(
            SerialConfig {
                port: "/dev/this-port-does-not-exist".to_string(),
                ..SerialConfig::default()
            },
            512,
            Duration::from_secs(2),
        );
        assert!(matches!(
            transport.open().await,
            Err(TransportError::Unavailable(_))
        ));
    }

    // ── Framed reads over a scripted byte stream ─────────────────────────────

    fn framing() -> (FrameAssembler, VecDeque<Result<Vec<u8>, FrameError>>) {
        (
            FrameAssembler::lines(8, Duration::from_secs(2)),
            VecDeque::new(),
        )
    }

    #[tokio::test]
    async fn test_frame_split_across_reads_is_reassembled() {
        // Arrange: one frame arrives in two chunks, the second chunk also
        // carries the next frame.
        let mut port = tokio_test::io::Builder::new()
            .read(b"*S;")
            .read(b"7\r\n*H;OK\n")
            .build();
        let (mut assembler, mut ready) = framing();

        // Act
        let first = read_framed(&mut port, &mut assembler, &mut ready, Duration::from_secs(1))
            .await
            .unwrap();
        let second = pop_ready(&mut ready);

        // Assert
        assert_eq!(first, Payload::Frame(b"*S;7".to_vec()));
        assert_eq!(second, Some(Payload::Frame(b"*H;OK".to_vec())));
    }

    #[tokio::test]
    async fn test_overlong_partial_frame_is_discarded() {
        let mut port = tokio_test::io::Builder::new().read(b"0123456789").build();
        let (mut assembler, mut ready) = framing();

        let payload = read_framed(&mut port, &mut assembler, &mut ready, Duration::from_secs(1))
            .await
            .unwrap();

        match payload {
            Payload::Discarded(FrameError::Overflow { max, discarded }) => {
                assert_eq!(max, 8);
                assert_eq!(discarded, b"012345678".to_vec());
            }
            other => panic!("expected an overflow, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_end_of_stream_mid_frame_reports_closed() {
        let mut port = tokio_test::io::Builder::new().read(b"*R;7;1").build();
        let (mut assembler, mut ready) = framing();

        let result =
            read_framed(&mut port, &mut assembler, &mut ready, Duration::from_secs(1)).await;

        assert!(matches!(result, Err(TransportError::Closed(_))));
    }

    #[tokio::test]
    async fn test_io_error_reports_closed() {
        // Arrange
        let mut port = tokio_test::io::Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "adapter unplugged",
            ))
            .build();
        let (mut assembler, mut ready) = framing();

        // Act
        let result =
            read_framed(&mut port, &mut assembler, &mut ready, Duration::from_secs(1)).await;

        // Assert
        match result {
            Err(TransportError::Closed(reason)) => assert!(reason.contains("adapter unplugged")),
            other => panic!("expected a closed port, got {other:?}"),
        }
    }
}
