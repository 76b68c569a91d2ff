//! Hardware transports.
//!
//! Every table device is reached through one [`Transport`]: a serial port
//! (roulette wheel), an MQTT topic (dice shaker) or a HID device (card
//! scanner).  The trait is deliberately small so the reconnection discipline
//! in [`link::Link`] can be written once for all of them.
//!
//! # Contract
//!
//! - `open` acquires the device; failure is [`TransportError::Unavailable`].
//! - `handshake` proves the device is alive with one request/response round
//!   trip (or the nearest equivalent the device offers).
//! - `read` waits at most the configured timeout and yields exactly one
//!   [`Payload`]: a complete serial frame, one MQTT message, or one scan.
//! - `write` sends raw bytes to the device.
//! - `close` releases the device.  It is safe to call on a closed transport.
//!
//! Transports know nothing about games.  Turning a payload into a round
//! observation is the decoder's job.

pub mod backoff;
pub mod hid;
pub mod link;
pub mod mock;
pub mod mqtt;
pub mod serial;

use async_trait::async_trait;
use thiserror::Error;

use table_core::protocol::FrameError;

/// Errors reported by a transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The device could not be opened or the broker could not be reached.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// Nothing arrived within the read timeout.
    #[error("read timed out after {ms} ms")]
    Timeout { ms: u64 },

    /// The device or connection went away.
    #[error("transport closed: {0}")]
    Closed(String),

    #[error("write failed: {0}")]
    Write(String),

    /// The operation is not supported by this kind of device.
    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),
}

/// One unit of data delivered by [`Transport::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A complete delimiter-terminated frame from a byte stream, delimiter
    /// removed.
    Frame(Vec<u8>),
    /// One message from a publish/subscribe broker.
    Message { topic: String, body: Vec<u8> },
    /// One scan string from a keyboard-emulating scanner, terminator removed.
    Scan(String),
    /// Bytes the serial frame assembler threw away (overflow or staleness).
    Discarded(FrameError),
}

impl Payload {
    /// The payload bytes as seen on the wire, for malformed-input reports.
    pub fn raw(&self) -> Vec<u8> {
        match self {
            Payload::Frame(bytes) => bytes.clone(),
            Payload::Message { body, .. } => body.clone(),
            Payload::Scan(code) => code.as_bytes().to_vec(),
            Payload::Discarded(err) => err.discarded().to_vec(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Frame(_) => "frame",
            Payload::Message { .. } => "message",
            Payload::Scan(_) => "scan",
            Payload::Discarded(_) => "discarded",
        }
    }
}

/// Uniform access to one hardware device.
#[async_trait]
pub trait Transport: Send {
    /// Short name used in log messages (`"serial"`, `"mqtt"`, `"hid"`).
    fn name(&self) -> &'static str;

    async fn open(&mut self) -> Result<(), TransportError>;

    async fn handshake(&mut self) -> Result<(), TransportError>;

    async fn read(&mut self) -> Result<Payload, TransportError>;

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;

    /// Whether a read timeout means the device is gone.
    ///
    /// A wheel or shaker sends heartbeats, so silence is a loss.  A scanner
    /// is silent whenever nobody is dealing.
    fn timeout_is_loss(&self) -> bool {
        true
    }
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        (**self).open().await
    }

    async fn handshake(&mut self) -> Result<(), TransportError> {
        (**self).handshake().await
    }

    async fn read(&mut self) -> Result<Payload, TransportError> {
        (**self).read().await
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        (**self).close().await
    }

    fn timeout_is_loss(&self) -> bool {
        (**self).timeout_is_loss()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discarded_payload_exposes_dropped_bytes() {
        // Arrange
        let payload = Payload::Discarded(FrameError::Overflow {
            max: 4,
            discarded: b"*R;1".to_vec(),
        });

        // Act / Assert
        assert_eq!(payload.raw(), b"*R;1".to_vec());
        assert_eq!(payload.kind(), "discarded");
    }

    #[test]
    fn test_scan_payload_raw_is_utf8_bytes() {
        assert_eq!(Payload::Scan("9H".into()).raw(), b"9H".to_vec());
    }

    #[test]
    fn test_timeout_error_message_includes_duration() {
        assert_eq!(
            TransportError::Timeout { ms: 2000 }.to_string(),
            "read timed out after 2000 ms"
        );
    }
}
