//! HID transport (baccarat card scanner).
//!
//! The shoe scanner enumerates as a USB boot keyboard.  Reading its raw HID
//! node (`/dev/hidraw*` on Linux) yields 8-byte input reports; the
//! [`BootReportDecoder`] turns key presses into characters and emits one scan
//! string per `Enter`.
//!
//! A scanner has no request/response protocol, so the handshake is the
//! successful open of the device node.  Read timeouts are normal (nobody is
//! dealing) and do not count as a lost transport.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use table_core::keymap::report::BOOT_REPORT_LEN;
use table_core::keymap::BootReportDecoder;

use super::{Payload, Transport, TransportError};

/// Longest scan string kept before the decoder gives up on it.
const MAX_SCAN_LEN: usize = 64;

/// `[transport]` settings for `kind = "hid"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HidConfig {
    pub device_path: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    1_000
}

pub struct HidTransport {
    config: HidConfig,
    device: Option<File>,
    decoder: BootReportDecoder,
    scans: VecDeque<String>,
}

impl HidTransport {
    pub fn new(config: HidConfig) -> Self {
        Self {
            config,
            device: None,
            decoder: BootReportDecoder::new(MAX_SCAN_LEN),
            scans: VecDeque::new(),
        }
    }
}

#[async_trait]
impl Transport for HidTransport {
    fn name(&self) -> &'static str {
        "hid"
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        let device = File::open(&self.config.device_path)
            .await
            .map_err(|e| TransportError::Unavailable(format!("{}: {e}", self.config.device_path)))?;
        info!(device = %self.config.device_path, "scanner opened");
        self.device = Some(device);
        self.decoder.clear();
        self.scans.clear();
        Ok(())
    }

    async fn handshake(&mut self) -> Result<(), TransportError> {
        if self.device.is_some() {
            Ok(())
        } else {
            Err(TransportError::Closed("device not open".to_string()))
        }
    }

    async fn read(&mut self) -> Result<Payload, TransportError> {
        if let Some(scan) = self.scans.pop_front() {
            return Ok(Payload::Scan(scan));
        }

        let read_timeout = Duration::from_millis(self.config.timeout_ms);
        let deadline = Instant::now() + read_timeout;
        let mut report = [0u8; BOOT_REPORT_LEN];
        loop {
            let device = self
                .device
                .as_mut()
                .ok_or_else(|| TransportError::Closed("device not open".to_string()))?;

            match timeout_at(deadline, device.read(&mut report)).await {
                Ok(Ok(0)) => return Err(TransportError::Closed("device removed".to_string())),
                Ok(Ok(n)) => {
                    self.scans.extend(self.decoder.push(&report[..n]));
                    if let Some(scan) = self.scans.pop_front() {
                        debug!(%scan, "scan read");
                        return Ok(Payload::Scan(scan));
                    }
                }
                Ok(Err(e)) => return Err(TransportError::Closed(e.to_string())),
                Err(_) => {
                    return Err(TransportError::Timeout {
                        ms: read_timeout.as_millis() as u64,
                    })
                }
            }
        }
    }

    async fn write(&mut self, _bytes: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("write"))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.device.take().is_some() {
            debug!(device = %self.config.device_path, "scanner closed");
        }
        self.decoder.clear();
        self.scans.clear();
        Ok(())
    }

    fn timeout_is_loss(&self) -> bool {
        false
    }
}
