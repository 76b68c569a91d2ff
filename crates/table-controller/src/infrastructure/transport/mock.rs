//! Scripted transport for tests.
//!
//! # Why a scripted transport?
//!
//! The real transports need a wheel on a serial port, a broker, or a scanner
//! plugged in.  [`MockTransport`] replaces the device with a script: tests
//! queue the payloads and errors the "device" should produce, then inspect
//! what the controller did with them (how often it opened, what it wrote,
//! whether it closed).
//!
//! # Usage in tests
//!
//! ```ignore
//! let (transport, device) = MockTransport::new();
//! device.push_payload(Payload::Frame(b"*S;1".to_vec()));
//! device.push_read(Err(TransportError::Closed("unplugged".into())));
//! device.fail_next_open(TransportError::Unavailable("still unplugged".into()));
//!
//! // ... run a controller over `transport` ...
//!
//! assert_eq!(device.opens(), 3);
//! ```
//!
//! When the script is empty, `read` waits for more steps and times out after
//! the idle timeout, like a silent device would.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{Payload, Transport, TransportError};

#[derive(Debug, Default)]
struct Script {
    reads: VecDeque<Result<Payload, TransportError>>,
    open_failures: VecDeque<TransportError>,
    handshake_failures: VecDeque<TransportError>,
    close_failure: Option<TransportError>,
    opens: u32,
    handshakes: u32,
    closes: u32,
    writes: Vec<Vec<u8>>,
}

/// The test's side of a [`MockTransport`].
#[derive(Clone, Default)]
pub struct MockDevice {
    script: Arc<Mutex<Script>>,
    notify: Arc<Notify>,
}

impl MockDevice {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the result of one future `read`.
    pub fn push_read(&self, result: Result<Payload, TransportError>) {
        self.script().reads.push_back(result);
        self.notify.notify_one();
    }

    pub fn push_payload(&self, payload: Payload) {
        self.push_read(Ok(payload));
    }

    /// Queues a serial frame.
    pub fn push_frame(&self, frame: &[u8]) {
        self.push_payload(Payload::Frame(frame.to_vec()));
    }

    /// Makes the next `open` fail.  Calls stack up.
    pub fn fail_next_open(&self, error: TransportError) {
        self.script().open_failures.push_back(error);
    }

    /// Makes the next `handshake` fail.  Calls stack up.
    pub fn fail_next_handshake(&self, error: TransportError) {
        self.script().handshake_failures.push_back(error);
    }

    pub fn fail_close(&self, error: TransportError) {
        self.script().close_failure = Some(error);
    }

    pub fn opens(&self) -> u32 {
        self.script().opens
    }

    pub fn handshakes(&self) -> u32 {
        self.script().handshakes
    }

    pub fn closes(&self) -> u32 {
        self.script().closes
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.script().writes.clone()
    }

    pub fn pending_reads(&self) -> usize {
        self.script().reads.len()
    }
}

/// A [`Transport`] driven by a [`MockDevice`] script.
pub struct MockTransport {
    device: MockDevice,
    idle_timeout: Duration,
    timeout_is_loss: bool,
}

impl MockTransport {
    /// Creates a transport and the device handle that scripts it.
    pub fn new() -> (Self, MockDevice) {
        let device = MockDevice::default();
        let transport = Self {
            device: device.clone(),
            idle_timeout: Duration::from_millis(100),
            timeout_is_loss: false,
        };
        (transport, device)
    }

    /// How long an empty script waits before reporting a timeout.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Makes read timeouts count as a lost device, like a serial wheel.
    pub fn losing_on_timeout(mut self) -> Self {
        self.timeout_is_loss = true;
        self
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        let mut script = self.device.script();
        script.opens += 1;
        match script.open_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn handshake(&mut self) -> Result<(), TransportError> {
        let mut script = self.device.script();
        script.handshakes += 1;
        match script.handshake_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn read(&mut self) -> Result<Payload, TransportError> {
        let deadline = tokio::time::Instant::now() + self.idle_timeout;
        loop {
            if let Some(result) = self.device.script().reads.pop_front() {
                return result;
            }
            tokio::select! {
                _ = self.device.notify.notified() => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(TransportError::Timeout {
                        ms: self.idle_timeout.as_millis() as u64,
                    });
                }
            }
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.device.script().writes.push(bytes.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut script = self.device.script();
        script.closes += 1;
        match script.close_failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn timeout_is_loss(&self) -> bool {
        self.timeout_is_loss
    }
}
