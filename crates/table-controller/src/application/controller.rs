//! Table controllers.
//!
//! A controller owns one transport and one decoder.  Once started it runs a
//! read loop on its own task and pushes [`ControllerEvent`]s into the
//! channel it was started with:
//!
//! ```text
//!  Transport ──► Link (reconnects) ──► ProtocolDecoder ──► mpsc ──► game loop
//! ```
//!
//! Every hardware event gets the next number from the controller's
//! [`SequenceCounter`].  The counter survives restarts, so sequence numbers
//! stay strictly increasing for the lifetime of the process.
//!
//! # Capability set
//!
//! Every game variant offers the same operations through [`Controller`]:
//!
//! - `start(events)` opens the device and spawns the read loop.  An open
//!   failure is a [`ControllerError::Start`] and nothing is spawned.
//! - `stop()` asks the read loop to finish.  Idempotent, never blocks.
//! - `cleanup()` stops, waits for the read loop and closes the device.
//!   Safe to call more than once.
//!
//! [`TableController`] is the closed set of game variants built from the
//! configuration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use table_core::protocol::Decoded;
use table_core::{
    now_us, ExceptionEvent, GameType, HardwareEvent, HardwareEventKind, SequenceCounter,
};

use crate::application::decoders::{
    ProtocolDecoder, RouletteDecoder, ScannerDecoder, ShakerDecoder,
};
use crate::infrastructure::storage::config::PolicyConfig;
use crate::infrastructure::transport::backoff::BackoffPolicy;
use crate::infrastructure::transport::link::{Link, LinkEvent};
use crate::infrastructure::transport::{Payload, Transport, TransportError};

// ── Events and errors ─────────────────────────────────────────────────────────

/// What a running controller reports to the game loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    Hardware(HardwareEvent),
    /// A device-level notice (wheel warning) that is not a hardware event.
    Exception(ExceptionEvent),
    /// The read loop ended on its own; the device is unreachable.
    Exited { reason: String },
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("controller failed to start: {0}")]
    Start(#[source] TransportError),

    #[error("controller cleanup failed: {0}")]
    Cleanup(String),

    #[error("controller is already running")]
    AlreadyStarted,
}

/// The operations every game variant supports.
#[async_trait]
pub trait Controller: Send {
    fn game(&self) -> GameType;

    async fn start(&mut self, events: mpsc::Sender<ControllerEvent>) -> Result<(), ControllerError>;

    fn stop(&self);

    async fn cleanup(&mut self) -> Result<(), ControllerError>;
}

/// Reconnection and decoding knobs shared by all variants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    pub backoff: BackoffPolicy,
    /// 0 retries forever.
    pub max_reconnect_attempts: u32,
    pub scan_debounce: Duration,
}

impl ControllerSettings {
    pub fn from_policy(policy: &PolicyConfig) -> Self {
        Self {
            backoff: policy.backoff(),
            max_reconnect_attempts: policy.max_reconnect_attempts,
            scan_debounce: policy.scan_debounce(),
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            max_reconnect_attempts: 0,
            scan_debounce: Duration::from_millis(300),
        }
    }
}

// ── Hardware controller ───────────────────────────────────────────────────────

type Parts<D> = (Box<dyn Transport>, D);

/// A controller for any device: a transport plus a game decoder.
pub struct HardwareController<D> {
    table_id: String,
    game: GameType,
    settings: ControllerSettings,
    sequence: Arc<SequenceCounter>,
    stop_tx: watch::Sender<bool>,
    /// The transport and decoder while no read loop owns them.
    idle: Option<Parts<D>>,
    task: Option<JoinHandle<Parts<D>>>,
    needs_close: bool,
}

impl<D: ProtocolDecoder> HardwareController<D> {
    pub fn new(
        table_id: impl Into<String>,
        transport: Box<dyn Transport>,
        decoder: D,
        settings: ControllerSettings,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            table_id: table_id.into(),
            game: decoder.game(),
            settings,
            sequence: Arc::new(SequenceCounter::starting_at(1)),
            stop_tx,
            idle: Some((transport, decoder)),
            task: None,
            needs_close: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    async fn start_loop(
        &mut self,
        events: mpsc::Sender<ControllerEvent>,
    ) -> Result<(), ControllerError> {
        if self.task.is_some() {
            return Err(ControllerError::AlreadyStarted);
        }
        let Some((mut transport, decoder)) = self.idle.take() else {
            return Err(ControllerError::AlreadyStarted);
        };

        self.stop_tx.send_replace(false);
        if let Err(e) = transport.open().await {
            warn!(table_id = %self.table_id, transport = transport.name(), error = %e, "device open failed");
            self.idle = Some((transport, decoder));
            return Err(ControllerError::Start(e));
        }
        self.needs_close = true;
        info!(
            table_id = %self.table_id,
            game = self.game.as_str(),
            transport = transport.name(),
            "controller started"
        );

        let link = Link::new(
            transport,
            self.settings.backoff,
            self.settings.max_reconnect_attempts,
            self.stop_tx.subscribe(),
        );
        let context = ReadLoop {
            table_id: self.table_id.clone(),
            sequence: Arc::clone(&self.sequence),
            events,
            stop: self.stop_tx.subscribe(),
        };
        self.task = Some(tokio::spawn(context.run(link, decoder)));
        Ok(())
    }

    fn request_stop(&self) {
        if !self.stop_tx.send_replace(true) {
            debug!(table_id = %self.table_id, "controller stop requested");
        }
    }

    async fn cleanup_loop(&mut self) -> Result<(), ControllerError> {
        self.request_stop();

        if let Some(task) = self.task.take() {
            let parts = task
                .await
                .map_err(|e| ControllerError::Cleanup(format!("read loop failed: {e}")))?;
            self.idle = Some(parts);
        }

        if !std::mem::take(&mut self.needs_close) {
            return Ok(());
        }
        if let Some((transport, decoder)) = self.idle.as_mut() {
            decoder.reset();
            transport
                .close()
                .await
                .map_err(|e| ControllerError::Cleanup(e.to_string()))?;
            info!(
                table_id = %self.table_id,
                transport = transport.name(),
                last_seq = ?self.sequence.last_issued(),
                "device closed"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl<D: ProtocolDecoder> Controller for HardwareController<D> {
    fn game(&self) -> GameType {
        self.game
    }

    async fn start(&mut self, events: mpsc::Sender<ControllerEvent>) -> Result<(), ControllerError> {
        self.start_loop(events).await
    }

    fn stop(&self) {
        self.request_stop();
    }

    async fn cleanup(&mut self) -> Result<(), ControllerError> {
        self.cleanup_loop().await
    }
}

// ── Read loop ─────────────────────────────────────────────────────────────────

struct ReadLoop {
    table_id: String,
    sequence: Arc<SequenceCounter>,
    events: mpsc::Sender<ControllerEvent>,
    stop: watch::Receiver<bool>,
}

impl ReadLoop {
    async fn run<D: ProtocolDecoder>(
        mut self,
        mut link: Link<Box<dyn Transport>>,
        mut decoder: D,
    ) -> Parts<D> {
        loop {
            if *self.stop.borrow() {
                break;
            }

            let kind = match link.next().await {
                LinkEvent::Payload(Payload::Discarded(err)) => HardwareEventKind::MalformedInput {
                    reason: err.to_string(),
                    raw: err.discarded().to_vec(),
                },
                LinkEvent::Payload(payload) => {
                    let decoding = decoder.decode(payload, Instant::now());
                    if let Some(notice) = decoding.notice {
                        let event = ExceptionEvent::new(
                            notice.code,
                            notice.severity,
                            self.table_id.clone(),
                            notice.message,
                            now_us(),
                        );
                        if !self.send(ControllerEvent::Exception(event)).await {
                            break;
                        }
                    }
                    match decoding.decoded {
                        Decoded::Observation(observation) => {
                            HardwareEventKind::DecodedResult { observation }
                        }
                        Decoded::Raw => HardwareEventKind::RawFrame {
                            bytes: decoding.raw,
                        },
                        Decoded::Malformed(e) => HardwareEventKind::MalformedInput {
                            reason: e.to_string(),
                            raw: decoding.raw,
                        },
                    }
                }
                LinkEvent::Restored { attempts } => HardwareEventKind::TransportRestored { attempts },
                LinkEvent::Lost {
                    reason,
                    consecutive,
                } => {
                    decoder.reset();
                    HardwareEventKind::TransportLost {
                        reason,
                        consecutive,
                    }
                }
                LinkEvent::Idle => continue,
                LinkEvent::GaveUp { attempts } => {
                    let reason = format!("device unreachable after {attempts} reconnect attempts");
                    warn!(table_id = %self.table_id, %reason, "read loop exiting");
                    self.send(ControllerEvent::Exited { reason }).await;
                    break;
                }
                LinkEvent::Stopped => break,
            };

            let event = HardwareEvent::new(self.sequence.next(), now_us(), kind);
            if !self.send(ControllerEvent::Hardware(event)).await {
                break;
            }
        }

        debug!(table_id = %self.table_id, "read loop finished");
        (link.into_transport(), decoder)
    }

    /// Returns `false` when the game loop is gone or a stop was requested.
    /// A full channel never blocks a stop: the game loop may be waiting for
    /// this task to finish.
    async fn send(&mut self, event: ControllerEvent) -> bool {
        tokio::select! {
            sent = self.events.send(event) => sent.is_ok(),
            _ = self.stop.wait_for(|stop| *stop) => false,
        }
    }
}

// ── Game variants ─────────────────────────────────────────────────────────────

/// The controller for one configured table.
pub enum TableController {
    Roulette(HardwareController<RouletteDecoder>),
    SicBo(HardwareController<ShakerDecoder>),
    Baccarat(HardwareController<ScannerDecoder>),
}

impl TableController {
    /// Pairs `transport` with the decoder for `game`.
    pub fn new(
        game: GameType,
        table_id: impl Into<String>,
        transport: Box<dyn Transport>,
        settings: ControllerSettings,
    ) -> Self {
        let table_id = table_id.into();
        match game {
            GameType::Roulette => TableController::Roulette(HardwareController::new(
                table_id,
                transport,
                RouletteDecoder,
                settings,
            )),
            GameType::SicBo => TableController::SicBo(HardwareController::new(
                table_id,
                transport,
                ShakerDecoder,
                settings,
            )),
            GameType::Baccarat => TableController::Baccarat(HardwareController::new(
                table_id,
                transport,
                ScannerDecoder::new(settings.scan_debounce),
                settings,
            )),
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            TableController::Roulette(c) => c.is_running(),
            TableController::SicBo(c) => c.is_running(),
            TableController::Baccarat(c) => c.is_running(),
        }
    }
}

#[async_trait]
impl Controller for TableController {
    fn game(&self) -> GameType {
        match self {
            TableController::Roulette(_) => GameType::Roulette,
            TableController::SicBo(_) => GameType::SicBo,
            TableController::Baccarat(_) => GameType::Baccarat,
        }
    }

    async fn start(&mut self, events: mpsc::Sender<ControllerEvent>) -> Result<(), ControllerError> {
        match self {
            TableController::Roulette(c) => c.start(events).await,
            TableController::SicBo(c) => c.start(events).await,
            TableController::Baccarat(c) => c.start(events).await,
        }
    }

    fn stop(&self) {
        match self {
            TableController::Roulette(c) => c.stop(),
            TableController::SicBo(c) => c.stop(),
            TableController::Baccarat(c) => c.stop(),
        }
    }

    async fn cleanup(&mut self) -> Result<(), ControllerError> {
        match self {
            TableController::Roulette(c) => c.cleanup().await,
            TableController::SicBo(c) => c.cleanup().await,
            TableController::Baccarat(c) => c.cleanup().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::mock::{MockDevice, MockTransport};
    use table_core::domain::event::RouletteObservation;
    use table_core::Observation;

    fn roulette() -> (TableController, MockDevice) {
        let (transport, device) = MockTransport::new();
        let controller = TableController::new(
            GameType::Roulette,
            "RL-01",
            Box::new(transport),
            ControllerSettings {
                backoff: BackoffPolicy {
                    base_ms: 100,
                    cap_ms: 1_000,
                    jitter: 0.0,
                },
                max_reconnect_attempts: 2,
                scan_debounce: Duration::from_millis(300),
            },
        );
        (controller, device)
    }

    async fn hardware(rx: &mut mpsc::Receiver<ControllerEvent>) -> HardwareEvent {
        loop {
            match rx.recv().await {
                Some(ControllerEvent::Hardware(event)) => return event,
                Some(_) => continue,
                None => panic!("controller channel closed"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_reports_restored_then_decoded_frames_in_sequence() {
        // Arrange
        let (mut controller, device) = roulette();
        device.push_frame(b"*S;7");
        device.push_frame(b"*R;7;17;H");
        let (tx, mut rx) = mpsc::channel(16);

        // Act
        controller.start(tx).await.unwrap();
        let restored = hardware(&mut rx).await;
        let spin = hardware(&mut rx).await;
        let landed = hardware(&mut rx).await;

        // Assert
        assert_eq!(restored.kind, HardwareEventKind::TransportRestored { attempts: 0 });
        assert_eq!(
            landed.kind,
            HardwareEventKind::DecodedResult {
                observation: Observation::Roulette(RouletteObservation::BallLanded {
                    round: 7,
                    pocket: 17
                })
            }
        );
        assert!(restored.seq < spin.seq && spin.seq < landed.seq);
        controller.cleanup().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_is_start_error_and_start_can_be_retried() {
        // Arrange
        let (mut controller, device) = roulette();
        device.fail_next_open(TransportError::Unavailable("no such port".into()));
        let (tx, _rx) = mpsc::channel(16);

        // Act
        let first = controller.start(tx.clone()).await;
        let second = controller.start(tx).await;

        // Assert
        assert!(matches!(first, Err(ControllerError::Start(_))));
        assert!(second.is_ok());
        assert_eq!(device.opens(), 2);
        controller.cleanup().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_while_running_is_rejected() {
        let (mut controller, _device) = roulette();
        let (tx, _rx) = mpsc::channel(16);
        controller.start(tx.clone()).await.unwrap();

        let again = controller.start(tx).await;

        assert!(matches!(again, Err(ControllerError::AlreadyStarted)));
        controller.cleanup().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_is_idempotent_and_closes_once() {
        // Arrange
        let (mut controller, device) = roulette();
        let (tx, _rx) = mpsc::channel(16);
        controller.start(tx).await.unwrap();

        // Act
        controller.stop();
        controller.stop();
        let first = controller.cleanup().await;
        let second = controller.cleanup().await;

        // Assert
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(device.closes(), 1);
        assert!(!controller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wheel_warning_is_forwarded_as_exception() {
        // Arrange
        let (mut controller, device) = roulette();
        device.push_frame(b"*W;RS;reverse spin");
        let (tx, mut rx) = mpsc::channel(16);

        // Act
        controller.start(tx).await.unwrap();
        let mut exception = None;
        while exception.is_none() {
            if let Some(ControllerEvent::Exception(e)) = rx.recv().await {
                exception = Some(e);
            }
        }

        // Assert
        let exception = exception.unwrap();
        assert_eq!(exception.code, table_core::ExceptionCode::WheelWarning);
        assert_eq!(exception.table_id, "RL-01");
        controller.cleanup().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_reconnects_exit_the_read_loop() {
        // Arrange: the device vanishes and every reopen fails.
        let (mut controller, device) = roulette();
        device.push_read(Err(TransportError::Closed("unplugged".into())));
        for _ in 0..2 {
            device.fail_next_open(TransportError::Unavailable("gone".into()));
        }
        let (tx, mut rx) = mpsc::channel(16);

        // Act
        controller.start(tx).await.unwrap();
        let mut exited = None;
        while let Some(event) = rx.recv().await {
            if let ControllerEvent::Exited { reason } = event {
                exited = Some(reason);
                break;
            }
        }

        // Assert
        assert!(exited.unwrap().contains("2 reconnect attempts"));
        assert!(controller.cleanup().await.is_ok());
    }
}
