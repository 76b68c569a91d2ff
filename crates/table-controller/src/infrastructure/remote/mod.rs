//! Remote sync client: the table's WebSocket connection to the Studio.
//!
//! # How delivery works (for beginners)
//!
//! The game loop never waits on the network.  It calls
//! [`RemoteHandle::push`], which appends the notification to the
//! [`Outbox`](outbox::Outbox) and wakes the client task.  The client task
//! owns the WebSocket and, whenever it is connected, sends every queued
//! message in push order.
//!
//! ```text
//!  game loop ──push──► Outbox ──► RemoteSyncClient ──WebSocket──► Studio
//!      ▲                  ▲                │
//!      │                  └──── ack ◄──────┤
//!      └──── RemoteCommand (mpsc) ◄────────┘
//! ```
//!
//! - Messages stay in the outbox until the Studio acknowledges them with an
//!   `ack` carrying the highest delivered `seq`.
//! - On every (re)connect the outbox is rewound, so anything unacknowledged
//!   is sent again with `replay = true`.  The Studio deduplicates on
//!   `(table_id, seq)`.
//! - On every (re)connect the client also asks the game loop for a fresh
//!   status snapshot, so the Studio never has to trust stale state.
//! - Inbound `command` messages are forwarded to the game loop over the
//!   command channel given to [`RemoteSyncClient::new`].
//! - A session with no inbound traffic for `ping_timeout_secs` is torn down
//!   and rebuilt, with a fresh [`RemoteSession`].

pub mod outbox;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use table_core::protocol::studio::{MessageKind, Outbound, RemoteCommand, WireMessage};
use table_core::{now_us, ExceptionCode, ExceptionEvent, Severity};

use crate::infrastructure::storage::config::RemoteConfig;
use crate::infrastructure::transport::backoff::{Backoff, BackoffPolicy};

use self::outbox::Outbox;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsStream, WsMessage>;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connecting failed or the session dropped.  Retried with backoff.
    #[error("studio unavailable: {0}")]
    Unavailable(String),

    /// The request or a message could not be built.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// One live WebSocket session.  Replaced on every reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSession {
    pub connection_id: Uuid,
    pub last_acked_seq: u64,
    /// Failed connection attempts before this session came up.
    pub reconnect_attempts: u32,
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct Shared {
    table_id: String,
    outbox: Mutex<Outbox>,
    wake: Notify,
    connected: AtomicBool,
}

impl Shared {
    fn outbox(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The game loop's side of the client.  Cheap to clone.
#[derive(Clone)]
pub struct RemoteHandle {
    shared: Arc<Shared>,
}

impl RemoteHandle {
    /// A handle with no client behind it.  Messages are queued and never
    /// delivered; useful when the game loop runs without a Studio.
    pub fn detached(table_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                table_id: table_id.into(),
                outbox: Mutex::new(Outbox::new(capacity)),
                wake: Notify::new(),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Queues a message for the Studio and returns its `seq`.  Never blocks
    /// on the network.
    pub fn push(&self, outbound: Outbound) -> u64 {
        let seq = self.shared.outbox().push(&self.shared.table_id, outbound);
        self.shared.wake.notify_one();
        seq
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    /// Messages waiting for an acknowledgement.
    pub fn pending(&self) -> usize {
        self.shared.outbox().len()
    }

    pub fn dropped(&self) -> u64 {
        self.shared.outbox().dropped()
    }

    /// Copies of the queued messages, oldest first.
    pub fn queued(&self) -> Vec<WireMessage> {
        self.shared.outbox().queued()
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct RemoteSyncClient {
    config: RemoteConfig,
    device_name: String,
    backoff: BackoffPolicy,
    shared: Arc<Shared>,
    commands: mpsc::Sender<RemoteCommand>,
}

impl RemoteSyncClient {
    /// Creates the client and the handle the game loop pushes through.
    /// Commands received from the Studio are sent on `commands`.
    pub fn new(
        config: RemoteConfig,
        table_id: impl Into<String>,
        device_name: impl Into<String>,
        backoff: BackoffPolicy,
        commands: mpsc::Sender<RemoteCommand>,
    ) -> (Self, RemoteHandle) {
        let handle = RemoteHandle::detached(table_id, config.outbox_capacity);
        let client = Self {
            config,
            device_name: device_name.into(),
            backoff,
            shared: Arc::clone(&handle.shared),
            commands,
        };
        (client, handle)
    }

    /// Opens one WebSocket session, identifying the table in the upgrade
    /// request headers.
    ///
    /// # Errors
    ///
    /// [`RemoteError::Unavailable`] when the server cannot be reached in
    /// `connect_timeout_secs` or refuses the upgrade.
    pub async fn connect(&self, attempts: u32) -> Result<(WsStream, RemoteSession), RemoteError> {
        let mut request = self
            .config
            .server_url
            .as_str()
            .into_client_request()
            .map_err(|e| RemoteError::Protocol(e.to_string()))?;

        let headers = request.headers_mut();
        if !self.config.token.is_empty() {
            headers.insert(
                AUTHORIZATION,
                header_value(&format!("Bearer {}", self.config.token))?,
            );
        }
        headers.insert(
            HeaderName::from_static("x-device-name"),
            header_value(&self.device_name)?,
        );
        headers.insert(
            HeaderName::from_static("x-table-id"),
            header_value(&self.shared.table_id)?,
        );

        let (stream, response) = timeout(self.config.connect_timeout(), connect_async(request))
            .await
            .map_err(|_| {
                RemoteError::Unavailable(format!(
                    "connect timed out after {:?}",
                    self.config.connect_timeout()
                ))
            })?
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        debug!(status = %response.status(), "websocket upgrade accepted");

        let session = RemoteSession {
            connection_id: Uuid::new_v4(),
            last_acked_seq: 0,
            reconnect_attempts: attempts,
        };
        Ok((stream, session))
    }

    /// Connects, delivers and reconnects until `shutdown` turns `true`.
    /// On shutdown the current session flushes what it can and closes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Backoff::new(self.backoff);
        let mut failures: u32 = 0;
        let mut down_since: Option<Instant> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.connect(failures).await {
                Ok((stream, mut session)) => {
                    info!(
                        connection_id = %session.connection_id,
                        url = %self.config.server_url,
                        attempts = failures,
                        "studio session established"
                    );
                    if let Some(since) = down_since.take() {
                        self.report_outage(failures, since.elapsed());
                    }
                    failures = 0;
                    backoff.reset();

                    self.shared.outbox().rewind();
                    self.shared.connected.store(true, Ordering::Relaxed);
                    self.forward(RemoteCommand::RequestStatus);

                    let outcome = self.run_session(stream, &mut session, &mut shutdown).await;
                    self.shared.connected.store(false, Ordering::Relaxed);
                    match outcome {
                        Ok(()) => break,
                        Err(e) => {
                            warn!(connection_id = %session.connection_id, error = %e, "studio session ended");
                            down_since = Some(Instant::now());
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(attempt = failures, error = %e, "studio unreachable");
                    down_since.get_or_insert_with(Instant::now);
                }
            }

            let delay = backoff.next_delay();
            debug!(?delay, "waiting before studio reconnect");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let pending = self.shared.outbox().len();
        if pending > 0 {
            warn!(pending, "remote sync stopped with undelivered messages");
        }
        info!("remote sync client stopped");
    }

    async fn run_session(
        &self,
        stream: WsStream,
        session: &mut RemoteSession,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), RemoteError> {
        let (mut sink, mut inbound) = stream.split();
        let ping_timeout = self.config.ping_timeout();
        let mut ping = interval(self.config.ping_interval());
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping.tick().await;
        let mut last_inbound = Instant::now();

        loop {
            self.flush(&mut sink).await?;

            tokio::select! {
                _ = self.shared.wake.notified() => {}

                frame = inbound.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        last_inbound = Instant::now();
                        self.on_text(&text, session);
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        return Err(RemoteError::Unavailable(format!("closed by studio: {frame:?}")));
                    }
                    Some(Ok(_)) => last_inbound = Instant::now(),
                    Some(Err(e)) => return Err(RemoteError::Unavailable(e.to_string())),
                    None => return Err(RemoteError::Unavailable("stream ended".to_string())),
                },

                _ = ping.tick() => {
                    let silent = last_inbound.elapsed();
                    if silent >= ping_timeout {
                        return Err(RemoteError::Unavailable(format!(
                            "no traffic from studio for {}s",
                            silent.as_secs()
                        )));
                    }
                    sink.send(WsMessage::Ping(Vec::new()))
                        .await
                        .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
                }

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.flush(&mut sink).await?;
                        if let Err(e) = sink.send(WsMessage::Close(None)).await {
                            debug!(error = %e, "close frame not sent");
                        }
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Sends everything not yet sent in this session.
    async fn flush(&self, sink: &mut WsSink) -> Result<(), RemoteError> {
        loop {
            let next = self.shared.outbox().next_unsent();
            let Some(message) = next else {
                return Ok(());
            };
            let text = message
                .to_json()
                .map_err(|e| RemoteError::Protocol(e.to_string()))?;
            sink.send(WsMessage::Text(text))
                .await
                .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        }
    }

    fn on_text(&self, text: &str, session: &mut RemoteSession) {
        let message = match WireMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "invalid message from studio");
                return;
            }
        };

        match message.kind {
            MessageKind::Ack => {
                session.last_acked_seq = session.last_acked_seq.max(message.seq);
                let trimmed = self.shared.outbox().ack(message.seq);
                debug!(seq = message.seq, trimmed, "studio ack");
            }
            MessageKind::Command => match message.command() {
                Ok(command) => {
                    info!(?command, "studio command received");
                    self.forward(command);
                }
                Err(e) => warn!(error = %e, "unreadable studio command"),
            },
            other => debug!(kind = ?other, "ignoring inbound message"),
        }
    }

    /// Hands a command to the game loop without waiting.  The session loop
    /// keeps flushing and answering pings while the game loop is busy, so a
    /// full channel drops the command instead.
    fn forward(&self, command: RemoteCommand) {
        match self.commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                warn!(?command, "game loop busy; studio command dropped")
            }
            Err(TrySendError::Closed(command)) => {
                debug!(?command, "game loop gone; studio command dropped")
            }
        }
    }

    /// Reports a finished outage as a REMOTE_UNAVAILABLE warning, delivered
    /// through the outbox like any other exception.
    fn report_outage(&self, failures: u32, down_for: Duration) {
        let event = ExceptionEvent::new(
            ExceptionCode::RemoteUnavailable,
            Severity::Warning,
            self.shared.table_id.clone(),
            format!(
                "studio unreachable for {}s ({failures} failed attempts); buffered messages replayed",
                down_for.as_secs()
            ),
            now_us(),
        );
        let seq = self.shared.outbox().push(&self.shared.table_id, Outbound::exception(&event));
        debug!(seq, "outage reported");
    }
}

fn header_value(value: &str) -> Result<HeaderValue, RemoteError> {
    HeaderValue::from_str(value).map_err(|e| RemoteError::Protocol(format!("header {value:?}: {e}")))
}
