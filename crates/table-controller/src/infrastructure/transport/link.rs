//! Reconnecting wrapper around a [`Transport`].
//!
//! A [`Link`] turns the raw transport contract into a stream of
//! [`LinkEvent`]s that the controller forwards as hardware events:
//!
//! ```text
//!            open ok            handshake ok
//! Reconnecting ──────► Handshake ──────────► Up ──► Payload, Payload, ...
//!      ▲                   │                  │
//!      │   handshake fails │   closed/timeout │
//!      └───────────────────┴──────────────────┘
//!                       (emit Lost)
//! ```
//!
//! - A loss (closed, or a timeout on a transport where silence is a loss) is
//!   reported immediately as [`LinkEvent::Lost`], then the link sleeps for the
//!   next backoff delay and reopens.
//! - Each failed reopen or handshake is reported as another `Lost` with the
//!   consecutive-loss counter increased, so the state machine can apply its
//!   budget.
//! - [`LinkEvent::Restored`] is only emitted after a successful handshake.
//! - With `max_attempts > 0` the link gives up after that many reopen
//!   attempts and reports [`LinkEvent::GaveUp`].
//!
//! Reads are never cancelled.  Only the backoff sleep watches the stop signal,
//! so a stop request is noticed at the next suspension point.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::backoff::{Backoff, BackoffPolicy};
use super::{Payload, Transport, TransportError};

/// What a [`Link`] observed on its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Payload(Payload),
    /// The handshake succeeded.  `attempts` is the number of reopen attempts
    /// it took (0 for the first connection).
    Restored { attempts: u32 },
    Lost { reason: String, consecutive: u32 },
    /// A read timed out on a transport where silence is normal.
    Idle,
    /// The reopen budget is exhausted.  The link will not try again.
    GaveUp { attempts: u32 },
    /// The stop signal fired while the link was waiting to reconnect.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Handshake,
    Up,
    Reconnecting,
    GaveUp,
}

pub struct Link<T> {
    transport: T,
    backoff: Backoff,
    max_attempts: u32,
    phase: Phase,
    attempts: u32,
    consecutive: u32,
    stop: watch::Receiver<bool>,
}

impl<T: Transport> Link<T> {
    /// Wraps an already opened transport.  The first call to
    /// [`Link::next`] performs the handshake.
    pub fn new(
        transport: T,
        policy: BackoffPolicy,
        max_attempts: u32,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            transport,
            backoff: Backoff::new(policy),
            max_attempts,
            phase: Phase::Handshake,
            attempts: 0,
            consecutive: 0,
            stop,
        }
    }

    pub fn is_up(&self) -> bool {
        self.phase == Phase::Up
    }

    /// Gives the transport back, e.g. so the caller can close it.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Waits for the next observable event.
    pub async fn next(&mut self) -> LinkEvent {
        loop {
            match self.phase {
                Phase::Handshake => {
                    return match self.transport.handshake().await {
                        Ok(()) => self.restored(),
                        Err(e) => self.lose(e).await,
                    };
                }
                Phase::Up => {
                    return match self.transport.read().await {
                        Ok(payload) => LinkEvent::Payload(payload),
                        Err(TransportError::Timeout { ms }) if !self.transport.timeout_is_loss() => {
                            debug!(ms, transport = self.transport.name(), "idle read timeout");
                            LinkEvent::Idle
                        }
                        Err(e) => self.lose(e).await,
                    };
                }
                Phase::Reconnecting => {
                    if self.max_attempts > 0 && self.attempts >= self.max_attempts {
                        warn!(
                            transport = self.transport.name(),
                            attempts = self.attempts,
                            "giving up on reconnecting"
                        );
                        self.phase = Phase::GaveUp;
                        continue;
                    }

                    let delay = self.backoff.next_delay();
                    debug!(?delay, attempt = self.attempts + 1, "waiting before reopen");
                    if self.sleep_or_stop(delay).await {
                        return LinkEvent::Stopped;
                    }

                    self.attempts += 1;
                    match self.transport.open().await {
                        Ok(()) => self.phase = Phase::Handshake,
                        Err(e) => {
                            self.consecutive += 1;
                            return LinkEvent::Lost {
                                reason: e.to_string(),
                                consecutive: self.consecutive,
                            };
                        }
                    }
                }
                Phase::GaveUp => {
                    return LinkEvent::GaveUp {
                        attempts: self.attempts,
                    }
                }
            }
        }
    }

    fn restored(&mut self) -> LinkEvent {
        let attempts = std::mem::take(&mut self.attempts);
        self.consecutive = 0;
        self.backoff.reset();
        self.phase = Phase::Up;
        info!(transport = self.transport.name(), attempts, "transport up");
        LinkEvent::Restored { attempts }
    }

    async fn lose(&mut self, error: TransportError) -> LinkEvent {
        warn!(transport = self.transport.name(), error = %error, "transport lost");
        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "close after loss failed");
        }
        self.consecutive += 1;
        self.phase = Phase::Reconnecting;
        LinkEvent::Lost {
            reason: error.to_string(),
            consecutive: self.consecutive,
        }
    }

    /// Returns `true` if the stop signal fired before `delay` elapsed.
    async fn sleep_or_stop(&mut self, delay: std::time::Duration) -> bool {
        if *self.stop.borrow() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            changed = self.stop.changed() => changed.is_err() || *self.stop.borrow(),
        }
    }
}
