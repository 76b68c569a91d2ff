//! Process wiring.
//!
//! The [`Supervisor`] turns a validated [`AppConfig`] into running tasks:
//!
//! ```text
//!             ┌──────────────── RemoteCommand ────────────────┐
//!             ▼                                               │
//!  TableController ──events──► GameLoop ──push──► RemoteHandle ─► RemoteSyncClient ─► Studio
//!                                  │
//!                                  └──► ExceptionDispatcher ──► AlertSink
//! ```
//!
//! Nothing here holds global state.  Every component receives the part of
//! the configuration it needs through its constructor.
//!
//! It also owns the [`RestartPolicy`] the game loop applies when a
//! controller's read loop dies.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use table_core::GameStateMachine;

use crate::application::controller::{ControllerSettings, TableController};
use crate::application::dispatcher::{ExceptionDispatcher, TracingAlertSink};
use crate::application::game_loop::{GameLoop, LoopExit};
use crate::infrastructure::remote::RemoteSyncClient;
use crate::infrastructure::storage::config::{AppConfig, TransportConfig};
use crate::infrastructure::transport::backoff::{Backoff, BackoffPolicy};
use crate::infrastructure::transport::hid::HidTransport;
use crate::infrastructure::transport::mqtt::MqttTransport;
use crate::infrastructure::transport::serial::SerialTransport;
use crate::infrastructure::transport::Transport;

/// How long the remote client may keep flushing after the game loop ended.
const REMOTE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// ── Restart policy ────────────────────────────────────────────────────────────

/// Budgeted, backed-off controller restarts.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    budget: u32,
    used: u32,
    backoff: Backoff,
}

impl RestartPolicy {
    pub fn new(budget: u32, backoff: BackoffPolicy) -> Self {
        Self {
            budget,
            used: 0,
            backoff: Backoff::new(backoff),
        }
    }

    /// The delay before the next restart, or `None` once the budget is
    /// spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.used >= self.budget {
            return None;
        }
        self.used += 1;
        Some(self.backoff.next_delay())
    }

    /// Restarts used since the controller last came up.
    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// The controller is healthy again.
    pub fn reset(&mut self) {
        self.used = 0;
        self.backoff.reset();
    }
}

// ── Exit status ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Stopped on request after a clean cleanup.
    Clean,
    /// The controller never started.
    StartFailed,
    /// Stopped because of a fault (error budget, restart budget, failed
    /// cleanup).
    Forced,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::StartFailed => 1,
            ExitStatus::Forced => 2,
        }
    }
}

impl From<LoopExit> for ExitStatus {
    fn from(exit: LoopExit) -> Self {
        if !exit.started {
            ExitStatus::StartFailed
        } else if exit.clean {
            ExitStatus::Clean
        } else {
            ExitStatus::Forced
        }
    }
}

// ── Supervisor ────────────────────────────────────────────────────────────────

/// Builds the transport named by the `[transport]` section.
pub fn build_transport(config: &AppConfig) -> Box<dyn Transport> {
    match &config.transport {
        TransportConfig::Serial(serial) => Box::new(SerialTransport::new(
            serial.clone(),
            config.policy.max_frame_len,
            config.policy.frame_stale(),
        )),
        TransportConfig::Mqtt(mqtt) => Box::new(MqttTransport::new(mqtt.clone())),
        TransportConfig::Hid(hid) => Box::new(HidTransport::new(hid.clone())),
    }
}

pub struct Supervisor {
    config: AppConfig,
}

impl Supervisor {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Runs the table until it stops.  `shutdown` turning `true` starts the
    /// stop sequence.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> ExitStatus {
        let config = self.config;
        let policy = &config.policy;
        let table_id = config.table.table_id.clone();
        info!(
            %table_id,
            game = config.table.game_type.as_str(),
            transport = config.transport.kind(),
            studio = %config.remote.server_url,
            "starting table controller"
        );

        let (commands_tx, commands_rx) = mpsc::channel(policy.event_queue_capacity);
        let (client, remote) = RemoteSyncClient::new(
            config.remote.clone(),
            table_id.clone(),
            config.table.device_name.clone(),
            policy.backoff(),
            commands_tx,
        );
        let (remote_stop_tx, remote_stop_rx) = watch::channel(false);
        let mut remote_task = tokio::spawn(client.run(remote_stop_rx));

        let dispatcher = ExceptionDispatcher::new(
            remote.clone(),
            Arc::new(TracingAlertSink),
            config.table.environment.clone(),
            policy.alert_min_severity,
        );
        let controller = TableController::new(
            config.table.game_type,
            table_id.clone(),
            build_transport(&config),
            ControllerSettings::from_policy(policy),
        );
        let machine = GameStateMachine::new(config.session(), policy.game_policy());
        let restarts = RestartPolicy::new(policy.controller_restart_budget, policy.backoff());

        let game_loop = GameLoop::new(
            machine,
            controller,
            dispatcher,
            remote.clone(),
            restarts,
            policy.event_queue_capacity,
        );
        let exit = game_loop.run(commands_rx, shutdown).await;

        remote_stop_tx.send_replace(true);
        match tokio::time::timeout(REMOTE_DRAIN_TIMEOUT, &mut remote_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "remote sync task failed"),
            Err(_) => {
                warn!(pending = remote.pending(), "studio drain timed out");
                remote_task.abort();
            }
        }

        let status = ExitStatus::from(exit);
        info!(%table_id, ?status, "table controller stopped");
        status
    }
}
