//! The game loop task.
//!
//! # Single writer (for beginners)
//!
//! The [`GameStateMachine`] is a plain value, and this task is the only one
//! that ever touches it.  Everything else talks to the loop through
//! channels, so process and round state change in exactly one place and in
//! one well-defined order:
//!
//! ```text
//!  controller events ─┐
//!  studio commands   ─┤
//!  confirm / restart ─┼──► select! ──► machine.apply(input) ──► notifications ──► Studio
//!  timers            ─┤                        │
//!  shutdown signal   ─┤                        └──► directives (timers, cleanup, exit)
//!  1 s tick          ─┘
//! ```
//!
//! The loop ends when the machine reports [`Directive::Terminated`].

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use table_core::protocol::studio::{Outbound, RemoteCommand};
use table_core::{
    now_us, ConfirmKey, Directive, ExceptionCode, ExceptionEvent, GameStateMachine,
    HardwareEventKind, MachineInput, Notification, Severity,
};

use crate::application::controller::{Controller, ControllerEvent};
use crate::application::dispatcher::ExceptionDispatcher;
use crate::application::supervisor::RestartPolicy;
use crate::infrastructure::remote::RemoteHandle;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopExit {
    /// The stop was requested and cleanup succeeded.
    pub clean: bool,
    /// The controller started at least once.
    pub started: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Confirm(ConfirmKey),
    Restart,
}

pub struct GameLoop<C> {
    machine: GameStateMachine,
    controller: C,
    dispatcher: ExceptionDispatcher,
    remote: RemoteHandle,
    restarts: RestartPolicy,
    events_tx: mpsc::Sender<ControllerEvent>,
    events_rx: Option<mpsc::Receiver<ControllerEvent>>,
    timers_tx: mpsc::UnboundedSender<Timer>,
    timers_rx: Option<mpsc::UnboundedReceiver<Timer>>,
    exit: Option<bool>,
    forced: bool,
}

impl<C: Controller> GameLoop<C> {
    pub fn new(
        machine: GameStateMachine,
        controller: C,
        dispatcher: ExceptionDispatcher,
        remote: RemoteHandle,
        restarts: RestartPolicy,
        event_capacity: usize,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(event_capacity.max(1));
        let (timers_tx, timers_rx) = mpsc::unbounded_channel();
        Self {
            machine,
            controller,
            dispatcher,
            remote,
            restarts,
            events_tx,
            events_rx: Some(events_rx),
            timers_tx,
            timers_rx: Some(timers_rx),
            exit: None,
            forced: false,
        }
    }

    /// Starts the controller and drives the machine until it terminates.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<RemoteCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) -> LoopExit {
        let (Some(mut events), Some(mut timers)) = (self.events_rx.take(), self.timers_rx.take())
        else {
            warn!("game loop already ran");
            return LoopExit {
                clean: false,
                started: false,
            };
        };
        let table_id = self.machine.session().table_id().to_string();

        let started = match self.controller.start(self.events_tx.clone()).await {
            Ok(()) => {
                self.apply(MachineInput::ControllerStarted).await;
                true
            }
            Err(e) => {
                self.apply(MachineInput::ControllerStartFailed {
                    reason: e.to_string(),
                })
                .await;
                false
            }
        };

        let mut tick = interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_seen = false;
        let mut commands_open = true;

        while self.exit.is_none() {
            tokio::select! {
                Some(event) = events.recv() => self.on_controller_event(event).await,

                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.on_command(command).await,
                    None => {
                        debug!("command channel closed");
                        commands_open = false;
                    }
                },

                Some(timer) = timers.recv() => self.on_timer(timer).await,

                changed = shutdown.changed(), if !shutdown_seen => {
                    if changed.is_err() || *shutdown.borrow() {
                        shutdown_seen = true;
                        info!(%table_id, "shutdown requested");
                        self.apply(MachineInput::StopRequested {
                            reason: "shutdown requested".to_string(),
                        })
                        .await;
                    }
                }

                _ = tick.tick() => self.apply(MachineInput::Tick).await,
            }
        }

        let clean = self.exit.unwrap_or(false) && !self.forced;
        info!(%table_id, clean, started, "game loop finished");
        LoopExit { clean, started }
    }

    async fn on_controller_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Hardware(event) => {
                if matches!(event.kind, HardwareEventKind::TransportRestored { .. }) {
                    self.restarts.reset();
                }
                self.apply(MachineInput::Hardware(event)).await;
            }
            ControllerEvent::Exception(exception) => {
                self.dispatcher.report(&exception);
                if exception.is_fatal() {
                    self.apply(MachineInput::Fault(exception)).await;
                }
            }
            ControllerEvent::Exited { reason } => self.on_controller_exit(reason).await,
        }
    }

    /// The read loop died.  Restart it after a backoff, or stop the table
    /// once the restart budget is spent.
    async fn on_controller_exit(&mut self, reason: String) {
        if self.machine.process_state().is_shutting_down() {
            debug!(%reason, "controller exit during shutdown");
            return;
        }
        if let Err(e) = self.controller.cleanup().await {
            warn!(error = %e, "cleanup of dead controller failed");
        }

        match self.restarts.next_delay() {
            Some(delay) => {
                self.report(
                    ExceptionCode::ControllerRestart,
                    Severity::Warning,
                    format!(
                        "controller exited ({reason}); restart {}/{} in {} ms",
                        self.restarts.used(),
                        self.restarts.budget(),
                        delay.as_millis()
                    ),
                );
                self.schedule(delay, Timer::Restart);
            }
            None => {
                let exception = self.report(
                    ExceptionCode::ControllerRestart,
                    Severity::Fatal,
                    format!(
                        "controller exited ({reason}); restart budget of {} exhausted",
                        self.restarts.budget()
                    ),
                );
                self.forced = true;
                self.apply(MachineInput::Fault(exception)).await;
                self.apply(MachineInput::StopRequested {
                    reason: "controller restart budget exhausted".to_string(),
                })
                .await;
            }
        }
    }

    async fn on_command(&mut self, command: RemoteCommand) {
        info!(?command, "applying studio command");
        let input = match command {
            RemoteCommand::ForceReset => MachineInput::ForceReset,
            RemoteCommand::RequestStatus => MachineInput::RequestStatus,
            RemoteCommand::Stop => MachineInput::StopRequested {
                reason: "stop command from studio".to_string(),
            },
        };
        self.apply(input).await;
    }

    async fn on_timer(&mut self, timer: Timer) {
        match timer {
            Timer::Confirm(key) => self.apply(MachineInput::ConfirmResult(key)).await,
            Timer::Restart => {
                if self.machine.process_state().is_shutting_down() {
                    return;
                }
                match self.controller.start(self.events_tx.clone()).await {
                    Ok(()) => info!(attempt = self.restarts.used(), "controller restarted"),
                    Err(e) => self.on_controller_exit(e.to_string()).await,
                }
            }
        }
    }

    /// Feeds `input` to the machine and carries out what it asks for, until
    /// no follow-up input is left.
    async fn apply(&mut self, input: MachineInput) {
        let mut pending = VecDeque::from([input]);
        while let Some(input) = pending.pop_front() {
            let applied = self.machine.apply(input, now_us());
            for notification in &applied.notifications {
                self.publish(notification);
            }
            for directive in applied.directives {
                match directive {
                    Directive::ArmConfirmTimer { key, after_ms } => {
                        self.schedule(Duration::from_millis(after_ms), Timer::Confirm(key));
                    }
                    Directive::RunCleanup => {
                        let error = self.controller.cleanup().await.err().map(|e| e.to_string());
                        pending.push_back(MachineInput::CleanupFinished { error });
                    }
                    Directive::Terminated { clean } => self.exit = Some(clean),
                }
            }
        }
    }

    fn publish(&self, notification: &Notification) {
        match notification {
            Notification::Exception(exception) => self.dispatcher.report(exception),
            other => {
                self.remote.push(Outbound::from_notification(other));
            }
        }
    }

    fn report(&self, code: ExceptionCode, severity: Severity, message: String) -> ExceptionEvent {
        let event = ExceptionEvent::new(
            code,
            severity,
            self.machine.session().table_id(),
            message,
            now_us(),
        );
        self.dispatcher.report(&event);
        event
    }

    fn schedule(&self, delay: Duration, timer: Timer) {
        let timers = self.timers_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The loop may have finished in the meantime.
            let _ = timers.send(timer);
        });
    }
}
