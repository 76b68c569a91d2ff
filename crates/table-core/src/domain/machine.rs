//! The game state machine: the outer process lifecycle composed with the
//! inner round machine.
//!
//! # How it is driven
//!
//! The machine is a plain value.  The game loop task owns it and calls
//! [`GameStateMachine::apply`] once per input, passing the current wall-clock
//! time.  `apply` never blocks and never performs I/O; everything the caller
//! has to do afterwards (push notifications to the Studio, arm a timer, run
//! the controller cleanup) is returned in [`Applied`].
//!
//! # Rules enforced here
//!
//! - Hardware events are applied in sequence-number order.  A lower number
//!   than the last applied one is stale and dropped.  The same number with the
//!   same payload is a duplicate and dropped.  The same number with a
//!   different payload is resolved by capture timestamp: later wins, earlier
//!   is dropped, equal raises AMBIGUOUS_EVENT and changes nothing.
//! - RUNNING → ERROR when the transport stays lost past the grace period or
//!   reports `transport_failure_budget` consecutive losses, when a round sees
//!   `malformed_budget` malformed inputs, or on any fault of severity Fatal.
//! - ERROR → RUNNING on TRANSPORT_RESTORED followed by a good read, or on a
//!   `force_reset` command while the transport is up.
//! - Staying in ERROR longer than `max_error_secs` raises
//!   ERROR_BUDGET_EXHAUSTED and starts the stop sequence.
//! - The round machine is only driven while RUNNING; leaving RUNNING discards
//!   the in-flight round.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::event::{ExceptionCode, ExceptionEvent, HardwareEvent, HardwareEventKind, Severity};
use crate::domain::policy::GamePolicy;
use crate::domain::process::{ProcessMachine, ProcessState};
use crate::domain::result::RoundResult;
use crate::domain::round::{ConfirmKey, Hop, RoundMachine, RoundState};
use crate::domain::session::{GameType, TableSession};

// ── Inputs and outputs ────────────────────────────────────────────────────────

/// Everything the game loop can feed into the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineInput {
    Hardware(HardwareEvent),
    /// The controller's `start()` returned successfully.
    ControllerStarted,
    /// The controller's `start()` failed; takes the abort edge to STOPPED.
    ControllerStartFailed { reason: String },
    /// An exception reported by another component.  Only Fatal severity
    /// changes state.
    Fault(ExceptionEvent),
    /// The confirmation window armed by [`Directive::ArmConfirmTimer`] elapsed.
    ConfirmResult(ConfirmKey),
    ForceReset,
    RequestStatus,
    StopRequested { reason: String },
    /// The controller cleanup ran; `error` is set when it failed.
    CleanupFinished { error: Option<String> },
    /// Periodic clock input used for grace and error-duration budgets.
    Tick,
}

/// A point-in-time view of the table, sent on request and on reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStatus {
    pub table_id: String,
    pub game_type: GameType,
    pub device_name: String,
    pub process: ProcessState,
    pub round: RoundState,
    pub current_round: Option<u64>,
    pub transport_up: bool,
    pub results_published: u64,
}

/// What the outside world should learn about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ProcessChanged {
        from: ProcessState,
        to: ProcessState,
        reason: String,
    },
    RoundAdvanced {
        from: RoundState,
        to: RoundState,
    },
    Status(TableStatus),
    Result(RoundResult),
    Exception(ExceptionEvent),
}

/// Work the caller must carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Feed `MachineInput::ConfirmResult(key)` back after `after_ms`.
    ArmConfirmTimer { key: ConfirmKey, after_ms: u64 },
    /// Run the controller cleanup, then feed `CleanupFinished`.
    RunCleanup,
    /// STOPPED was reached.  `clean` is false after an aborted start or a
    /// forced stop.
    Terminated { clean: bool },
}

/// The outcome of one [`GameStateMachine::apply`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub process: ProcessState,
    pub round: RoundState,
    pub notifications: Vec<Notification>,
    pub directives: Vec<Directive>,
}

impl Applied {
    pub fn exceptions(&self) -> impl Iterator<Item = &ExceptionEvent> {
        self.notifications.iter().filter_map(|n| match n {
            Notification::Exception(e) => Some(e),
            _ => None,
        })
    }

    pub fn results(&self) -> impl Iterator<Item = &RoundResult> {
        self.notifications.iter().filter_map(|n| match n {
            Notification::Result(r) => Some(r),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorCause {
    Transport,
    Malformed,
    Fatal,
}

// ── The machine ───────────────────────────────────────────────────────────────

pub struct GameStateMachine {
    session: TableSession,
    policy: GamePolicy,
    process: ProcessMachine,
    rounds: RoundMachine,

    last_event: Option<HardwareEvent>,

    controller_started: bool,
    handshake_seen: bool,
    transport_up: bool,
    lost_since_us: Option<u64>,

    malformed_in_round: u32,
    error_since_us: Option<u64>,
    error_cause: Option<ErrorCause>,
    awaiting_resync: bool,
    clean_stop: bool,

    results_published: u64,
}

impl GameStateMachine {
    pub fn new(session: TableSession, policy: GamePolicy) -> Self {
        let rounds = RoundMachine::new(session.game_type());
        Self {
            session,
            policy,
            process: ProcessMachine::new(),
            rounds,
            last_event: None,
            controller_started: false,
            handshake_seen: false,
            transport_up: false,
            lost_since_us: None,
            malformed_in_round: 0,
            error_since_us: None,
            error_cause: None,
            awaiting_resync: false,
            clean_stop: true,
            results_published: 0,
        }
    }

    pub fn process_state(&self) -> ProcessState {
        self.process.state()
    }

    pub fn round_state(&self) -> RoundState {
        self.rounds.state()
    }

    pub fn session(&self) -> &TableSession {
        &self.session
    }

    pub fn status(&self) -> TableStatus {
        TableStatus {
            table_id: self.session.table_id().to_string(),
            game_type: self.session.game_type(),
            device_name: self.session.device_name().to_string(),
            process: self.process.state(),
            round: self.rounds.state(),
            current_round: self.rounds.current_round(),
            transport_up: self.transport_up,
            results_published: self.results_published,
        }
    }

    /// Applies one input at wall-clock time `now_us`.
    pub fn apply(&mut self, input: MachineInput, now_us: u64) -> Applied {
        let mut out = Vec::new();
        let mut directives = Vec::new();

        if self.process.state().is_terminal() {
            debug!(table_id = %self.session.table_id(), ?input, "input ignored after STOPPED");
        } else {
            match input {
                MachineInput::Hardware(event) => self.on_hardware(event, now_us, &mut out, &mut directives),
                MachineInput::ControllerStarted => {
                    self.controller_started = true;
                    self.try_enter_running(&mut out);
                }
                MachineInput::ControllerStartFailed { reason } => {
                    self.on_start_failed(reason, now_us, &mut out, &mut directives)
                }
                MachineInput::Fault(fault) => self.on_fault(fault, now_us, &mut out),
                MachineInput::ConfirmResult(key) => self.on_confirm(key, &mut out),
                MachineInput::ForceReset => self.on_force_reset(&mut out),
                MachineInput::RequestStatus => out.push(Notification::Status(self.status())),
                MachineInput::StopRequested { reason } => {
                    self.begin_stop(&reason, &mut out, &mut directives)
                }
                MachineInput::CleanupFinished { error } => {
                    self.on_cleanup_finished(error, now_us, &mut out, &mut directives)
                }
                MachineInput::Tick => self.on_tick(now_us, &mut out, &mut directives),
            }
        }

        Applied {
            process: self.process.state(),
            round: self.rounds.state(),
            notifications: out,
            directives,
        }
    }

    // ── Hardware events ───────────────────────────────────────────────────────

    fn on_hardware(
        &mut self,
        event: HardwareEvent,
        now_us: u64,
        out: &mut Vec<Notification>,
        directives: &mut Vec<Directive>,
    ) {
        if self.process.state().is_shutting_down() {
            debug!(seq = event.seq, "hardware event ignored while stopping");
            return;
        }
        if let Some(last) = &self.last_event {
            if event.seq < last.seq {
                debug!(seq = event.seq, last_seq = last.seq, "stale hardware event dropped");
                return;
            }
            if event.seq == last.seq {
                if event.kind == last.kind {
                    debug!(seq = event.seq, "duplicate hardware event dropped");
                    return;
                }
                match event.captured_at_us.cmp(&last.captured_at_us) {
                    Ordering::Less => {
                        debug!(seq = event.seq, "conflicting hardware event with earlier timestamp dropped");
                        return;
                    }
                    Ordering::Equal => {
                        let message = format!(
                            "two different {} / {} events share seq {} and timestamp {}",
                            last.kind.name(),
                            event.kind.name(),
                            event.seq,
                            event.captured_at_us
                        );
                        out.push(Notification::Exception(self.exception(
                            ExceptionCode::AmbiguousEvent,
                            Severity::Warning,
                            message,
                            now_us,
                        )));
                        return;
                    }
                    Ordering::Greater => {
                        debug!(seq = event.seq, "conflicting hardware event with later timestamp wins");
                    }
                }
            }
        }
        self.last_event = Some(event.clone());

        match event.kind {
            HardwareEventKind::TransportLost {
                reason,
                consecutive,
            } => self.on_transport_lost(reason, consecutive, now_us, out),
            HardwareEventKind::TransportRestored { attempts } => {
                self.on_transport_restored(attempts, out)
            }
            HardwareEventKind::RawFrame { .. } => {
                self.mark_alive();
                self.try_resync(out);
            }
            HardwareEventKind::DecodedResult { observation } => {
                self.mark_alive();
                self.try_resync(out);
                if self.process.state() != ProcessState::Running {
                    debug!(round = observation.round(), "observation ignored outside RUNNING");
                    return;
                }
                match self.rounds.observe(&observation) {
                    Ok(step) => {
                        push_hops(out, &step.hops);
                        if step.corrected {
                            info!(
                                table_id = %self.session.table_id(),
                                round = observation.round(),
                                "pending result corrected before publication"
                            );
                        }
                        if let Some(key) = step.armed {
                            directives.push(Directive::ArmConfirmTimer {
                                key,
                                after_ms: self.policy.result_confirm_ms,
                            });
                        }
                    }
                    Err(rejected) => self.on_malformed(rejected.0, now_us, out),
                }
            }
            HardwareEventKind::MalformedInput { reason, .. } => {
                if self.process.state() == ProcessState::Running {
                    self.on_malformed(reason, now_us, out);
                } else {
                    debug!(%reason, "malformed input ignored outside RUNNING");
                }
            }
        }
    }

    fn mark_alive(&mut self) {
        if !self.transport_up && self.handshake_seen {
            self.transport_up = true;
            self.lost_since_us = None;
        }
    }

    fn on_transport_lost(
        &mut self,
        reason: String,
        consecutive: u32,
        now_us: u64,
        out: &mut Vec<Notification>,
    ) {
        let first_loss = self.transport_up || self.lost_since_us.is_none();
        self.transport_up = false;
        self.awaiting_resync = false;
        self.lost_since_us.get_or_insert(now_us);

        if first_loss {
            out.push(Notification::Exception(self.exception(
                ExceptionCode::TransportLost,
                Severity::Warning,
                format!("transport lost: {reason}"),
                now_us,
            )));
        } else {
            debug!(%reason, consecutive, "transport still lost");
        }

        if self.process.state() == ProcessState::Running
            && consecutive >= self.policy.transport_failure_budget
        {
            let message = format!("transport lost {consecutive} consecutive times: {reason}");
            self.enter_error(ErrorCause::Transport, message, now_us, out);
        }
    }

    fn on_transport_restored(&mut self, attempts: u32, out: &mut Vec<Notification>) {
        self.transport_up = true;
        self.lost_since_us = None;
        info!(table_id = %self.session.table_id(), attempts, "transport handshake succeeded");
        match self.process.state() {
            ProcessState::Initializing => {
                self.handshake_seen = true;
                self.try_enter_running(out);
            }
            ProcessState::Error => self.awaiting_resync = true,
            _ => {}
        }
    }

    fn try_enter_running(&mut self, out: &mut Vec<Notification>) {
        if self.process.state() == ProcessState::Initializing
            && self.controller_started
            && self.handshake_seen
        {
            self.transition(ProcessState::Running, "controller started", out);
        }
    }

    fn try_resync(&mut self, out: &mut Vec<Notification>) {
        if self.process.state() == ProcessState::Error && self.awaiting_resync {
            self.leave_error("re-synchronised after transport restore", out);
        }
    }

    fn on_malformed(&mut self, reason: String, now_us: u64, out: &mut Vec<Notification>) {
        self.malformed_in_round += 1;
        let count = self.malformed_in_round;
        out.push(Notification::Exception(self.exception(
            ExceptionCode::MalformedInput,
            Severity::Warning,
            format!("{reason} ({count}/{})", self.policy.malformed_budget),
            now_us,
        )));
        if count >= self.policy.malformed_budget {
            let message = format!("{count} malformed inputs in one round");
            self.enter_error(ErrorCause::Malformed, message, now_us, out);
        }
    }

    // ── Other inputs ──────────────────────────────────────────────────────────

    fn on_start_failed(
        &mut self,
        reason: String,
        now_us: u64,
        out: &mut Vec<Notification>,
        directives: &mut Vec<Directive>,
    ) {
        if self.process.state() != ProcessState::Initializing {
            return;
        }
        out.push(Notification::Exception(self.exception(
            ExceptionCode::ControllerStart,
            Severity::Fatal,
            format!("controller failed to start: {reason}"),
            now_us,
        )));
        self.clean_stop = false;
        self.transition(ProcessState::Stopped, "controller start failed", out);
        directives.push(Directive::Terminated { clean: false });
    }

    fn on_fault(&mut self, fault: ExceptionEvent, now_us: u64, out: &mut Vec<Notification>) {
        if fault.is_fatal() && self.process.state() == ProcessState::Running {
            let message = format!("fatal fault {}: {}", fault.code, fault.message);
            self.enter_error(ErrorCause::Fatal, message, now_us, out);
        }
    }

    fn on_confirm(&mut self, key: ConfirmKey, out: &mut Vec<Notification>) {
        if self.process.state() != ProcessState::Running {
            debug!(round = key.round, "confirmation ignored outside RUNNING");
            return;
        }
        if let Some(publication) = self.rounds.confirm(key) {
            push_hops(out, &publication.hops);
            info!(
                table_id = %self.session.table_id(),
                round = publication.result.round(),
                "round result published"
            );
            self.results_published += 1;
            self.malformed_in_round = 0;
            out.push(Notification::Result(publication.result));
        }
    }

    fn on_force_reset(&mut self, out: &mut Vec<Notification>) {
        match self.process.state() {
            ProcessState::Running => {
                self.discard_round(out);
                info!(table_id = %self.session.table_id(), "round reset by remote command");
            }
            ProcessState::Error if self.transport_up => {
                self.leave_error("force reset", out);
            }
            ProcessState::Error => {
                warn!(
                    table_id = %self.session.table_id(),
                    "force reset refused: transport is still down"
                );
            }
            _ => {}
        }
    }

    fn begin_stop(
        &mut self,
        reason: &str,
        out: &mut Vec<Notification>,
        directives: &mut Vec<Directive>,
    ) {
        if self.process.state().is_shutting_down() {
            debug!(%reason, "stop already in progress");
            return;
        }
        self.discard_round(out);
        self.transition(ProcessState::Stopping, reason, out);
        directives.push(Directive::RunCleanup);
    }

    fn on_cleanup_finished(
        &mut self,
        error: Option<String>,
        now_us: u64,
        out: &mut Vec<Notification>,
        directives: &mut Vec<Directive>,
    ) {
        if self.process.state() != ProcessState::Stopping {
            return;
        }
        if let Some(error) = error {
            self.clean_stop = false;
            out.push(Notification::Exception(self.exception(
                ExceptionCode::Cleanup,
                Severity::Warning,
                format!("controller cleanup failed: {error}"),
                now_us,
            )));
        }
        self.transition(ProcessState::Stopped, "cleanup finished", out);
        directives.push(Directive::Terminated {
            clean: self.clean_stop,
        });
    }

    fn on_tick(&mut self, now_us: u64, out: &mut Vec<Notification>, directives: &mut Vec<Directive>) {
        match self.process.state() {
            ProcessState::Running => {
                if let Some(since) = self.lost_since_us {
                    let lost_for = now_us.saturating_sub(since);
                    if lost_for >= self.policy.transport_grace_us() {
                        let message = format!(
                            "transport lost for {} ms (grace {} ms)",
                            lost_for / 1_000,
                            self.policy.transport_grace_ms
                        );
                        self.enter_error(ErrorCause::Transport, message, now_us, out);
                    }
                }
            }
            ProcessState::Error => {
                let Some(since) = self.error_since_us else {
                    return;
                };
                if self.policy.max_error_secs == 0 {
                    return;
                }
                if now_us.saturating_sub(since) >= self.policy.max_error_us() {
                    out.push(Notification::Exception(self.exception(
                        ExceptionCode::ErrorBudgetExhausted,
                        Severity::Fatal,
                        format!(
                            "table stayed in ERROR for more than {} s",
                            self.policy.max_error_secs
                        ),
                        now_us,
                    )));
                    self.clean_stop = false;
                    self.begin_stop("error budget exhausted", out, directives);
                }
            }
            _ => {}
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn enter_error(
        &mut self,
        cause: ErrorCause,
        message: String,
        now_us: u64,
        out: &mut Vec<Notification>,
    ) {
        if self.process.state() != ProcessState::Running {
            return;
        }
        // A fatal fault was already reported by whoever raised it.
        if cause != ErrorCause::Fatal {
            out.push(Notification::Exception(self.exception(
                ExceptionCode::FatalFault,
                Severity::Error,
                message.clone(),
                now_us,
            )));
        }
        self.discard_round(out);
        self.error_cause = Some(cause);
        self.error_since_us = Some(now_us);
        self.awaiting_resync = false;
        self.transition(ProcessState::Error, &message, out);
    }

    fn leave_error(&mut self, reason: &str, out: &mut Vec<Notification>) {
        if let Some(cause) = self.error_cause.take() {
            debug!(?cause, "leaving ERROR");
        }
        self.error_since_us = None;
        self.awaiting_resync = false;
        self.malformed_in_round = 0;
        self.transition(ProcessState::Running, reason, out);
    }

    fn discard_round(&mut self, out: &mut Vec<Notification>) {
        self.malformed_in_round = 0;
        if let Some(hop) = self.rounds.reset() {
            push_hops(out, &[hop]);
        }
    }

    fn transition(&mut self, to: ProcessState, reason: &str, out: &mut Vec<Notification>) {
        match self.process.transition(to) {
            Ok(from) => {
                info!(
                    table_id = %self.session.table_id(),
                    %from,
                    %to,
                    reason,
                    "process state changed"
                );
                out.push(Notification::ProcessChanged {
                    from,
                    to,
                    reason: reason.to_string(),
                });
            }
            Err(e) => warn!(table_id = %self.session.table_id(), error = %e, "transition refused"),
        }
    }

    fn exception(
        &self,
        code: ExceptionCode,
        severity: Severity,
        message: String,
        now_us: u64,
    ) -> ExceptionEvent {
        ExceptionEvent::new(code, severity, self.session.table_id(), message, now_us)
    }
}

fn push_hops(out: &mut Vec<Notification>, hops: &[Hop]) {
    out.extend(
        hops.iter()
            .map(|&(from, to)| Notification::RoundAdvanced { from, to }),
    );
}
