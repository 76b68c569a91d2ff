//! # table-core
//!
//! Shared library for the casino table controller containing the game domain,
//! the nested process/round state machines, the hardware protocol decoders and
//! the Studio wire messages.
//!
//! It has zero dependencies on sockets, serial ports, or async runtimes, so
//! everything in here can be unit-tested with plain values.
//!
//! # Architecture overview
//!
//! One controller process drives one physical table (a roulette wheel, a sicbo
//! dice shaker, or a baccarat card scanner) on behalf of the remote Studio
//! service.  Raw hardware data is decoded into [`HardwareEvent`]s, and the
//! [`GameStateMachine`] turns those events into state transitions and
//! notifications for the Studio.
//!
//! - **`domain`** – Table identity, hardware/exception events, card rules,
//!   the outer [`ProcessState`] machine and the inner per-game round machines.
//!
//! - **`protocol`** – How bytes become observations: serial frame assembly,
//!   wheel frame parsing, shaker message parsing, scanner code parsing, MQTT
//!   replay filtering and the JSON messages exchanged with the Studio.
//!
//! - **`keymap`** – USB HID usage tables used to turn boot-keyboard reports
//!   from a barcode scanner into scan strings.

pub mod domain;
pub mod keymap;
pub mod protocol;

pub use domain::event::{
    ExceptionCode, ExceptionEvent, HardwareEvent, HardwareEventKind, Observation, Severity,
};
pub use domain::machine::{
    Applied, Directive, GameStateMachine, MachineInput, Notification, TableStatus,
};
pub use domain::policy::GamePolicy;
pub use domain::process::ProcessState;
pub use domain::result::RoundResult;
pub use domain::round::{ConfirmKey, RoundState};
pub use domain::session::{GameType, TableSession};
pub use protocol::sequence::SequenceCounter;

/// Returns the current wall-clock time in microseconds since the Unix epoch.
///
/// Every capture timestamp and `occurred_at` value in this crate uses this
/// unit.  Returns 0 if the system clock is set before 1970.
pub fn now_us() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
