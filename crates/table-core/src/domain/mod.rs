//! Domain entities for the table controller.
//!
//! This module contains pure game logic with no infrastructure dependencies.
//!
//! # Layering
//!
//! The domain layer knows what a roulette round or a baccarat hand is, which
//! process transitions are legal, and how to react to a hardware event.  It
//! does not know how the bytes arrived (serial, MQTT, HID) or where the
//! notifications go (WebSocket, logs).  Outer layers depend on the domain; the
//! domain never depends on them.
//!
//! The state machine is split in two:
//!
//! - [`process`] – the outer lifecycle (INITIALIZING → RUNNING ⇄ ERROR →
//!   STOPPING → STOPPED), identical for every game.
//! - [`round`] – the inner per-game round machine, only meaningful while the
//!   process is RUNNING.
//!
//! [`machine`] composes the two and owns the ordering, tie-break and budget
//! rules.

pub mod cards;
pub mod event;
pub mod machine;
pub mod policy;
pub mod process;
pub mod result;
pub mod round;
pub mod session;
