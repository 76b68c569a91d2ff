//! Application layer for the table controller.
//!
//! # What lives here?
//!
//! - **`decoders`** – One [`decoders::ProtocolDecoder`] per game.  A decoder
//!   turns one transport payload into an observation, a raw frame, or a
//!   malformed-input report.  Baccarat dealing order is enforced here.
//!
//! - **`controller`** – The [`controller::Controller`] capability set
//!   (`start`, `stop`, `cleanup`) and the closed set of game variants in
//!   [`controller::TableController`].  A started controller pushes a
//!   sequence-ordered stream of hardware events into a channel.
//!
//! - **`dispatcher`** – Fans exception events out to the log, the Studio and
//!   the optional external alert sink.
//!
//! - **`game_loop`** – The task that owns the state machine.  It is the only
//!   place where process and round state change.
//!
//! - **`supervisor`** – Builds every component from the configuration, wires
//!   the channels between them, and owns the controller restart policy.

pub mod controller;
pub mod decoders;
pub mod dispatcher;
pub mod game_loop;
pub mod supervisor;
