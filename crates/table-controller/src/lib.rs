//! table-controller library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the table controller do? (for beginners)
//!
//! One controller process runs next to one physical casino table.  It talks
//! to the table hardware over whatever link the device offers and keeps the
//! remote Studio service informed about what happens at the table:
//!
//! 1. Opens the hardware transport (a serial port for a roulette wheel, an
//!    MQTT topic for a dice shaker, a HID device for a card scanner) and keeps
//!    it alive with exponential-backoff reconnection.
//! 2. Decodes the raw device traffic into hardware events (ball landed in 17,
//!    dice settled as 4-4-6, nine of hearts dealt to the banker).
//! 3. Feeds those events into the [`table_core::GameStateMachine`], which
//!    decides the process state and the round state.
//! 4. Pushes every status change, round result and exception to the Studio
//!    over a WebSocket, buffering while the Studio is unreachable.
//! 5. Obeys commands from the Studio (`force_reset`, `stop`,
//!    `request_status`).

/// Application layer: controllers, decoders, the game loop and supervision.
pub mod application;

/// Infrastructure layer: transports, the Studio connection, configuration.
pub mod infrastructure;
