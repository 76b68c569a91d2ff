//! Infrastructure layer for the table controller.
//!
//! Contains the adapters that touch the outside world: hardware transports,
//! the WebSocket session to the Studio, and the TOML configuration file.
//!
//! **Dependency rule**: this layer may depend on `table_core`, but MUST NOT
//! import the `application` layer.
//!
//! # Sub-modules
//!
//! - **`transport`** – The [`transport::Transport`] trait with serial, MQTT
//!   and HID implementations, a scripted mock for tests, and the reconnecting
//!   [`transport::link::Link`] that wraps any of them.
//!
//! - **`remote`** – The Studio remote sync client: connection, heartbeat,
//!   outbox buffering and replay, inbound commands.
//!
//! - **`storage`** – Loading and validating the TOML configuration.

pub mod remote;
pub mod storage;
pub mod transport;
