//! How hardware bytes become observations, and how the controller talks to
//! the Studio.
//!
//! - [`framing`] – delimiter-based frame assembly for byte streams (serial).
//! - [`roulette`] – wheel frame parser.
//! - [`sicbo`] – dice shaker JSON message parser.
//! - [`baccarat`] – card scanner code parser.
//! - [`envelope`] – replay filter for retained/redelivered MQTT messages.
//! - [`studio`] – JSON messages exchanged with the Studio service.

pub mod baccarat;
pub mod envelope;
pub mod error;
pub mod framing;
pub mod roulette;
pub mod sequence;
pub mod sicbo;
pub mod studio;

pub use error::{DecodeError, FrameError};
pub use framing::FrameAssembler;
pub use sequence::SequenceCounter;

/// Result of decoding one unit of hardware input.
///
/// Decoders never fail outright: unreadable input is a [`Decoded::Malformed`]
/// value so the controller can forward it as MALFORMED_INPUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    /// A well-formed message carrying round information.
    Observation(T),
    /// A well-formed message with no round information (status, heartbeat).
    Raw,
    Malformed(DecodeError),
}
