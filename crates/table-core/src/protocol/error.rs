//! Decode and framing errors.

use thiserror::Error;

/// Why a frame, message or scan could not be turned into an observation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty input")]
    Empty,

    #[error("unknown frame type {0:?}")]
    UnknownFrame(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid field '{field}': {value:?}")]
    InvalidField { field: &'static str, value: String },

    /// The wheel reported a position it is not sure about.
    #[error("low-confidence reading for pocket {position}")]
    LowConfidence { position: u8 },

    #[error("expected 3 dice faces, got {0}")]
    DiceCount(usize),

    #[error("die face {0} out of range 1-6")]
    DieFace(u8),

    #[error("invalid json: {0}")]
    Json(String),

    #[error("unknown scan code {0:?}")]
    UnknownScan(String),

    #[error("input is not valid UTF-8")]
    Utf8,

    /// The scanner reported the same code twice inside the debounce window.
    #[error("scan {0:?} read twice")]
    DoubleRead(String),

    /// `#NEW` was scanned before the hand on the layout was complete.
    #[error("new-hand code scanned with {cards} card(s) on the layout")]
    HandInProgress { cards: usize },

    /// The transport delivered a payload this game does not understand.
    #[error("unexpected {0} payload")]
    UnexpectedPayload(&'static str),
}

/// Why the frame assembler threw bytes away.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The partial frame grew past the byte cap without a delimiter.
    #[error("partial frame exceeded {max} bytes")]
    Overflow { max: usize, discarded: Vec<u8> },

    /// The partial frame waited longer than the staleness threshold.
    #[error("partial frame older than {stale_ms} ms")]
    Stale { stale_ms: u64, discarded: Vec<u8> },
}

impl FrameError {
    pub fn discarded(&self) -> &[u8] {
        match self {
            FrameError::Overflow { discarded, .. } | FrameError::Stale { discarded, .. } => {
                discarded
            }
        }
    }
}
