//! Hardware and exception events.
//!
//! [`HardwareEvent`] is what a controller forwards to the state machine: a
//! per-controller sequence number, the capture timestamp, and one of five
//! kinds.  [`ExceptionEvent`] is what any component produces when it detects a
//! fault; it is immutable once created and flows to the exception dispatcher.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::cards::{Card, CardPosition};

// ── Observations ──────────────────────────────────────────────────────────────

/// What a roulette wheel reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouletteObservation {
    /// The ball was launched for wheel round `round`.
    SpinStarted { round: u64 },
    /// The ball came to rest in `pocket` (0–36) with high confidence.
    BallLanded { round: u64, pocket: u8 },
}

/// What a sicbo dice shaker reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SicBoObservation {
    ShakeStarted { round: u64 },
    /// All three dice have settled.
    DiceSettled { round: u64, dice: [u8; 3] },
}

/// What the baccarat scanner reported, after the controller validated the
/// dealing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaccaratObservation {
    CardDealt {
        hand: u64,
        position: CardPosition,
        card: Card,
        /// `true` for the card after which the drawing rules end the hand.
        completes_hand: bool,
    },
}

/// A decoded, well-formed hardware observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum Observation {
    Roulette(RouletteObservation),
    #[serde(rename = "sicbo")]
    SicBo(SicBoObservation),
    Baccarat(BaccaratObservation),
}

impl Observation {
    /// The hardware round (or hand) number the observation belongs to.
    pub fn round(&self) -> u64 {
        match self {
            Observation::Roulette(RouletteObservation::SpinStarted { round })
            | Observation::Roulette(RouletteObservation::BallLanded { round, .. })
            | Observation::SicBo(SicBoObservation::ShakeStarted { round })
            | Observation::SicBo(SicBoObservation::DiceSettled { round, .. }) => *round,
            Observation::Baccarat(BaccaratObservation::CardDealt { hand, .. }) => *hand,
        }
    }
}

// ── Hardware events ───────────────────────────────────────────────────────────

/// The five kinds of event a controller can forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HardwareEventKind {
    /// A well-formed frame that carries no round information (heartbeats,
    /// status, warnings).  Still proves the link is alive.
    RawFrame { bytes: Vec<u8> },
    DecodedResult { observation: Observation },
    /// The transport failed.  `consecutive` counts failures since the last
    /// successful handshake.
    TransportLost { reason: String, consecutive: u32 },
    /// A handshake round trip succeeded.  `attempts` is 0 for the first
    /// connection after `start()`.
    TransportRestored { attempts: u32 },
    MalformedInput { reason: String, raw: Vec<u8> },
}

impl HardwareEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            HardwareEventKind::RawFrame { .. } => "RAW_FRAME",
            HardwareEventKind::DecodedResult { .. } => "DECODED_RESULT",
            HardwareEventKind::TransportLost { .. } => "TRANSPORT_LOST",
            HardwareEventKind::TransportRestored { .. } => "TRANSPORT_RESTORED",
            HardwareEventKind::MalformedInput { .. } => "MALFORMED_INPUT",
        }
    }
}

/// One event produced by a controller and consumed exactly once by the
/// state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareEvent {
    /// Per-controller, strictly increasing.
    pub seq: u64,
    /// Capture time in microseconds since the Unix epoch.
    pub captured_at_us: u64,
    pub kind: HardwareEventKind,
}

impl HardwareEvent {
    pub fn new(seq: u64, captured_at_us: u64, kind: HardwareEventKind) -> Self {
        Self {
            seq,
            captured_at_us,
            kind,
        }
    }
}

// ── Exceptions ────────────────────────────────────────────────────────────────

/// Ordered severity: `Info < Warning < Error < Fatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "fatal" => Ok(Severity::Fatal),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Machine-readable exception code sent to the Studio and external alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionCode {
    TransportUnavailable,
    TransportLost,
    MalformedInput,
    AmbiguousEvent,
    ControllerStart,
    ControllerRestart,
    Cleanup,
    RemoteUnavailable,
    WheelWarning,
    FatalFault,
    ErrorBudgetExhausted,
}

impl ExceptionCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExceptionCode::TransportUnavailable => "TRANSPORT_UNAVAILABLE",
            ExceptionCode::TransportLost => "TRANSPORT_LOST",
            ExceptionCode::MalformedInput => "MALFORMED_INPUT",
            ExceptionCode::AmbiguousEvent => "AMBIGUOUS_EVENT",
            ExceptionCode::ControllerStart => "CONTROLLER_START",
            ExceptionCode::ControllerRestart => "CONTROLLER_RESTART",
            ExceptionCode::Cleanup => "CLEANUP",
            ExceptionCode::RemoteUnavailable => "REMOTE_UNAVAILABLE",
            ExceptionCode::WheelWarning => "WHEEL_WARNING",
            ExceptionCode::FatalFault => "FATAL_FAULT",
            ExceptionCode::ErrorBudgetExhausted => "ERROR_BUDGET_EXHAUSTED",
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured fault report.  Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionEvent {
    pub code: ExceptionCode,
    pub message: String,
    pub table_id: String,
    pub severity: Severity,
    /// Microseconds since the Unix epoch.
    pub occurred_at_us: u64,
}

impl ExceptionEvent {
    pub fn new(
        code: ExceptionCode,
        severity: Severity,
        table_id: impl Into<String>,
        message: impl Into<String>,
        occurred_at_us: u64,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            table_id: table_id.into(),
            severity,
            occurred_at_us,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity >= Severity::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_severity_parses_config_spelling() {
        assert_eq!("warn".parse::<Severity>(), Ok(Severity::Warning));
        assert_eq!("ERROR".parse::<Severity>(), Ok(Severity::Error));
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn test_exception_code_serializes_screaming_snake_case() {
        // Arrange
        let code = ExceptionCode::AmbiguousEvent;

        // Act
        let json = serde_json::to_string(&code).unwrap();

        // Assert
        assert_eq!(json, "\"AMBIGUOUS_EVENT\"");
        assert_eq!(code.as_str(), "AMBIGUOUS_EVENT");
    }

    #[test]
    fn test_only_fatal_severity_is_fatal() {
        let mut ev = ExceptionEvent::new(
            ExceptionCode::FatalFault,
            Severity::Error,
            "T1",
            "boom",
            1,
        );
        assert!(!ev.is_fatal());
        ev.severity = Severity::Fatal;
        assert!(ev.is_fatal());
    }

    #[test]
    fn test_observation_round_reads_hand_number_for_baccarat() {
        use crate::domain::cards::{Rank, Suit};
        let obs = Observation::Baccarat(BaccaratObservation::CardDealt {
            hand: 42,
            position: CardPosition::Player1,
            card: Card::new(Rank::Ace, Suit::Hearts),
            completes_hand: false,
        });
        assert_eq!(obs.round(), 42);
    }
}
