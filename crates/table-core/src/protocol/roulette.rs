//! Roulette wheel frame parser.
//!
//! Wire format (ASCII, one frame per line, fields separated by `;`):
//!
//! ```text
//! *H;<status>                     heartbeat / wheel status
//! *S;<round>                      ball launched for wheel round <round>
//! *R;<round>;<position>;<conf>    ball at rest; conf is H (high) or L (low)
//! *W;<code>;<text>                wheel warning (reverse spin, sensor fault)
//! ```
//!
//! A result frame must carry both the position and the confidence flag.  A
//! low-confidence reading is an error, never an observation, so the state
//! machine cannot advance on it.

use crate::domain::event::RouletteObservation;
use crate::protocol::error::DecodeError;

/// Highest pocket on a single-zero wheel.
pub const MAX_POCKET: u8 = 36;

/// Probe written during the handshake to make the wheel answer with a status
/// frame.
pub const STATUS_PROBE: &[u8] = b"*?\r\n";

/// One well-formed wheel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WheelFrame {
    Status(String),
    SpinStarted { round: u64 },
    BallLanded { round: u64, position: u8 },
    Warning { code: String, text: String },
}

impl WheelFrame {
    /// The round observation carried by this frame, if any.
    pub fn observation(&self) -> Option<RouletteObservation> {
        match *self {
            WheelFrame::SpinStarted { round } => Some(RouletteObservation::SpinStarted { round }),
            WheelFrame::BallLanded { round, position } => Some(RouletteObservation::BallLanded {
                round,
                pocket: position,
            }),
            WheelFrame::Status(_) | WheelFrame::Warning { .. } => None,
        }
    }
}

/// Parses one frame (delimiter already removed).
///
/// # Errors
///
/// Returns [`DecodeError`] for unknown frame types, missing or unparsable
/// fields, positions off the wheel and low-confidence readings.
pub fn parse_frame(frame: &[u8]) -> Result<WheelFrame, DecodeError> {
    let text = std::str::from_utf8(frame).map_err(|_| DecodeError::Utf8)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut fields = text.split(';');
    let kind = fields.next().unwrap_or_default();
    match kind {
        "*H" => Ok(WheelFrame::Status(fields.collect::<Vec<_>>().join(";"))),
        "*S" => Ok(WheelFrame::SpinStarted {
            round: parse_round(fields.next())?,
        }),
        "*R" => {
            let round = parse_round(fields.next())?;
            let position = parse_position(fields.next())?;
            match fields.next().map(str::trim) {
                Some("H") | Some("h") => Ok(WheelFrame::BallLanded { round, position }),
                Some("L") | Some("l") => Err(DecodeError::LowConfidence { position }),
                Some(other) => Err(DecodeError::InvalidField {
                    field: "confidence",
                    value: other.to_string(),
                }),
                None => Err(DecodeError::MissingField("confidence")),
            }
        }
        "*W" => {
            let code = fields
                .next()
                .filter(|c| !c.is_empty())
                .ok_or(DecodeError::MissingField("code"))?
                .to_string();
            let text = fields.collect::<Vec<_>>().join(";");
            Ok(WheelFrame::Warning { code, text })
        }
        other => Err(DecodeError::UnknownFrame(other.to_string())),
    }
}

fn parse_round(field: Option<&str>) -> Result<u64, DecodeError> {
    let raw = field.ok_or(DecodeError::MissingField("round"))?;
    raw.trim().parse().map_err(|_| DecodeError::InvalidField {
        field: "round",
        value: raw.to_string(),
    })
}

fn parse_position(field: Option<&str>) -> Result<u8, DecodeError> {
    let raw = field
        .filter(|f| !f.trim().is_empty())
        .ok_or(DecodeError::MissingField("position"))?;
    match raw.trim().parse::<u8>() {
        Ok(position) if position <= MAX_POCKET => Ok(position),
        _ => Err(DecodeError::InvalidField {
            field: "position",
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_confidence_result_is_ball_landed() {
        // Act
        let frame = parse_frame(b"*R;12;17;H").unwrap();

        // Assert
        assert_eq!(frame, WheelFrame::BallLanded { round: 12, position: 17 });
        assert_eq!(
            frame.observation(),
            Some(RouletteObservation::BallLanded { round: 12, pocket: 17 })
        );
    }

    #[test]
    fn test_low_confidence_result_is_an_error() {
        assert_eq!(
            parse_frame(b"*R;12;17;L"),
            Err(DecodeError::LowConfidence { position: 17 })
        );
    }

    #[test]
    fn test_result_without_confidence_is_an_error() {
        assert_eq!(
            parse_frame(b"*R;12;17"),
            Err(DecodeError::MissingField("confidence"))
        );
        assert_eq!(
            parse_frame(b"*R;12;;H"),
            Err(DecodeError::MissingField("position"))
        );
    }

    #[test]
    fn test_position_off_the_wheel_is_rejected() {
        assert!(matches!(
            parse_frame(b"*R;1;37;H"),
            Err(DecodeError::InvalidField { field: "position", .. })
        ));
    }

    #[test]
    fn test_spin_status_and_warning_frames() {
        assert_eq!(parse_frame(b"*S;5").unwrap(), WheelFrame::SpinStarted { round: 5 });
        assert_eq!(
            parse_frame(b"*H;OK").unwrap(),
            WheelFrame::Status("OK".to_string())
        );
        assert_eq!(
            parse_frame(b"*W;RS;reverse spin").unwrap(),
            WheelFrame::Warning {
                code: "RS".to_string(),
                text: "reverse spin".to_string()
            }
        );
        assert_eq!(parse_frame(b"*H;OK").unwrap().observation(), None);
    }

    #[test]
    fn test_garbage_is_unknown_frame() {
        assert!(matches!(parse_frame(b"hello"), Err(DecodeError::UnknownFrame(_))));
        assert_eq!(parse_frame(b"  "), Err(DecodeError::Empty));
        assert_eq!(parse_frame(&[0xff, 0xfe]), Err(DecodeError::Utf8));
    }
}
