//! Per-game protocol decoders.
//!
//! A decoder sits between a transport and the controller's event stream.  It
//! sees one [`Payload`] at a time and says what it means for the game:
//!
//! | Decoded              | Forwarded as                |
//! |----------------------|-----------------------------|
//! | `Observation(obs)`   | `DECODED_RESULT(obs)`       |
//! | `Raw`                | `RAW_FRAME`                 |
//! | `Malformed(reason)`  | `MALFORMED_INPUT`           |
//!
//! Decoders are synchronous and own whatever per-device state the game needs
//! (the baccarat decoder tracks the hand on the layout).  They never fail:
//! unreadable input is a `Malformed` value.

use std::time::{Duration, Instant};

use table_core::domain::cards::BaccaratHand;
use table_core::domain::event::BaccaratObservation;
use table_core::protocol::baccarat::{parse_scan, ScanCode};
use table_core::protocol::roulette::{parse_frame, WheelFrame};
use table_core::protocol::sicbo::ShakerMessage;
use table_core::protocol::{Decoded, DecodeError};
use table_core::{ExceptionCode, GameType, Observation, Severity};
use tracing::debug;

use crate::infrastructure::transport::Payload;

/// Something the device reported that is not round data but deserves an
/// exception event (a wheel warning, for instance).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNotice {
    pub code: ExceptionCode,
    pub severity: Severity,
    pub message: String,
}

/// What one payload meant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoding {
    pub decoded: Decoded<Observation>,
    /// The payload bytes, for RAW_FRAME and MALFORMED_INPUT events.
    pub raw: Vec<u8>,
    pub notice: Option<DeviceNotice>,
}

impl Decoding {
    fn new(decoded: Decoded<Observation>, raw: Vec<u8>) -> Self {
        Self {
            decoded,
            raw,
            notice: None,
        }
    }

    fn malformed(error: DecodeError, raw: Vec<u8>) -> Self {
        Self::new(Decoded::Malformed(error), raw)
    }
}

pub trait ProtocolDecoder: Send + 'static {
    fn game(&self) -> GameType;

    /// Decodes one payload.  `now` is the arrival time, used for debouncing.
    fn decode(&mut self, payload: Payload, now: Instant) -> Decoding;

    /// Forgets per-device state after the transport was lost.
    fn reset(&mut self) {}
}

// ── Roulette ──────────────────────────────────────────────────────────────────

/// Wheel frames from the serial port.
#[derive(Debug, Default)]
pub struct RouletteDecoder;

impl ProtocolDecoder for RouletteDecoder {
    fn game(&self) -> GameType {
        GameType::Roulette
    }

    fn decode(&mut self, payload: Payload, _now: Instant) -> Decoding {
        let raw = payload.raw();
        let kind = payload.kind();
        let Payload::Frame(frame) = payload else {
            return Decoding::malformed(DecodeError::UnexpectedPayload(kind), raw);
        };

        match parse_frame(&frame) {
            Ok(WheelFrame::Warning { code, text }) => Decoding {
                decoded: Decoded::Raw,
                raw,
                notice: Some(DeviceNotice {
                    code: ExceptionCode::WheelWarning,
                    severity: Severity::Warning,
                    message: format!("wheel warning {code}: {text}"),
                }),
            },
            Ok(frame) => match frame.observation() {
                Some(obs) => Decoding::new(Decoded::Observation(Observation::Roulette(obs)), raw),
                None => Decoding::new(Decoded::Raw, raw),
            },
            Err(e) => Decoding::malformed(e, raw),
        }
    }
}

// ── SicBo ─────────────────────────────────────────────────────────────────────

/// Dice shaker JSON messages.  Replays were already filtered by the MQTT
/// transport.
#[derive(Debug, Default)]
pub struct ShakerDecoder;

impl ProtocolDecoder for ShakerDecoder {
    fn game(&self) -> GameType {
        GameType::SicBo
    }

    fn decode(&mut self, payload: Payload, _now: Instant) -> Decoding {
        let raw = payload.raw();
        let body = match &payload {
            Payload::Message { body, .. } => body.as_slice(),
            Payload::Frame(bytes) => bytes.as_slice(),
            other => {
                return Decoding::malformed(DecodeError::UnexpectedPayload(other.kind()), raw)
            }
        };

        let observation = ShakerMessage::from_json(body).and_then(|msg| msg.observation());
        match observation {
            Ok(Some(obs)) => Decoding::new(Decoded::Observation(Observation::SicBo(obs)), raw),
            Ok(None) => Decoding::new(Decoded::Raw, raw),
            Err(e) => Decoding::malformed(e, raw),
        }
    }
}

// ── Baccarat ──────────────────────────────────────────────────────────────────

/// Card scans from the shoe.  Assigns every card its layout position and
/// tells the state machine which card completes the hand.
#[derive(Debug)]
pub struct ScannerDecoder {
    debounce: Duration,
    hand_no: u64,
    hand: BaccaratHand,
    last_scan: Option<(String, Instant)>,
}

impl ScannerDecoder {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            hand_no: 0,
            hand: BaccaratHand::new(),
            last_scan: None,
        }
    }

    /// Number of the hand being dealt (or last dealt).  0 before the first
    /// card.
    pub fn hand_no(&self) -> u64 {
        self.hand_no
    }

    fn is_double_read(&mut self, code: &str, now: Instant) -> bool {
        let repeated = self.last_scan.as_ref().is_some_and(|(last, at)| {
            last == code && now.saturating_duration_since(*at) < self.debounce
        });
        self.last_scan = Some((code.to_string(), now));
        repeated
    }

    fn deal(&mut self, scan: ScanCode) -> Result<Decoded<Observation>, DecodeError> {
        match scan {
            ScanCode::NewHand => {
                let cards = self.hand.card_count();
                let partial = !self.hand.is_empty() && !self.hand.is_complete();
                self.hand = BaccaratHand::new();
                if partial {
                    Err(DecodeError::HandInProgress { cards })
                } else {
                    Ok(Decoded::Raw)
                }
            }
            ScanCode::Card(card) => {
                if self.hand.is_empty() || self.hand.is_complete() {
                    self.hand = BaccaratHand::new();
                    self.hand_no += 1;
                }
                let Some(position) = self.hand.next_position() else {
                    return Err(DecodeError::HandInProgress {
                        cards: self.hand.card_count(),
                    });
                };
                self.hand.place(position, card);
                let completes_hand = self.hand.is_complete();
                debug!(hand = self.hand_no, ?position, %card, completes_hand, "card dealt");
                Ok(Decoded::Observation(Observation::Baccarat(
                    BaccaratObservation::CardDealt {
                        hand: self.hand_no,
                        position,
                        card,
                        completes_hand,
                    },
                )))
            }
        }
    }
}

impl ProtocolDecoder for ScannerDecoder {
    fn game(&self) -> GameType {
        GameType::Baccarat
    }

    fn decode(&mut self, payload: Payload, now: Instant) -> Decoding {
        let raw = payload.raw();
        let code = match payload {
            Payload::Scan(code) => code,
            Payload::Frame(bytes) => match String::from_utf8(bytes) {
                Ok(code) => code,
                Err(_) => return Decoding::malformed(DecodeError::Utf8, raw),
            },
            other => {
                return Decoding::malformed(DecodeError::UnexpectedPayload(other.kind()), raw)
            }
        };
        let code = code.trim().to_string();

        if self.is_double_read(&code, now) {
            return Decoding::malformed(DecodeError::DoubleRead(code), raw);
        }

        match parse_scan(&code).and_then(|scan| self.deal(scan)) {
            Ok(decoded) => Decoding::new(decoded, raw),
            Err(e) => Decoding::malformed(e, raw),
        }
    }

    /// A lost scanner may have missed cards, so the next card starts a new
    /// hand.
    fn reset(&mut self) {
        if !self.hand.is_empty() {
            self.hand = BaccaratHand::new();
        }
        self.last_scan = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use table_core::domain::cards::CardPosition;
    use table_core::domain::event::{RouletteObservation, SicBoObservation};

    fn frame(bytes: &[u8]) -> Payload {
        Payload::Frame(bytes.to_vec())
    }

    fn scan(code: &str) -> Payload {
        Payload::Scan(code.to_string())
    }

    fn dealt(decoding: &Decoding) -> (u64, CardPosition, bool) {
        match &decoding.decoded {
            Decoded::Observation(Observation::Baccarat(BaccaratObservation::CardDealt {
                hand,
                position,
                completes_hand,
                ..
            })) => (*hand, *position, *completes_hand),
            other => panic!("expected a dealt card, got {other:?}"),
        }
    }

    // ── Roulette ──────────────────────────────────────────────────────────────

    #[test]
    fn test_roulette_high_confidence_is_observation() {
        // Act
        let decoding = RouletteDecoder.decode(frame(b"*R;7;17;H"), Instant::now());

        // Assert
        assert_eq!(
            decoding.decoded,
            Decoded::Observation(Observation::Roulette(RouletteObservation::BallLanded {
                round: 7,
                pocket: 17
            }))
        );
        assert_eq!(decoding.notice, None);
    }

    #[test]
    fn test_roulette_low_confidence_is_malformed() {
        let decoding = RouletteDecoder.decode(frame(b"*R;7;17;L"), Instant::now());
        assert_eq!(
            decoding.decoded,
            Decoded::Malformed(DecodeError::LowConfidence { position: 17 })
        );
        assert_eq!(decoding.raw, b"*R;7;17;L".to_vec());
    }

    #[test]
    fn test_roulette_heartbeat_is_raw() {
        let decoding = RouletteDecoder.decode(frame(b"*H;OK"), Instant::now());
        assert_eq!(decoding.decoded, Decoded::Raw);
    }

    #[test]
    fn test_roulette_warning_is_raw_with_notice() {
        // Act
        let decoding = RouletteDecoder.decode(frame(b"*W;RS;reverse spin"), Instant::now());

        // Assert
        assert_eq!(decoding.decoded, Decoded::Raw);
        let notice = decoding.notice.expect("warning notice");
        assert_eq!(notice.code, ExceptionCode::WheelWarning);
        assert_eq!(notice.severity, Severity::Warning);
        assert!(notice.message.contains("reverse spin"));
    }

    #[test]
    fn test_roulette_rejects_scans() {
        let decoding = RouletteDecoder.decode(scan("AS"), Instant::now());
        assert_eq!(
            decoding.decoded,
            Decoded::Malformed(DecodeError::UnexpectedPayload("scan"))
        );
    }

    // ── SicBo ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_shaker_result_with_three_faces_is_observation() {
        // Arrange
        let payload = Payload::Message {
            topic: "table/sb-01/shaker".to_string(),
            body: br#"{"seq":3,"ts":30,"event":"result","round":4,"dice":[4,4,6]}"#.to_vec(),
        };

        // Act
        let decoding = ShakerDecoder.decode(payload, Instant::now());

        // Assert
        assert_eq!(
            decoding.decoded,
            Decoded::Observation(Observation::SicBo(SicBoObservation::DiceSettled {
                round: 4,
                dice: [4, 4, 6]
            }))
        );
    }

    #[test]
    fn test_shaker_partial_result_is_malformed() {
        let payload = Payload::Message {
            topic: "t".to_string(),
            body: br#"{"seq":3,"ts":30,"event":"result","round":4,"dice":[4,4]}"#.to_vec(),
        };
        assert_eq!(
            ShakerDecoder.decode(payload, Instant::now()).decoded,
            Decoded::Malformed(DecodeError::DiceCount(2))
        );
    }

    #[test]
    fn test_shaker_status_is_raw_and_garbage_is_malformed() {
        let status = Payload::Message {
            topic: "t".to_string(),
            body: br#"{"seq":1,"ts":1,"event":"status"}"#.to_vec(),
        };
        let garbage = Payload::Message {
            topic: "t".to_string(),
            body: b"{not json".to_vec(),
        };

        assert_eq!(ShakerDecoder.decode(status, Instant::now()).decoded, Decoded::Raw);
        assert!(matches!(
            ShakerDecoder.decode(garbage, Instant::now()).decoded,
            Decoded::Malformed(DecodeError::Json(_))
        ));
    }

    // ── Baccarat ──────────────────────────────────────────────────────────────

    #[test]
    fn test_scanner_assigns_positions_in_dealing_order() {
        // Arrange: player 2+3 = 5 draws, banker K+K = 0.
        let mut decoder = ScannerDecoder::new(Duration::from_millis(300));
        let start = Instant::now();
        let codes = ["2S", "KH", "3D", "KC"];

        // Act
        let positions: Vec<_> = codes
            .iter()
            .enumerate()
            .map(|(i, c)| dealt(&decoder.decode(scan(c), start + Duration::from_secs(i as u64))))
            .collect();

        // Assert
        assert_eq!(
            positions,
            vec![
                (1, CardPosition::Player1, false),
                (1, CardPosition::Banker1, false),
                (1, CardPosition::Player2, false),
                (1, CardPosition::Banker2, false),
            ]
        );
    }

    #[test]
    fn test_scanner_marks_natural_as_complete_and_starts_next_hand() {
        // Arrange: player 9+K = 9 natural.
        let mut decoder = ScannerDecoder::new(Duration::from_millis(300));
        let t = Instant::now();
        for (i, code) in ["9S", "2H", "KD"].iter().enumerate() {
            decoder.decode(scan(code), t + Duration::from_secs(i as u64));
        }

        // Act
        let last = decoder.decode(scan("3C"), t + Duration::from_secs(3));
        let next = decoder.decode(scan("AS"), t + Duration::from_secs(4));

        // Assert
        assert_eq!(dealt(&last), (1, CardPosition::Banker2, true));
        assert_eq!(dealt(&next), (2, CardPosition::Player1, false));
    }

    #[test]
    fn test_scanner_double_read_is_malformed() {
        // Arrange
        let mut decoder = ScannerDecoder::new(Duration::from_millis(300));
        let t = Instant::now();
        decoder.decode(scan("AS"), t);

        // Act
        let twice = decoder.decode(scan("AS"), t + Duration::from_millis(100));
        let later = decoder.decode(scan("AS"), t + Duration::from_secs(2));

        // Assert
        assert_eq!(
            twice.decoded,
            Decoded::Malformed(DecodeError::DoubleRead("AS".to_string()))
        );
        assert_eq!(dealt(&later), (1, CardPosition::Banker1, false));
    }

    #[test]
    fn test_new_hand_code_mid_hand_is_malformed_and_resets() {
        // Arrange
        let mut decoder = ScannerDecoder::new(Duration::from_millis(300));
        let t = Instant::now();
        decoder.decode(scan("AS"), t);
        decoder.decode(scan("2H"), t + Duration::from_secs(1));

        // Act
        let reset = decoder.decode(scan("#NEW"), t + Duration::from_secs(2));
        let next = decoder.decode(scan("5D"), t + Duration::from_secs(3));

        // Assert
        assert_eq!(
            reset.decoded,
            Decoded::Malformed(DecodeError::HandInProgress { cards: 2 })
        );
        assert_eq!(dealt(&next), (2, CardPosition::Player1, false));
    }

    #[test]
    fn test_new_hand_code_between_hands_is_raw() {
        let mut decoder = ScannerDecoder::new(Duration::from_millis(300));
        let decoding = decoder.decode(scan("#new"), Instant::now());
        assert_eq!(decoding.decoded, Decoded::Raw);
        assert_eq!(decoder.hand_no(), 0);
    }

    #[test]
    fn test_unknown_scan_is_malformed() {
        let mut decoder = ScannerDecoder::new(Duration::from_millis(300));
        assert_eq!(
            decoder.decode(scan("ZZ"), Instant::now()).decoded,
            Decoded::Malformed(DecodeError::UnknownScan("ZZ".to_string()))
        );
    }

    #[test]
    fn test_reset_abandons_partial_hand() {
        let mut decoder = ScannerDecoder::new(Duration::from_millis(300));
        let t = Instant::now();
        decoder.decode(scan("AS"), t);

        decoder.reset();
        let next = decoder.decode(scan("AS"), t + Duration::from_millis(10));

        assert_eq!(dealt(&next), (2, CardPosition::Player1, false));
    }
}
