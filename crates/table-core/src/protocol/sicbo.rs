//! SicBo dice shaker message parser.
//!
//! The shaker publishes JSON on its MQTT topic:
//!
//! ```json
//! {"seq": 41, "ts": 1718000000123, "event": "result", "round": 9, "dice": [4, 4, 6]}
//! ```
//!
//! `event` is `shake`, `result` or `status`.  A result must report all three
//! faces at once; anything else is malformed.

use serde::{Deserialize, Serialize};

use crate::domain::event::SicBoObservation;
use crate::protocol::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShakerEvent {
    Shake,
    Result,
    Status,
}

/// One shaker message as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShakerMessage {
    pub seq: u64,
    pub ts: u64,
    pub event: ShakerEvent,
    #[serde(default)]
    pub round: u64,
    #[serde(default)]
    pub dice: Vec<u8>,
}

impl ShakerMessage {
    /// Parses the JSON body of one MQTT publish.
    pub fn from_json(body: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(body).map_err(|e| DecodeError::Json(e.to_string()))
    }

    /// The observation carried by the message, or `None` for status messages.
    ///
    /// # Errors
    ///
    /// A result with other than three faces, or a face outside 1–6.
    pub fn observation(&self) -> Result<Option<SicBoObservation>, DecodeError> {
        match self.event {
            ShakerEvent::Status => Ok(None),
            ShakerEvent::Shake => Ok(Some(SicBoObservation::ShakeStarted { round: self.round })),
            ShakerEvent::Result => {
                let dice: [u8; 3] = self
                    .dice
                    .as_slice()
                    .try_into()
                    .map_err(|_| DecodeError::DiceCount(self.dice.len()))?;
                if let Some(&face) = dice.iter().find(|d| !(1..=6).contains(*d)) {
                    return Err(DecodeError::DieFace(face));
                }
                Ok(Some(SicBoObservation::DiceSettled {
                    round: self.round,
                    dice,
                }))
            }
        }
    }
}

/// Command published to the shaker's command topic.  `status` doubles as the
/// handshake probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShakerCommand {
    pub command: String,
}

impl ShakerCommand {
    pub fn status_probe() -> Self {
        Self {
            command: "status".to_string(),
        }
    }

    pub fn to_json(&self) -> Vec<u8> {
        // Serialising a struct of one String cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}
