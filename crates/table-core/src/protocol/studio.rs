//! JSON messages exchanged with the Studio service.
//!
//! Every WebSocket text frame is one [`WireMessage`]:
//!
//! ```json
//! {"type": "result", "table_id": "RL-01", "payload": {...}, "seq": 17, "replay": true}
//! ```
//!
//! `replay` is omitted when false.  Outbound `seq` is the push sequence of the
//! remote sync client; an inbound `ack` carries the highest delivered `seq`.
//! Inbound `command` messages carry `{"command": "force_reset" | "stop" |
//! "request_status"}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::event::ExceptionEvent;
use crate::domain::machine::Notification;
use crate::protocol::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Status,
    Result,
    Exception,
    Command,
    Ack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub table_id: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub seq: u64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub replay: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl WireMessage {
    pub fn new(kind: MessageKind, table_id: impl Into<String>, payload: Value, seq: u64) -> Self {
        Self {
            kind,
            table_id: table_id.into(),
            payload,
            seq,
            replay: false,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))
    }

    /// Interprets an inbound `command` message.
    pub fn command(&self) -> Result<RemoteCommand, DecodeError> {
        if self.kind != MessageKind::Command {
            return Err(DecodeError::InvalidField {
                field: "type",
                value: format!("{:?}", self.kind).to_lowercase(),
            });
        }
        let body: CommandBody = serde_json::from_value(self.payload.clone())
            .map_err(|e| DecodeError::Json(e.to_string()))?;
        Ok(body.command)
    }
}

/// Commands the Studio can send to a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCommand {
    /// Drop the in-flight round; recover from ERROR when the transport is up.
    ForceReset,
    Stop,
    RequestStatus,
}

#[derive(Debug, Deserialize, Serialize)]
struct CommandBody {
    command: RemoteCommand,
}

/// The body of a message before the remote sync client assigns its `seq`.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub kind: MessageKind,
    pub payload: Value,
}

impl Outbound {
    pub fn from_notification(notification: &Notification) -> Self {
        match notification {
            Notification::ProcessChanged { from, to, reason } => Outbound {
                kind: MessageKind::Status,
                payload: json!({
                    "event": "process_changed",
                    "from": from,
                    "to": to,
                    "reason": reason,
                }),
            },
            Notification::RoundAdvanced { from, to } => Outbound {
                kind: MessageKind::Status,
                payload: json!({
                    "event": "round_advanced",
                    "from": from,
                    "to": to,
                }),
            },
            Notification::Status(status) => Outbound {
                kind: MessageKind::Status,
                payload: json!({
                    "event": "snapshot",
                    "status": status,
                }),
            },
            Notification::Result(result) => Outbound {
                kind: MessageKind::Result,
                payload: serde_json::to_value(result).unwrap_or_default(),
            },
            Notification::Exception(event) => Self::exception(event),
        }
    }

    pub fn exception(event: &ExceptionEvent) -> Self {
        Outbound {
            kind: MessageKind::Exception,
            payload: serde_json::to_value(event).unwrap_or_default(),
        }
    }

    pub fn into_wire(self, table_id: &str, seq: u64) -> WireMessage {
        WireMessage::new(self.kind, table_id, self.payload, seq)
    }
}

/// Payload sent to the external alert channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub error_message: String,
    pub error_code: String,
    pub table_name: String,
    pub environment: String,
}

impl AlertPayload {
    pub fn from_exception(event: &ExceptionEvent, environment: &str) -> Self {
        Self {
            error_message: event.message.clone(),
            error_code: event.code.as_str().to_string(),
            table_name: event.table_id.clone(),
            environment: environment.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{ExceptionCode, Severity};
    use crate::domain::process::ProcessState;
    use crate::domain::result::RoundResult;

    #[test]
    fn test_replay_flag_is_omitted_when_false() {
        // Arrange
        let mut msg = WireMessage::new(MessageKind::Status, "RL-01", json!({}), 3);

        // Act
        let plain = msg.to_json().unwrap();
        msg.replay = true;
        let replayed = msg.to_json().unwrap();

        // Assert
        assert!(!plain.contains("replay"));
        assert!(replayed.contains("\"replay\":true"));
        assert!(plain.contains("\"type\":\"status\""));
    }

    #[test]
    fn test_inbound_command_is_parsed() {
        let msg = WireMessage::from_json(
            r#"{"type":"command","table_id":"RL-01","payload":{"command":"force_reset"},"seq":0}"#,
        )
        .unwrap();
        assert_eq!(msg.command(), Ok(RemoteCommand::ForceReset));
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        let msg = WireMessage::from_json(
            r#"{"type":"command","payload":{"command":"self_destruct"}}"#,
        )
        .unwrap();
        assert!(matches!(msg.command(), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_ack_without_payload_parses() {
        let msg = WireMessage::from_json(r#"{"type":"ack","seq":12}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Ack);
        assert_eq!(msg.seq, 12);
    }

    #[test]
    fn test_notifications_map_to_message_kinds() {
        // Arrange
        let changed = Notification::ProcessChanged {
            from: ProcessState::Running,
            to: ProcessState::Error,
            reason: "transport".into(),
        };
        let result = Notification::Result(RoundResult::roulette(1, 0));

        // Act
        let a = Outbound::from_notification(&changed);
        let b = Outbound::from_notification(&result);

        // Assert
        assert_eq!(a.kind, MessageKind::Status);
        assert_eq!(a.payload["to"], "ERROR");
        assert_eq!(b.kind, MessageKind::Result);
        assert_eq!(b.payload["colour"], "green");
    }

    #[test]
    fn test_alert_payload_uses_external_field_names() {
        let event = ExceptionEvent::new(
            ExceptionCode::TransportLost,
            Severity::Error,
            "SB-02",
            "shaker offline",
            1,
        );
        let json = serde_json::to_value(AlertPayload::from_exception(&event, "prod")).unwrap();
        assert_eq!(
            json,
            json!({
                "error_message": "shaker offline",
                "error_code": "TRANSPORT_LOST",
                "table_name": "SB-02",
                "environment": "prod",
            })
        );
    }
}
