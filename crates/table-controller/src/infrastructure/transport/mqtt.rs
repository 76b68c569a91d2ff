//! MQTT transport (dice shaker).
//!
//! The shaker publishes JSON messages on `topic` and listens for commands on
//! `command_topic`.  The broker connection is driven by a `rumqttc`
//! [`EventLoop`]: nothing is sent or received unless `poll()` is awaited, so
//! `read` is where the connection actually makes progress.
//!
//! # Replays
//!
//! Brokers redeliver the retained message on every subscribe and may redeliver
//! QoS 1 messages after a reconnect.  Every shaker message embeds its own
//! `seq` and `ts`; a [`ReplayFilter`] drops deliveries that are not newer than
//! the last one handed out.  The filter survives reconnects, which is exactly
//! when replays happen.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use table_core::protocol::envelope::ReplayFilter;
use table_core::protocol::sicbo::ShakerCommand;

use super::{Payload, Transport, TransportError};

/// `[transport]` settings for `kind = "mqtt"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_broker_host")]
    pub broker_host: String,
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    /// MQTT client identifier.  Must be unique per broker.
    pub client_id: String,
    /// Topic the shaker publishes on.
    pub topic: String,
    /// Topic the shaker listens on.
    pub command_topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Read timeout.  The shaker reports status more often than this.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_broker_host() -> String {
    "127.0.0.1".to_string()
}
fn default_broker_port() -> u16 {
    1883
}
fn default_keep_alive_secs() -> u64 {
    10
}
fn default_timeout_ms() -> u64 {
    5_000
}

/// The ordering stamp every device message carries.
#[derive(Debug, Deserialize)]
struct Stamp {
    seq: u64,
    ts: u64,
}

pub struct MqttTransport {
    config: MqttConfig,
    client: Option<AsyncClient>,
    eventloop: Option<EventLoop>,
    replays: ReplayFilter,
}

impl MqttTransport {
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            client: None,
            eventloop: None,
            replays: ReplayFilter::new(),
        }
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.broker_host.clone(),
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));
        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            options.set_credentials(user.clone(), pass.clone());
        }
        options
    }

    /// `true` if the message is fresh, `false` if it is a replay.  Messages
    /// without a stamp pass through; the decoder reports them.
    fn admit(&mut self, body: &[u8]) -> bool {
        match serde_json::from_slice::<Stamp>(body) {
            Ok(stamp) => self.replays.admit(stamp.seq, stamp.ts),
            Err(_) => true,
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), 32);
        client
            .subscribe(self.config.topic.clone(), QoS::AtLeastOnce)
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let deadline = Instant::now() + self.read_timeout();
        loop {
            match timeout_at(deadline, eventloop.poll()).await {
                Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => break,
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(TransportError::Unavailable(e.to_string())),
                Err(_) => {
                    return Err(TransportError::Unavailable(format!(
                        "no CONNACK from {}:{}",
                        self.config.broker_host, self.config.broker_port
                    )))
                }
            }
        }

        info!(
            broker = %self.config.broker_host,
            port = self.config.broker_port,
            topic = %self.config.topic,
            "connected to MQTT broker"
        );
        self.client = Some(client);
        self.eventloop = Some(eventloop);
        Ok(())
    }

    async fn handshake(&mut self) -> Result<(), TransportError> {
        let probe = ShakerCommand::status_probe().to_json();
        self.write(&probe).await?;
        let reply = self.read().await?;
        debug!(kind = reply.kind(), "mqtt handshake reply");
        Ok(())
    }

    async fn read(&mut self) -> Result<Payload, TransportError> {
        let read_timeout = self.read_timeout();
        let deadline = Instant::now() + read_timeout;
        loop {
            let eventloop = self
                .eventloop
                .as_mut()
                .ok_or_else(|| TransportError::Closed("not connected".to_string()))?;

            match timeout_at(deadline, eventloop.poll()).await {
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    if publish.topic != self.config.topic {
                        continue;
                    }
                    let body = publish.payload.to_vec();
                    if !self.admit(&body) {
                        debug!(topic = %publish.topic, "replayed message dropped");
                        continue;
                    }
                    return Ok(Payload::Message {
                        topic: publish.topic,
                        body,
                    });
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(TransportError::Closed(e.to_string())),
                Err(_) => {
                    return Err(TransportError::Timeout {
                        ms: read_timeout.as_millis() as u64,
                    })
                }
            }
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| TransportError::Write("not connected".to_string()))?;
        client
            .publish(
                self.config.command_topic.clone(),
                QoS::AtLeastOnce,
                false,
                bytes.to_vec(),
            )
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.eventloop = None;
        if let Some(client) = self.client.take() {
            if let Err(e) = client.disconnect().await {
                // The event loop is already gone; the broker notices the
                // dropped socket on its own.
                warn!("mqtt disconnect request failed: {e}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MqttConfig {
        toml::from_str(
            r#"
client_id = "sb-02"
topic = "tables/sb-02/shaker"
command_topic = "tables/sb-02/shaker/cmd"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_mqtt_config_defaults() {
        let cfg = config();
        assert_eq!(cfg.broker_host, "127.0.0.1");
        assert_eq!(cfg.broker_port, 1883);
        assert_eq!(cfg.keep_alive_secs, 10);
        assert!(cfg.username.is_none());
    }

    #[test]
    fn test_replayed_stamp_is_not_admitted() {
        // Arrange
        let mut transport = MqttTransport::new(config());
        let body = br#"{"seq":4,"ts":100,"event":"status"}"#;

        // Act
        let first = transport.admit(body);
        let replay = transport.admit(body);

        // Assert
        assert!(first);
        assert!(!replay);
    }

    #[test]
    fn test_unstamped_body_passes_through_to_decoder() {
        let mut transport = MqttTransport::new(config());
        assert!(transport.admit(b"not json"));
        assert!(transport.admit(b"not json"));
    }

    #[tokio::test]
    async fn test_write_before_open_fails() {
        let mut transport = MqttTransport::new(config());
        assert!(matches!(
            transport.write(b"{}").await,
            Err(TransportError::Write(_))
        ));
    }
}
