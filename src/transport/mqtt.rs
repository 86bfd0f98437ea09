//! MQTT session against the LPWA provider
//!
//! All devices share one wildcard topic; messages are disambiguated by the
//! envelope's `metadata.source` field. The event loop runs in a spawned task
//! per connection and forwards deserialized messages and connection losses
//! over an mpsc channel. A deserialization failure or a missing source is
//! logged and dropped so a flaky device can never stall the pipeline.

use super::{UplinkEvent, UplinkTransport};
use crate::config::MqttSection;
use crate::error::{AgentError, AgentResult};
use crate::protocol::uplink::IncomingMessage;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};
use url::Url;

/// Fixed wildcard topic carrying telemetry for every device
pub const TELEMETRY_TOPIC: &str = "router/~event/v1/data/new/typ/+/dev/+/con/lora/evt/+/grp/#";
/// MQTT username fixed by the provider; the API key is the password
const MQTT_USERNAME: &str = "payload";
const SUBSCRIBE_QOS: QoS = QoS::AtLeastOnce;
const CONNACK_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Connection state of one MQTT session
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected(String),
}

struct Session {
    client: AsyncClient,
    shutdown_tx: watch::Sender<bool>,
}

/// One MQTT session against the provider broker
pub struct MqttLink {
    config: MqttSection,
    api_key: String,
    client_id: String,
    events_tx: mpsc::Sender<UplinkEvent>,
    session: Mutex<Option<Session>>,
}

impl MqttLink {
    /// Build the link and hand out the event channel consumed by the agent
    pub fn new(
        config: MqttSection,
        api_key: String,
    ) -> AgentResult<(Self, mpsc::Receiver<UplinkEvent>)> {
        if api_key.is_empty() {
            return Err(AgentError::configuration("provider API key is missing"));
        }
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("ngsi-lora-agent-{}", uuid::Uuid::new_v4()));

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Ok((
            Self {
                config,
                api_key,
                client_id,
                events_tx,
                session: Mutex::new(None),
            },
            events_rx,
        ))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Wait until the broker acknowledges the connection
    async fn wait_for_connack(
        mut state_rx: watch::Receiver<ConnectionState>,
    ) -> AgentResult<()> {
        let wait = async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(AgentError::transport("MQTT state channel closed"));
                }
                match &*state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(reason) => {
                        return Err(AgentError::transport(reason.clone()));
                    }
                    ConnectionState::Connecting => continue,
                }
            }
        };

        tokio::time::timeout(CONNACK_TIMEOUT, wait)
            .await
            .map_err(|_| AgentError::transport("No ConnAck received from the MQTT broker"))?
    }
}

/// Build rumqttc options from the configured broker URL
fn configure_mqtt_options(
    config: &MqttSection,
    client_id: &str,
    api_key: &str,
) -> AgentResult<MqttOptions> {
    let url = Url::parse(&config.broker_url).map_err(|_| {
        AgentError::configuration(format!("invalid MQTT broker URL: {}", config.broker_url))
    })?;

    let host = url
        .host_str()
        .ok_or_else(|| {
            AgentError::configuration(format!("MQTT broker URL has no host: {}", config.broker_url))
        })?
        .to_string();
    let secure = matches!(url.scheme(), "mqtts" | "ssl");
    let port = url.port().unwrap_or(if secure { 8883 } else { 1883 });

    let mut options = MqttOptions::new(client_id, host, port);
    if secure {
        options.set_transport(Transport::tls_with_default_config());
    }
    options.set_credentials(MQTT_USERNAME, api_key);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    options.set_clean_session(true);
    Ok(options)
}

/// Deserialize one inbound publish and forward it, or drop it with a log
async fn forward_publish(events_tx: &mpsc::Sender<UplinkEvent>, payload: &[u8]) {
    let message: IncomingMessage = match serde_json::from_slice(payload) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Dropping undecodable uplink message");
            return;
        }
    };

    let device_id = match message.source() {
        Some(source) => source.to_string(),
        None => {
            warn!("Dropping uplink message without a source device identifier");
            return;
        }
    };

    if events_tx
        .send(UplinkEvent::Message { device_id, message })
        .await
        .is_err()
    {
        warn!("Uplink event channel closed, message dropped");
    }
}

#[async_trait]
impl UplinkTransport for MqttLink {
    async fn connect(&self) -> AgentResult<String> {
        let options = configure_mqtt_options(&self.config, &self.client_id, &self.api_key)?;
        let (client, mut event_loop) = AsyncClient::new(options, 10);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let events_tx = self.events_tx.clone();
        let client_id = self.client_id.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!(client_id, "MQTT event loop shut down");
                            break;
                        }
                    }
                    event = event_loop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!(client_id, "Connected to the MQTT broker");
                            let _ = state_tx.send(ConnectionState::Connected);
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            forward_publish(&events_tx, &publish.payload).await;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            let reason = e.to_string();
                            let _ = state_tx.send(ConnectionState::Disconnected(reason.clone()));
                            if !*shutdown_rx.borrow() {
                                warn!(client_id, reason, "MQTT connection lost");
                                let _ = events_tx
                                    .send(UplinkEvent::ConnectionLost { reason })
                                    .await;
                            }
                            break;
                        }
                    }
                }
            }
        });

        Self::wait_for_connack(state_rx).await?;

        let mut session = self.session.lock().await;
        *session = Some(Session {
            client,
            shutdown_tx,
        });
        Ok(self.client_id.clone())
    }

    async fn disconnect(&self) -> AgentResult<String> {
        let mut guard = self.session.lock().await;
        let session = guard
            .take()
            .ok_or_else(|| AgentError::transport("Not connected to the MQTT broker"))?;

        // Stop the event loop first so the disconnect is not reported as a
        // connection loss.
        let _ = session.shutdown_tx.send(true);
        session
            .client
            .disconnect()
            .await
            .map_err(|e| AgentError::transport_caused_by("MQTT disconnect failed", e))?;
        Ok(self.client_id.clone())
    }

    async fn subscribe(&self) -> AgentResult<String> {
        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| AgentError::transport("Not connected to the MQTT broker"))?;

        session
            .client
            .subscribe(TELEMETRY_TOPIC, SUBSCRIBE_QOS)
            .await
            .map_err(|e| AgentError::transport_caused_by("MQTT subscribe failed", e))?;
        Ok(self.client_id.clone())
    }

    async fn unsubscribe(&self) -> AgentResult<String> {
        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| AgentError::transport("Not connected to the MQTT broker"))?;

        session
            .client
            .unsubscribe(TELEMETRY_TOPIC)
            .await
            .map_err(|e| AgentError::transport_caused_by("MQTT unsubscribe failed", e))?;
        Ok(self.client_id.clone())
    }
}
