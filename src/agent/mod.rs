//! Agent orchestration core
//!
//! Coordinates the MQTT uplink, the device registry, the payload converter,
//! the NGSI context broker and the LPWA provider. Collaborators are injected
//! as trait objects at construction so the whole state machine can be
//! exercised against mocks.
//!
//! Failure policy follows the pipeline rule: operations invoked by callers
//! (start, stop, register, unregister) surface errors; operations driven by
//! inbound traffic (uplink routing, command execution) log and absorb them so
//! one misbehaving device never stalls the message pipe.

use crate::broker::ContextBroker;
use crate::converter::PayloadConverter;
use crate::error::{AgentError, AgentResult};
use crate::protocol::ngsi::ContextAttribute;
use crate::protocol::uplink::IncomingMessage;
use crate::provider::{CommandRequest, CommandStatus, DeviceProvider};
use crate::registry::{Device, DeviceRecord, DeviceRegistry};
use crate::transport::{UplinkEvent, UplinkTransport};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub mod renewal;

/// Callback fired when automatic reconnection has failed and the owning
/// process must decide what to do
pub type ConnectionLostCallback = Box<dyn Fn() + Send + Sync>;

/// The agent core
pub struct Agent {
    registry: Arc<dyn DeviceRegistry>,
    broker: Arc<dyn ContextBroker>,
    provider: Arc<dyn DeviceProvider>,
    transport: Arc<dyn UplinkTransport>,
    converter: RwLock<Option<Arc<dyn PayloadConverter>>>,
    /// Guard ensuring a single in-flight reconnect attempt; checked and set
    /// atomically, never held across the backoff sleep
    reconnecting: AtomicBool,
    reconnect_delay: Duration,
    connection_lost_callback: RwLock<Option<ConnectionLostCallback>>,
}

impl Agent {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        broker: Arc<dyn ContextBroker>,
        provider: Arc<dyn DeviceProvider>,
        transport: Arc<dyn UplinkTransport>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            registry,
            broker,
            provider,
            transport,
            converter: RwLock::new(None),
            reconnecting: AtomicBool::new(false),
            reconnect_delay,
            connection_lost_callback: RwLock::new(None),
        }
    }

    /// Register the callback fired when automatic recovery gives up
    pub async fn set_connection_lost_callback(&self, callback: ConnectionLostCallback) {
        *self.connection_lost_callback.write().await = Some(callback);
    }

    /// Start the agent: store the converter, connect and subscribe
    ///
    /// Running start again fully re-runs connect plus subscribe; the
    /// reconnection path relies on this.
    pub async fn start(&self, converter: Arc<dyn PayloadConverter>) -> AgentResult<()> {
        debug!("Starting the agent");
        *self.converter.write().await = Some(converter);
        self.connect_and_subscribe().await
    }

    /// Stop the agent by disconnecting the MQTT session; device state is
    /// left untouched
    pub async fn stop(&self) -> AgentResult<()> {
        let client_id = self.transport.disconnect().await?;
        debug!(client_id, "Disconnected from the MQTT broker");
        Ok(())
    }

    async fn connect_and_subscribe(&self) -> AgentResult<()> {
        debug!("Connecting to the MQTT broker");
        self.transport.connect().await.map_err(|e| {
            error!(error = %e, "Unable to connect to the MQTT broker");
            e
        })?;

        debug!("Subscribing to the telemetry topic");
        if let Err(e) = self.transport.subscribe().await {
            error!(error = %e, "Unable to subscribe to the telemetry topic");
            // Tear the session down rather than leaving it half open.
            if let Err(disconnect_err) = self.transport.disconnect().await {
                debug!(error = %disconnect_err, "Disconnect after failed subscribe also failed");
            }
            return Err(e);
        }

        info!("Agent started");
        Ok(())
    }

    /// Register a device, creating or replacing its command subscription
    pub async fn register(&self, device: &Device) -> AgentResult<()> {
        device.validate().map_err(|e| {
            error!(error = %e, "Unable to register the device");
            e
        })?;
        let device_id = device.id()?;

        // A device without commands is a pure sensor: no subscription needed.
        let subscription_id = if device.commands.is_empty() {
            None
        } else {
            if let Some(existing) = self.registry.find_by_id(device_id).await? {
                if let Some(old_id) = existing.subscription_id {
                    debug!(
                        device_id,
                        subscription_id = old_id,
                        "A subscription already exists, removing it before re-subscribing"
                    );
                    if let Err(e) = self.broker.unsubscribe(&old_id).await {
                        warn!(
                            device_id,
                            error = %e,
                            "Unable to remove the previous subscription, replacing it anyway"
                        );
                    }
                }
            }
            Some(self.broker.subscribe_to_commands(device).await?)
        };

        let record = DeviceRecord::from_device(device, subscription_id)?;
        self.registry.save(record).await?;
        debug!(device_id, "Device registered");
        Ok(())
    }

    /// Unregister a device
    ///
    /// The broker unsubscribe happens first; if it fails the record is kept
    /// so the registry and the broker never diverge.
    pub async fn unregister(&self, device_id: &str) -> AgentResult<()> {
        let record = self
            .registry
            .find_by_id(device_id)
            .await?
            .ok_or_else(|| AgentError::UnknownDevice(device_id.to_string()))?;

        if let Some(subscription_id) = &record.subscription_id {
            self.broker.unsubscribe(subscription_id).await?;
        }
        self.registry.delete(device_id).await?;
        debug!(device_id, "Device unregistered");
        Ok(())
    }

    /// Route one inbound device message to the context broker
    ///
    /// Every failure path logs and drops; the MQTT pipe must never stall on
    /// a single bad message.
    pub async fn handle_uplink(&self, device_id: &str, message: IncomingMessage) {
        let record = match self.registry.find_by_id(device_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                error!(device_id, "Device not registered, message dropped");
                return;
            }
            Err(e) => {
                error!(device_id, error = %e, "Registry lookup failed, message dropped");
                return;
            }
        };

        let Some(payload) = message.payload() else {
            error!(device_id, "Payload not found, message dropped");
            return;
        };

        let converter = match self.converter.read().await.clone() {
            Some(converter) => converter,
            None => {
                error!(device_id, "Converter is not defined, message dropped");
                return;
            }
        };

        let attributes = converter.decode(device_id, payload, &message);
        if let Err(e) = self
            .broker
            .update_attributes(&record.entity(), &attributes)
            .await
        {
            error!(device_id, error = %e, "Unable to push the uplink message to the context broker");
        }
    }

    /// Dispatch one downlink command for a device
    ///
    /// Never fails to its caller: every failure path resolves as
    /// `(false, now)`, success resolves as `(true, creation timestamp)`.
    pub async fn execute_command(
        &self,
        device_id: &str,
        command_name: &str,
        attribute: &ContextAttribute,
    ) -> (bool, DateTime<Utc>) {
        let record = match self.registry.find_by_id(device_id).await {
            Ok(Some(record)) => record,
            _ => {
                warn!(device_id, command_name, "Unknown device, command not sent");
                return (false, Utc::now());
            }
        };
        let converter = match self.converter.read().await.clone() {
            Some(converter) => converter,
            None => {
                warn!(device_id, command_name, "Converter is not defined, command not sent");
                return (false, Utc::now());
            }
        };

        let Some(encoded) = converter.encode_command(device_id, command_name, attribute) else {
            warn!(device_id, command_name, "Encoded payload is empty, command not sent");
            return (false, Utc::now());
        };

        let command = CommandRequest {
            data: encoded,
            port: record.port,
            confirmed: false,
        };
        match self.provider.register_device_command(device_id, &command).await {
            Ok(result) => {
                let success = result.command_status == CommandStatus::Sent;
                if success {
                    debug!(device_id, command_name, "Command sent to the provider");
                    (true, result.creation_ts.unwrap_or_else(Utc::now))
                } else {
                    warn!(device_id, command_name, "Provider did not accept the command");
                    (false, Utc::now())
                }
            }
            Err(e) => {
                error!(device_id, command_name, error = %e, "Error sending command to the provider");
                (false, Utc::now())
            }
        }
    }

    /// React to a lost MQTT connection
    ///
    /// Only one reconnect attempt may be in flight; a connection-lost event
    /// arriving while reconnecting is ignored.
    pub fn handle_connection_lost(self: Arc<Self>, reason: &str) {
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Reconnection already in progress, connection-lost event ignored");
            return;
        }

        warn!(reason, "Connection lost with the MQTT broker, waiting before reconnect");
        let agent = self;
        tokio::spawn(async move {
            tokio::time::sleep(agent.reconnect_delay).await;
            debug!("Reconnecting to the MQTT broker");
            match agent.reconnect().await {
                Ok(()) => debug!("Reconnected to the MQTT broker"),
                Err(e) => {
                    error!(error = %e, "Reconnection failed to the MQTT broker");
                    if let Some(callback) = agent.connection_lost_callback.read().await.as_ref() {
                        callback();
                    }
                }
            }
            agent.reconnecting.store(false, Ordering::SeqCst);
        });
    }

    async fn reconnect(&self) -> AgentResult<()> {
        if self.converter.read().await.is_none() {
            return Err(AgentError::configuration(
                "payload converter is missing, cannot reconnect",
            ));
        }
        self.connect_and_subscribe().await
    }

    /// Consume transport events until the channel closes
    ///
    /// Each inbound message is processed in its own task; there is no
    /// cross-message ordering guarantee.
    pub fn run(self: Arc<Self>, mut events: mpsc::Receiver<UplinkEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    UplinkEvent::Message { device_id, message } => {
                        let agent = Arc::clone(&self);
                        tokio::spawn(async move {
                            agent.handle_uplink(&device_id, message).await;
                        });
                    }
                    UplinkEvent::ConnectionLost { reason } => {
                        Arc::clone(&self).handle_connection_lost(&reason);
                    }
                }
            }
            debug!("Uplink event channel closed, agent event loop stopped");
        })
    }
}
