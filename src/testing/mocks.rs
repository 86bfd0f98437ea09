//! Mock implementations for testing
//!
//! Provides mock ContextBroker, DeviceProvider and UplinkTransport
//! implementations to enable comprehensive testing without external services.

use crate::broker::ContextBroker;
use crate::error::{AgentError, AgentResult};
use crate::protocol::ngsi::{ContextAttribute, EntityId};
use crate::provider::{
    CommandRequest, CommandStatus, DeviceCommand, DeviceInfo, DeviceProvider, DeviceStatus,
};
use crate::registry::Device;
use crate::transport::UplinkTransport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mock context broker recording every call
#[derive(Debug, Default)]
pub struct MockContextBroker {
    pub subscribed_devices: Arc<Mutex<Vec<Device>>>,
    pub renewed_subscriptions: Arc<Mutex<Vec<String>>>,
    pub cancelled_subscriptions: Arc<Mutex<Vec<String>>>,
    pub updated_attributes: Arc<Mutex<Vec<(EntityId, Vec<ContextAttribute>)>>>,
    subscription_counter: AtomicUsize,
    fail_subscribe: AtomicBool,
    fail_update: AtomicBool,
    failing_renewals: Arc<Mutex<Vec<String>>>,
}

impl MockContextBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscribe_failure() -> Self {
        let broker = Self::default();
        broker.fail_subscribe.store(true, Ordering::SeqCst);
        broker
    }

    pub fn set_update_failure(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub async fn set_renewal_failure(&self, subscription_id: &str) {
        self.failing_renewals
            .lock()
            .await
            .push(subscription_id.to_string());
    }

    pub async fn get_renewed_subscriptions(&self) -> Vec<String> {
        self.renewed_subscriptions.lock().await.clone()
    }

    pub async fn get_updated_attributes(&self) -> Vec<(EntityId, Vec<ContextAttribute>)> {
        self.updated_attributes.lock().await.clone()
    }

    pub async fn get_cancelled_subscriptions(&self) -> Vec<String> {
        self.cancelled_subscriptions.lock().await.clone()
    }
}

#[async_trait]
impl ContextBroker for MockContextBroker {
    async fn subscribe_to_commands(&self, device: &Device) -> AgentResult<String> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(AgentError::broker_rejection("mock subscribe failure"));
        }
        self.subscribed_devices.lock().await.push(device.clone());
        let n = self.subscription_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("sub-{n}"))
    }

    async fn update_subscription(&self, subscription_id: &str) -> AgentResult<()> {
        if self
            .failing_renewals
            .lock()
            .await
            .iter()
            .any(|id| id == subscription_id)
        {
            return Err(AgentError::broker_rejection("mock renewal failure"));
        }
        self.renewed_subscriptions
            .lock()
            .await
            .push(subscription_id.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, subscription_id: &str) -> AgentResult<()> {
        self.cancelled_subscriptions
            .lock()
            .await
            .push(subscription_id.to_string());
        Ok(())
    }

    async fn update_attributes(
        &self,
        entity: &EntityId,
        attributes: &[ContextAttribute],
    ) -> AgentResult<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(AgentError::broker_rejection("mock update failure"));
        }
        self.updated_attributes
            .lock()
            .await
            .push((entity.clone(), attributes.to_vec()));
        Ok(())
    }
}

/// Mock LPWA provider recording dispatched commands
#[derive(Debug)]
pub struct MockDeviceProvider {
    pub registered_commands: Arc<Mutex<Vec<(String, CommandRequest)>>>,
    command_status: CommandStatus,
    should_fail: bool,
    creation_ts: Option<DateTime<Utc>>,
}

impl Default for MockDeviceProvider {
    fn default() -> Self {
        Self {
            registered_commands: Arc::new(Mutex::new(Vec::new())),
            command_status: CommandStatus::Sent,
            should_fail: false,
            creation_ts: None,
        }
    }
}

impl MockDeviceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(command_status: CommandStatus) -> Self {
        Self {
            command_status,
            ..Default::default()
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn with_creation_ts(creation_ts: DateTime<Utc>) -> Self {
        Self {
            creation_ts: Some(creation_ts),
            ..Default::default()
        }
    }

    pub async fn get_registered_commands(&self) -> Vec<(String, CommandRequest)> {
        self.registered_commands.lock().await.clone()
    }
}

#[async_trait]
impl DeviceProvider for MockDeviceProvider {
    async fn register_device_command(
        &self,
        device_id: &str,
        command: &CommandRequest,
    ) -> AgentResult<DeviceCommand> {
        if self.should_fail {
            return Err(AgentError::transport("mock command registration failure"));
        }
        self.registered_commands
            .lock()
            .await
            .push((device_id.to_string(), command.clone()));
        Ok(DeviceCommand {
            id: Some("cmd-1".to_string()),
            data: Some(command.data.clone()),
            port: Some(command.port),
            confirmed: Some(command.confirmed),
            command_status: self.command_status,
            creation_ts: self.creation_ts,
        })
    }

    async fn get_device_information(&self, device_id: &str) -> AgentResult<DeviceInfo> {
        if self.should_fail {
            return Err(AgentError::transport("mock device lookup failure"));
        }
        Ok(DeviceInfo {
            device_eui: Some(device_id.to_string()),
            name: Some("mock device".to_string()),
            device_status: DeviceStatus::Activated,
            last_communication_ts: None,
        })
    }
}

/// Mock uplink transport counting lifecycle calls
#[derive(Debug, Default)]
pub struct MockUplinkTransport {
    pub connect_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
    pub unsubscribe_calls: AtomicUsize,
    fail_connect: AtomicBool,
    fail_subscribe: AtomicBool,
}

impl MockUplinkTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_failure() -> Self {
        let transport = Self::default();
        transport.fail_connect.store(true, Ordering::SeqCst);
        transport
    }

    pub fn with_subscribe_failure() -> Self {
        let transport = Self::default();
        transport.fail_subscribe.store(true, Ordering::SeqCst);
        transport
    }

    pub fn set_connect_failure(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UplinkTransport for MockUplinkTransport {
    async fn connect(&self) -> AgentResult<String> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(AgentError::transport("mock connect failure"));
        }
        Ok("mock-client".to_string())
    }

    async fn disconnect(&self) -> AgentResult<String> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok("mock-client".to_string())
    }

    async fn subscribe(&self) -> AgentResult<String> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(AgentError::transport("mock subscribe failure"));
        }
        Ok("mock-client".to_string())
    }

    async fn unsubscribe(&self) -> AgentResult<String> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok("mock-client".to_string())
    }
}

/// A fully populated registration request for tests
pub fn sample_device(device_id: &str, commands: &[&str]) -> Device {
    Device {
        device_id: Some(device_id.to_string()),
        port: Some(2),
        entity_name: Some(format!("entity-{device_id}")),
        entity_type: Some("Lamp".to_string()),
        commands: commands.iter().map(|c| c.to_string()).collect(),
    }
}
