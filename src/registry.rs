//! Device registry
//!
//! The registry is the agent's view of registered devices and the broker
//! subscription each one holds. Persistence is behind the [`DeviceRegistry`]
//! trait so deployments can plug in an external store; the crate ships an
//! in-memory implementation.

use crate::error::{AgentError, AgentResult};
use crate::protocol::ngsi::EntityId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Device registration request
///
/// All fields except `commands` are required; they are `Option` here so a
/// partial JSON body deserializes and validation can name the missing field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Device {
    #[serde(rename = "deviceID")]
    pub device_id: Option<String>,
    pub port: Option<u16>,
    #[serde(rename = "entityName")]
    pub entity_name: Option<String>,
    #[serde(rename = "entityType")]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl Device {
    pub fn id(&self) -> AgentResult<&str> {
        self.device_id
            .as_deref()
            .ok_or_else(|| AgentError::configuration("device deviceID is missing"))
    }

    pub fn port(&self) -> AgentResult<u16> {
        self.port
            .ok_or_else(|| AgentError::configuration("device port is missing"))
    }

    pub fn entity_name(&self) -> AgentResult<&str> {
        self.entity_name
            .as_deref()
            .ok_or_else(|| AgentError::configuration("entity name is missing"))
    }

    pub fn entity_type(&self) -> AgentResult<&str> {
        self.entity_type
            .as_deref()
            .ok_or_else(|| AgentError::configuration("entity type is missing"))
    }

    /// Check every required field, reporting the first one missing
    pub fn validate(&self) -> AgentResult<()> {
        self.id()?;
        self.port()?;
        self.entity_name()?;
        self.entity_type()?;
        Ok(())
    }
}

/// Persisted record of a registered device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceRecord {
    pub device_id: String,
    pub entity_name: String,
    pub entity_type: String,
    pub port: u16,
    pub commands: Vec<String>,
    /// Identifier of the live command subscription on the broker, or `None`
    /// for a device registered without commands
    pub subscription_id: Option<String>,
}

impl DeviceRecord {
    /// Build a record from a validated registration request
    pub fn from_device(device: &Device, subscription_id: Option<String>) -> AgentResult<Self> {
        device.validate()?;
        Ok(Self {
            device_id: device.id()?.to_string(),
            entity_name: device.entity_name()?.to_string(),
            entity_type: device.entity_type()?.to_string(),
            port: device.port()?,
            commands: device.commands.clone(),
            subscription_id,
        })
    }

    /// Entity identity this device reports into
    pub fn entity(&self) -> EntityId {
        EntityId::new(&self.entity_name, &self.entity_type)
    }
}

/// Keyed store of registered devices
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn find_by_id(&self, device_id: &str) -> AgentResult<Option<DeviceRecord>>;
    async fn save(&self, record: DeviceRecord) -> AgentResult<()>;
    async fn delete(&self, device_id: &str) -> AgentResult<()>;
    async fn find_all(&self) -> AgentResult<Vec<DeviceRecord>>;
}

/// In-memory registry implementation
#[derive(Debug, Default)]
pub struct InMemoryDeviceRegistry {
    devices: RwLock<HashMap<String, DeviceRecord>>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryDeviceRegistry {
    async fn find_by_id(&self, device_id: &str) -> AgentResult<Option<DeviceRecord>> {
        Ok(self.devices.read().await.get(device_id).cloned())
    }

    async fn save(&self, record: DeviceRecord) -> AgentResult<()> {
        self.devices
            .write()
            .await
            .insert(record.device_id.clone(), record);
        Ok(())
    }

    async fn delete(&self, device_id: &str) -> AgentResult<()> {
        self.devices.write().await.remove(device_id);
        Ok(())
    }

    async fn find_all(&self) -> AgentResult<Vec<DeviceRecord>> {
        Ok(self.devices.read().await.values().cloned().collect())
    }
}
