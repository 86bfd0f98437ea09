//! LPWA provider REST interface
//!
//! Downlink command dispatch and device information lookup against the
//! provider's REST API. The [`DeviceProvider`] trait is the seam the agent
//! core depends on; [`client::HttpDeviceProvider`] is the reqwest
//! implementation.

use crate::error::AgentResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod client;

pub use client::HttpDeviceProvider;

/// Downlink command registration parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandRequest {
    /// Encoded payload to send to the device
    pub data: String,
    /// Downlink port
    pub port: u16,
    /// Whether the device must acknowledge the command
    pub confirmed: bool,
}

/// Provider-side status of a registered command
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Sent,
    Error,
}

/// Provider response to a command registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
    pub command_status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_ts: Option<DateTime<Utc>>,
}

/// Activation status of a device on the provider side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    Activated,
    Deactivated,
}

/// Provider-side device information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(rename = "devEUI", default, skip_serializing_if = "Option::is_none")]
    pub device_eui: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub device_status: DeviceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_communication_ts: Option<DateTime<Utc>>,
}

/// Provider operations used by the agent core
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Register a downlink command for a device
    async fn register_device_command(
        &self,
        device_id: &str,
        command: &CommandRequest,
    ) -> AgentResult<DeviceCommand>;

    /// Fetch device information, including its activation status
    async fn get_device_information(&self, device_id: &str) -> AgentResult<DeviceInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_command_deserializes() {
        let body = json!({
            "id": "cmd-1",
            "data": "4f6e",
            "port": 2,
            "confirmed": false,
            "commandStatus": "SENT",
            "creationTs": "2016-07-11T09:01:02.000Z"
        });
        let command: DeviceCommand = serde_json::from_value(body).unwrap();
        assert_eq!(command.command_status, CommandStatus::Sent);
        assert!(command.creation_ts.is_some());
    }

    #[test]
    fn test_device_info_status() {
        let body = json!({"devEUI": "0018B2000000170B", "deviceStatus": "ACTIVATED"});
        let info: DeviceInfo = serde_json::from_value(body).unwrap();
        assert_eq!(info.device_status, DeviceStatus::Activated);
        assert_eq!(info.device_eui.as_deref(), Some("0018B2000000170B"));
    }

    #[test]
    fn test_command_request_wire_shape() {
        let request = CommandRequest {
            data: "4f6e".to_string(),
            port: 2,
            confirmed: false,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"data": "4f6e", "port": 2, "confirmed": false})
        );
    }
}
