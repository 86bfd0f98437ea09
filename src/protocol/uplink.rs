//! Uplink telemetry envelope
//!
//! JSON shape of the messages the LPWA provider publishes on the shared MQTT
//! topic. Devices are not disambiguated by topic but by the `metadata.source`
//! field of the envelope. Unknown fields are ignored so provider-side schema
//! additions do not break deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Telemetry envelope for one inbound device message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    /// Arbitrary key to value measurement map reported by the device
    #[serde(default)]
    pub value: Map<String, Value>,
}

impl IncomingMessage {
    /// Raw device payload, carried in the `payload` entry of the value map
    pub fn payload(&self) -> Option<&str> {
        self.value.get("payload").and_then(Value::as_str)
    }

    /// Originating device identifier from the message metadata
    pub fn source(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.source.as_deref())
    }
}

/// Geolocation reported with the message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f32>,
    #[serde(default)]
    pub alt: i32,
    #[serde(default)]
    pub accuracy: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Envelope metadata, carrying the originating device identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}
