//! Uplink transport layer
//!
//! Abstraction over the MQTT session carrying device telemetry, plus the
//! event type delivered to the agent core. The trait exists so the agent can
//! be exercised in tests without a broker.

use crate::error::AgentResult;
use crate::protocol::uplink::IncomingMessage;
use async_trait::async_trait;

pub mod mqtt;

pub use mqtt::MqttLink;

/// Event delivered by the transport to the agent core
#[derive(Debug, Clone)]
pub enum UplinkEvent {
    /// One deserialized device message, disambiguated by its source field
    Message {
        device_id: String,
        message: IncomingMessage,
    },
    /// The MQTT session dropped
    ConnectionLost { reason: String },
}

/// Transport operations used by the agent core
///
/// Every operation resolves with the client identifier on success; inbound
/// messages and connection-loss events flow through the channel handed out
/// at construction, not through this trait.
#[async_trait]
pub trait UplinkTransport: Send + Sync {
    async fn connect(&self) -> AgentResult<String>;
    async fn disconnect(&self) -> AgentResult<String>;
    async fn subscribe(&self) -> AgentResult<String>;
    async fn unsubscribe(&self) -> AgentResult<String>;
}
