//! NGSI context broker access
//!
//! The [`ContextBroker`] trait abstracts the broker calls the agent issues so
//! tests can substitute a mock; [`client::HttpBrokerClient`] is the reqwest
//! implementation speaking the NGSI v1 REST API.

use crate::error::AgentResult;
use crate::protocol::ngsi::{ContextAttribute, EntityId};
use crate::registry::Device;
use async_trait::async_trait;

pub mod auth;
pub mod client;

pub use client::HttpBrokerClient;

/// Broker operations used by the agent core
#[async_trait]
pub trait ContextBroker: Send + Sync {
    /// Create a command subscription for the device, returning the new
    /// subscription identifier
    async fn subscribe_to_commands(&self, device: &Device) -> AgentResult<String>;

    /// Extend an existing subscription by one duration period
    async fn update_subscription(&self, subscription_id: &str) -> AgentResult<()>;

    /// Remove a subscription
    async fn unsubscribe(&self, subscription_id: &str) -> AgentResult<()>;

    /// Send an APPEND-mode context update for exactly one entity
    async fn update_attributes(
        &self,
        entity: &EntityId,
        attributes: &[ContextAttribute],
    ) -> AgentResult<()>;
}
