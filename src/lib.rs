//! NGSI LoRa Agent
//!
//! A protocol-translation agent bridging an LPWA device provider (LoRa
//! telemetry over MQTT, downlink commands over REST) and a FIWARE NGSI v1
//! context broker.
//!
//! # Overview
//!
//! The crate provides:
//! - An MQTT uplink consuming the provider's telemetry topic
//! - NGSI v1 message types and a REST broker client (subscriptions, context
//!   updates, command notifications)
//! - A device registry mapping provider devices to NGSI entities
//! - A pluggable payload converter turning raw device payloads into context
//!   attributes and command attributes back into downlink payloads
//! - An HTTP API for device provisioning and broker notifications
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ngsi_lora_agent::converter::GenericConverter;
//! use ngsi_lora_agent::registry::{Device, InMemoryDeviceRegistry};
//!
//! let registry = InMemoryDeviceRegistry::new();
//! let device = Device {
//!     device_id: Some("0018B2000000170B".to_string()),
//!     port: Some(2),
//!     entity_name: Some("Lamp1".to_string()),
//!     entity_type: Some("Lamp".to_string()),
//!     commands: vec!["led".to_string()],
//! };
//! assert!(device.validate().is_ok());
//! let _converter = GenericConverter::new();
//! ```

pub mod agent;
pub mod api;
pub mod broker;
pub mod config;
pub mod converter;
pub mod error;
pub mod notify;
pub mod observability;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod testing;
pub mod transport;

pub use agent::Agent;
pub use api::ApiServer;
pub use broker::{ContextBroker, HttpBrokerClient};
pub use config::AgentConfig;
pub use converter::{GenericConverter, PayloadConverter};
pub use error::{AgentError, AgentResult};
pub use notify::NotificationRouter;
pub use provider::{DeviceProvider, HttpDeviceProvider};
pub use registry::{Device, DeviceRecord, DeviceRegistry, InMemoryDeviceRegistry};
pub use transport::{MqttLink, UplinkEvent, UplinkTransport};
