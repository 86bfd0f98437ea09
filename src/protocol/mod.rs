//! Wire-level message types
//!
//! NGSI v1 request/response bodies exchanged with the context broker and the
//! uplink telemetry envelope delivered by the LPWA provider over MQTT.

pub mod ngsi;
pub mod uplink;

pub use ngsi::*;
pub use uplink::{IncomingMessage, Location, MessageMetadata};
