//! Payload conversion
//!
//! The [`PayloadConverter`] trait is the pluggable seam between provider
//! payloads and NGSI context attributes. Deployments supply their own
//! device-specific implementation; [`GenericConverter`] covers the common
//! case of mapping the envelope's measurement map one to one.

use crate::protocol::ngsi::ContextAttribute;
use crate::protocol::uplink::IncomingMessage;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::debug;

/// Decodes uplink payloads and encodes downlink command payloads
///
/// Implementations must tolerate malformed input and return an empty result
/// instead of panicking; the uplink pipeline never recovers a converter that
/// unwinds past this boundary.
pub trait PayloadConverter: Send + Sync {
    /// Decode a raw payload into context attributes for the device's entity
    fn decode(
        &self,
        device_id: &str,
        payload: &str,
        message: &IncomingMessage,
    ) -> Vec<ContextAttribute>;

    /// Encode a command attribute into the raw downlink payload, or `None`
    /// when there is nothing to send
    fn encode_command(
        &self,
        device_id: &str,
        command_name: &str,
        attribute: &ContextAttribute,
    ) -> Option<String>;
}

/// Default converter mapping the measurement map entries one to one
#[derive(Debug, Default)]
pub struct GenericConverter;

impl GenericConverter {
    pub fn new() -> Self {
        Self
    }
}

impl PayloadConverter for GenericConverter {
    fn decode(
        &self,
        _device_id: &str,
        _payload: &str,
        message: &IncomingMessage,
    ) -> Vec<ContextAttribute> {
        let mut attributes = Vec::new();

        let created_at = message.timestamp.unwrap_or_else(Utc::now);
        attributes.push(ContextAttribute::new(
            "createdAt",
            "DateTime",
            created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        ));
        attributes.push(ContextAttribute::new(
            "modifiedAt",
            "DateTime",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        ));

        if let Some(location) = &message.location {
            if let (Some(lat), Some(lon)) = (location.lat, location.lon) {
                attributes.push(ContextAttribute::new(
                    "location",
                    "geo:json",
                    json!({"type": "Point", "coordinates": [lat, lon]}),
                ));
            }
        }

        if let Some(first_tag) = message.tags.first() {
            attributes.push(ContextAttribute::new("name", "Text", first_tag.clone()));
        }

        for (key, value) in &message.value {
            match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => {
                    attributes.push(ContextAttribute::new(key, "Integer", value.clone()));
                }
                // Float measurement values are truncated and reported as
                // Integer, matching the broker-side data model in production.
                Value::Number(n) => {
                    let truncated = n.as_f64().map(|f| f as i64).unwrap_or_default();
                    attributes.push(ContextAttribute::new(key, "Integer", truncated));
                }
                Value::String(s) => {
                    attributes.push(ContextAttribute::new(key, "Text", s.clone()));
                }
                Value::Bool(b) => {
                    attributes.push(ContextAttribute::new(key, "Boolean", *b));
                }
                other => {
                    debug!(key, value = %other, "Unsupported measurement value type, skipped");
                }
            }
        }

        attributes
    }

    fn encode_command(
        &self,
        _device_id: &str,
        _command_name: &str,
        attribute: &ContextAttribute,
    ) -> Option<String> {
        let encoded = match &attribute.value {
            Value::String(s) => s.clone(),
            Value::Null => return None,
            other => other.to_string(),
        };
        if encoded.is_empty() {
            None
        } else {
            Some(encoded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_from(value: serde_json::Value) -> IncomingMessage {
        serde_json::from_value(value).unwrap()
    }

    fn attribute<'a>(attrs: &'a [ContextAttribute], name: &str) -> Option<&'a ContextAttribute> {
        attrs.iter().find(|a| a.name == name)
    }

    #[test]
    fn test_float_measurement_truncated_to_integer() {
        let message = message_from(json!({"value": {"temp": 14.0}}));
        let attrs = GenericConverter::new().decode("dev1", "", &message);

        let temp = attribute(&attrs, "temp").unwrap();
        assert_eq!(temp.attribute_type, "Integer");
        assert_eq!(temp.value, json!(14));
    }

    #[test]
    fn test_measurement_type_mapping() {
        let message = message_from(json!({
            "value": {"count": 3, "label": "ok", "active": true, "ignored": {"x": 1}}
        }));
        let attrs = GenericConverter::new().decode("dev1", "", &message);

        assert_eq!(attribute(&attrs, "count").unwrap().attribute_type, "Integer");
        assert_eq!(attribute(&attrs, "label").unwrap().attribute_type, "Text");
        assert_eq!(
            attribute(&attrs, "active").unwrap().attribute_type,
            "Boolean"
        );
        assert!(attribute(&attrs, "ignored").is_none());
    }

    #[test]
    fn test_decode_without_location_omits_location_attribute() {
        let message = message_from(json!({
            "timestamp": "2016-07-11T09:01:02.000Z",
            "metadata": {"source": "dev1"},
            "value": {"payload": "6d011f0179", "port": 2}
        }));
        let attrs = GenericConverter::new().decode("dev1", "6d011f0179", &message);

        let created = attribute(&attrs, "createdAt").unwrap();
        assert_eq!(created.attribute_type, "DateTime");
        assert_eq!(created.value, json!("2016-07-11T09:01:02.000Z"));
        assert_eq!(
            attribute(&attrs, "modifiedAt").unwrap().attribute_type,
            "DateTime"
        );
        assert!(attribute(&attrs, "location").is_none());
        // createdAt + modifiedAt + one attribute per value map field
        assert_eq!(attrs.len(), 2 + message.value.len());
        assert_eq!(attribute(&attrs, "payload").unwrap().value, json!("6d011f0179"));
    }

    #[test]
    fn test_decode_with_location_and_tags() {
        let message = message_from(json!({
            "tags": ["City Sensor", "demo"],
            "location": {"lat": 48.8534, "lon": 2.3488},
            "value": {}
        }));
        let attrs = GenericConverter::new().decode("dev1", "", &message);

        let location = attribute(&attrs, "location").unwrap();
        assert_eq!(location.attribute_type, "geo:json");
        assert_eq!(location.value["type"], "Point");
        assert_eq!(
            location.value["coordinates"].as_array().unwrap().len(),
            2
        );
        assert_eq!(attribute(&attrs, "name").unwrap().value, json!("City Sensor"));
    }

    #[test]
    fn test_encode_command_string_value_unquoted() {
        let converter = GenericConverter::new();
        let attribute = ContextAttribute::new("led", "Text", "4f6e");
        assert_eq!(
            converter.encode_command("dev1", "led", &attribute),
            Some("4f6e".to_string())
        );
    }

    #[test]
    fn test_encode_command_empty_or_null_is_none() {
        let converter = GenericConverter::new();
        assert_eq!(
            converter.encode_command("dev1", "led", &ContextAttribute::new("led", "Text", "")),
            None
        );
        assert_eq!(
            converter.encode_command(
                "dev1",
                "led",
                &ContextAttribute::new("led", "Text", Value::Null)
            ),
            None
        );
    }

    #[test]
    fn test_encode_command_non_string_rendered() {
        let converter = GenericConverter::new();
        let attribute = ContextAttribute::new("led", "Integer", 42);
        assert_eq!(
            converter.encode_command("dev1", "led", &attribute),
            Some("42".to_string())
        );
    }
}
