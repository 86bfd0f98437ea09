//! NGSI v1 message types
//!
//! Serde models for the subset of the NGSI v1 API the agent uses:
//! subscribeContext, updateContextSubscription, unsubscribeContext,
//! updateContext and the inbound notifyContext callback. Field names follow
//! the broker's camelCase JSON exactly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Suffix marking a context attribute as a device command
pub const COMMAND_SUFFIX: &str = "_command";
/// Suffix of the attribute reporting a command's outcome
pub const COMMAND_STATUS_SUFFIX: &str = "_commandStatus";
/// Command outcome values written to `<command>_commandStatus`
pub const COMMAND_SENT: &str = "SENT";
pub const COMMAND_ERROR: &str = "ERROR";
/// Subscriptions are created and renewed with a one month duration
pub const SUBSCRIPTION_DURATION: &str = "P1M";

/// Identity of one NGSI entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntityId {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub is_pattern: String,
    pub id: String,
}

impl EntityId {
    pub fn new(id: &str, entity_type: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            is_pattern: "false".to_string(),
            id: id.to_string(),
        }
    }
}

/// Metadata entry attached to a context attribute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub metadata_type: String,
    pub value: Value,
}

/// A named, typed value attached to an NGSI entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextAttribute {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadatas: Vec<ContextMetadata>,
}

impl ContextAttribute {
    pub fn new<V: Into<Value>>(name: &str, attribute_type: &str, value: V) -> Self {
        Self {
            name: name.to_string(),
            attribute_type: attribute_type.to_string(),
            value: value.into(),
            metadatas: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: ContextMetadata) -> Self {
        self.metadatas.push(metadata);
        self
    }
}

/// NGSI status code element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCode {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_phrase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl StatusCode {
    pub fn ok() -> Self {
        Self {
            code: "200".to_string(),
            reason_phrase: Some("OK".to_string()),
            details: None,
        }
    }

    pub fn bad_request() -> Self {
        Self {
            code: "400".to_string(),
            reason_phrase: Some("Bad request".to_string()),
            details: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == "200"
    }
}

/// Notification trigger condition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotifyCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub cond_values: Vec<String>,
}

impl NotifyCondition {
    pub fn on_change(cond_values: Vec<String>) -> Self {
        Self {
            condition_type: "ONCHANGE".to_string(),
            cond_values,
        }
    }
}

/// subscribeContext request body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeContext {
    pub entities: Vec<EntityId>,
    pub attributes: Vec<String>,
    pub reference: String,
    pub duration: String,
    pub notify_conditions: Vec<NotifyCondition>,
}

/// Positive branch of a subscribeContext response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub subscription_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// Error branch of a subscribeContext response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<StatusCode>,
}

/// subscribeContext / updateContextSubscription response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeContextResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe_response: Option<SubscribeResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe_error: Option<SubscribeError>,
}

/// updateContextSubscription request body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContextSubscription {
    pub subscription_id: String,
    pub duration: String,
}

/// unsubscribeContext request body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeContext {
    pub subscription_id: String,
}

/// unsubscribeContext response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeContextResponse {
    pub status_code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

/// One entity element of an updateContext request or notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextElement {
    #[serde(flatten)]
    pub entity: EntityId,
    #[serde(default)]
    pub attributes: Vec<ContextAttribute>,
}

/// updateContext request body, always APPEND mode with one element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContext {
    pub context_elements: Vec<ContextElement>,
    pub update_action: String,
}

impl UpdateContext {
    /// Build an APPEND update for exactly one entity element
    pub fn append(entity: EntityId, attributes: Vec<ContextAttribute>) -> Self {
        Self {
            context_elements: vec![ContextElement { entity, attributes }],
            update_action: "APPEND".to_string(),
        }
    }
}

/// Per-element response inside updateContext responses and notifications
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextElementResponse {
    pub context_element: ContextElement,
    pub status_code: StatusCode,
}

/// updateContext response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContextResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<StatusCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_responses: Option<Vec<ContextElementResponse>>,
}

/// Inbound notifyContext callback body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotifyContext {
    pub subscription_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub originator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_responses: Option<Vec<ContextElementResponse>>,
}

/// notifyContext acknowledgement body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotifyContextResponse {
    pub response_code: StatusCode,
}

impl NotifyContextResponse {
    pub fn ok() -> Self {
        Self {
            response_code: StatusCode::ok(),
        }
    }

    pub fn bad_request() -> Self {
        Self {
            response_code: StatusCode::bad_request(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_context_wire_shape() {
        let subscribe = SubscribeContext {
            entities: vec![EntityId::new("Room1", "Room")],
            attributes: vec!["led_command".to_string()],
            reference: "http://agent.example.org/v1/notifyContext/dev1".to_string(),
            duration: SUBSCRIPTION_DURATION.to_string(),
            notify_conditions: vec![NotifyCondition::on_change(vec!["led_command".to_string()])],
        };

        let value = serde_json::to_value(&subscribe).unwrap();
        assert_eq!(
            value,
            json!({
                "entities": [{"type": "Room", "isPattern": "false", "id": "Room1"}],
                "attributes": ["led_command"],
                "reference": "http://agent.example.org/v1/notifyContext/dev1",
                "duration": "P1M",
                "notifyConditions": [{"type": "ONCHANGE", "condValues": ["led_command"]}]
            })
        );
    }

    #[test]
    fn test_subscribe_response_deserializes() {
        let body = json!({
            "subscribeResponse": {"subscriptionId": "51c0ac9ed714fb3b37d7d5a8", "duration": "P1M"}
        });
        let response: SubscribeContextResponse = serde_json::from_value(body).unwrap();
        assert!(response.subscribe_error.is_none());
        assert_eq!(
            response.subscribe_response.unwrap().subscription_id,
            "51c0ac9ed714fb3b37d7d5a8"
        );
    }

    #[test]
    fn test_subscribe_error_deserializes() {
        let body = json!({
            "subscribeError": {"errorCode": {"code": "400", "reasonPhrase": "Bad Request"}}
        });
        let response: SubscribeContextResponse = serde_json::from_value(body).unwrap();
        assert!(response.subscribe_response.is_none());
        let error = response.subscribe_error.unwrap();
        assert_eq!(error.error_code.unwrap().code, "400");
    }

    #[test]
    fn test_update_context_append_shape() {
        let update = UpdateContext::append(
            EntityId::new("Room1", "Room"),
            vec![ContextAttribute::new("temperature", "Integer", 21)],
        );

        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["updateAction"], "APPEND");
        assert_eq!(value["contextElements"].as_array().unwrap().len(), 1);
        let element = &value["contextElements"][0];
        assert_eq!(element["id"], "Room1");
        assert_eq!(element["isPattern"], "false");
        assert_eq!(element["attributes"][0]["type"], "Integer");
    }

    #[test]
    fn test_attribute_metadata_only_serialized_when_present() {
        let plain = ContextAttribute::new("temperature", "Integer", 21);
        let value = serde_json::to_value(&plain).unwrap();
        assert!(value.get("metadatas").is_none());

        let with_meta = plain.with_metadata(ContextMetadata {
            name: "commandDate".to_string(),
            metadata_type: "date".to_string(),
            value: json!("2016-07-11T09:00:00Z"),
        });
        let value = serde_json::to_value(&with_meta).unwrap();
        assert_eq!(value["metadatas"][0]["name"], "commandDate");
    }

    #[test]
    fn test_notify_context_deserializes() {
        let body = json!({
            "subscriptionId": "51c0ac9ed714fb3b37d7d5a8",
            "originator": "localhost",
            "contextResponses": [{
                "contextElement": {
                    "type": "Room",
                    "isPattern": "false",
                    "id": "Room1",
                    "attributes": [{"name": "led_command", "type": "Text", "value": "on"}]
                },
                "statusCode": {"code": "200", "reasonPhrase": "OK"}
            }]
        });
        let notify: NotifyContext = serde_json::from_value(body).unwrap();
        let responses = notify.context_responses.unwrap();
        assert_eq!(responses.len(), 1);
        assert!(responses[0].status_code.is_ok());
        assert_eq!(responses[0].context_element.attributes[0].name, "led_command");
    }

    #[test]
    fn test_unsubscribe_response_status() {
        let body = json!({
            "statusCode": {"code": "404", "reasonPhrase": "No context element found"},
            "subscriptionId": "000000000000000000000000"
        });
        let response: UnsubscribeContextResponse = serde_json::from_value(body).unwrap();
        assert!(!response.status_code.is_ok());
    }
}
