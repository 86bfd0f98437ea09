//! Command notification routing
//!
//! The context broker pushes `notifyContext` bodies to the agent whenever a
//! subscribed `_command` attribute changes. This module validates the
//! notification against the stored subscription, dispatches each carried
//! command through the agent and writes one aggregated
//! `<command>_commandStatus` update back to the broker.

use crate::agent::Agent;
use crate::broker::ContextBroker;
use crate::protocol::ngsi::{
    ContextAttribute, ContextMetadata, NotifyContext, NotifyContextResponse, COMMAND_ERROR,
    COMMAND_SENT, COMMAND_STATUS_SUFFIX, COMMAND_SUFFIX,
};
use crate::registry::DeviceRegistry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Timestamp format of the `commandDate` metadata
const COMMAND_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub struct NotificationRouter {
    agent: Arc<Agent>,
    registry: Arc<dyn DeviceRegistry>,
    broker: Arc<dyn ContextBroker>,
}

impl NotificationRouter {
    pub fn new(
        agent: Arc<Agent>,
        registry: Arc<dyn DeviceRegistry>,
        broker: Arc<dyn ContextBroker>,
    ) -> Self {
        Self {
            agent,
            registry,
            broker,
        }
    }

    /// Process one command notification for the given device
    ///
    /// Always resolves to a response; transport-level success is decided by
    /// the HTTP layer, this method only fills the embedded status code.
    pub async fn handle(&self, device_id: &str, notification: NotifyContext) -> NotifyContextResponse {
        let Some(responses) = notification.context_responses else {
            warn!(device_id, "Notification carries no context responses");
            return NotifyContextResponse::bad_request();
        };

        let record = match self.registry.find_by_id(device_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(device_id, "Notification for an unknown device, cancelling the subscription");
                self.cancel_subscription(&notification.subscription_id).await;
                return NotifyContextResponse::ok();
            }
            Err(e) => {
                error!(device_id, error = %e, "Registry lookup failed during notification");
                return NotifyContextResponse::ok();
            }
        };

        // A notification referencing a subscription the agent no longer
        // tracks is stale; cancel it broker-side so it stops arriving.
        let current = record.subscription_id.as_deref().unwrap_or_default();
        if !current.eq_ignore_ascii_case(&notification.subscription_id) {
            warn!(
                device_id,
                subscription_id = %notification.subscription_id,
                "Notification for a stale subscription, cancelling it"
            );
            self.cancel_subscription(&notification.subscription_id).await;
            return NotifyContextResponse::ok();
        }

        let commands: Vec<(String, ContextAttribute)> = responses
            .into_iter()
            .filter(|response| response.status_code.is_ok())
            .flat_map(|response| response.context_element.attributes)
            .filter_map(|attribute| {
                let command_name = attribute.name.strip_suffix(COMMAND_SUFFIX)?.to_string();
                if command_name.is_empty() || attribute.value.is_null() {
                    return None;
                }
                Some((command_name, attribute))
            })
            .collect();

        if commands.is_empty() {
            debug!(device_id, "Notification carries no executable command");
            return NotifyContextResponse::ok();
        }

        let executions = commands.iter().map(|(command_name, attribute)| {
            let agent = Arc::clone(&self.agent);
            async move {
                let (sent, timestamp) =
                    agent.execute_command(device_id, command_name, attribute).await;
                command_status_attribute(command_name, sent, timestamp)
            }
        });
        let status_attributes = futures::future::join_all(executions).await;

        if let Err(e) = self
            .broker
            .update_attributes(&record.entity(), &status_attributes)
            .await
        {
            error!(device_id, error = %e, "Unable to report command statuses to the context broker");
        }

        NotifyContextResponse::ok()
    }

    async fn cancel_subscription(&self, subscription_id: &str) {
        if let Err(e) = self.broker.unsubscribe(subscription_id).await {
            warn!(subscription_id, error = %e, "Unable to cancel the subscription");
        }
    }
}

/// Build the `<command>_commandStatus` attribute reporting one dispatch
pub fn command_status_attribute(
    command_name: &str,
    sent: bool,
    timestamp: DateTime<Utc>,
) -> ContextAttribute {
    let status = if sent { COMMAND_SENT } else { COMMAND_ERROR };
    ContextAttribute::new(
        &format!("{command_name}{COMMAND_STATUS_SUFFIX}"),
        "commandStatus",
        status,
    )
    .with_metadata(ContextMetadata {
        name: "commandDate".to_string(),
        metadata_type: "date".to_string(),
        value: timestamp.format(COMMAND_DATE_FORMAT).to_string().into(),
    })
}
