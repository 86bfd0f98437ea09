//! HTTP client for the NGSI v1 context broker
//!
//! Every public method validates its arguments before any network call and
//! attaches the standard headers: JSON content negotiation, the optional
//! auth token and the optional multi-tenant Fiware headers.

use super::auth;
use super::ContextBroker;
use crate::config::BrokerSection;
use crate::error::{AgentError, AgentResult};
use crate::protocol::ngsi::{
    ContextAttribute, EntityId, NotifyCondition, SubscribeContext, SubscribeContextResponse,
    UnsubscribeContext, UnsubscribeContextResponse, UpdateContext, UpdateContextResponse,
    UpdateContextSubscription, COMMAND_SUFFIX, SUBSCRIPTION_DURATION,
};
use crate::registry::Device;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// NGSI v1 broker client
pub struct HttpBrokerClient {
    config: BrokerSection,
    /// Public base URL of this agent, used as the notification reference
    local_url: String,
    client: Client,
    /// Cached OAuth2 bearer token, fetched lazily, kept until process restart
    token: RwLock<Option<String>>,
}

impl HttpBrokerClient {
    pub fn new(config: BrokerSection, local_url: &str) -> AgentResult<Self> {
        if config.url.is_empty() {
            return Err(AgentError::configuration("context broker URL is missing"));
        }
        if local_url.is_empty() {
            return Err(AgentError::configuration("agent local URL is missing"));
        }

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AgentError::transport_caused_by("Failed to build HTTP client", e))?;

        Ok(Self {
            config,
            local_url: local_url.trim_end_matches('/').to_string(),
            client,
            token: RwLock::new(None),
        })
    }

    /// Resolve the auth token for the next request
    ///
    /// A static token from the configuration wins. Otherwise, with OAuth2
    /// settings present, a bearer token is fetched once and cached. A fetch
    /// failure is logged and the request proceeds without the header; the
    /// broker itself decides whether to reject the call.
    async fn auth_token(&self) -> Option<String> {
        if let Some(token) = &self.config.auth_token {
            return Some(token.clone());
        }
        let oauth = self.config.oauth.as_ref()?;

        if let Some(cached) = self.token.read().await.clone() {
            return Some(cached);
        }

        match auth::fetch_token(&self.client, oauth).await {
            Ok(token) => {
                debug!("Fetched OAuth2 token for the context broker");
                *self.token.write().await = Some(token.clone());
                Some(token)
            }
            Err(e) => {
                warn!(error = %e, "Unable to fetch OAuth2 token, proceeding without it");
                None
            }
        }
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> AgentResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.config.url.trim_end_matches('/'));
        let mut request = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(body);

        if let Some(token) = self.auth_token().await {
            request = request.header("X-Auth-Token", token);
        }
        if let Some(service) = &self.config.fiware_service {
            if !service.is_empty() {
                request = request.header("Fiware-Service", service);
            }
        }
        if let Some(service_path) = &self.config.fiware_service_path {
            if !service_path.is_empty() {
                request = request.header("Fiware-ServicePath", service_path);
            }
        }

        let response = request
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AgentError::transport_caused_by("Context broker request failed", e))?;

        response
            .json()
            .await
            .map_err(|e| AgentError::transport_caused_by("Malformed context broker response", e))
    }
}

#[async_trait]
impl ContextBroker for HttpBrokerClient {
    async fn subscribe_to_commands(&self, device: &Device) -> AgentResult<String> {
        let device_id = device.id()?;
        if device.commands.is_empty() {
            return Err(AgentError::configuration(format!(
                "unable to subscribe to a device without commands ({device_id})"
            )));
        }

        let attributes: Vec<String> = device
            .commands
            .iter()
            .map(|command| format!("{command}{COMMAND_SUFFIX}"))
            .collect();
        let subscribe = SubscribeContext {
            entities: vec![EntityId::new(device.entity_name()?, device.entity_type()?)],
            attributes: attributes.clone(),
            reference: format!("{}/v1/notifyContext/{device_id}", self.local_url),
            duration: SUBSCRIPTION_DURATION.to_string(),
            notify_conditions: vec![NotifyCondition::on_change(attributes)],
        };

        debug!(device_id, broker_url = %self.config.url, "Subscribing to commands");
        let response: SubscribeContextResponse =
            self.post_json("/v1/subscribeContext", &subscribe).await?;

        if let Some(error) = response.subscribe_error {
            return Err(AgentError::broker_rejection(format!(
                "subscribe failed for device {device_id}: {:?}",
                error.error_code
            )));
        }
        response
            .subscribe_response
            .map(|r| r.subscription_id)
            .ok_or_else(|| {
                AgentError::broker_rejection(format!(
                    "subscribe response carried no subscription id for device {device_id}"
                ))
            })
    }

    async fn update_subscription(&self, subscription_id: &str) -> AgentResult<()> {
        if subscription_id.is_empty() {
            return Err(AgentError::configuration(
                "unable to update a subscription without an id",
            ));
        }

        let update = UpdateContextSubscription {
            subscription_id: subscription_id.to_string(),
            duration: SUBSCRIPTION_DURATION.to_string(),
        };
        let response: SubscribeContextResponse = self
            .post_json("/v1/updateContextSubscription", &update)
            .await?;

        if let Some(error) = response.subscribe_error {
            return Err(AgentError::broker_rejection(format!(
                "subscription update failed ({subscription_id}): {:?}",
                error.error_code
            )));
        }
        Ok(())
    }

    async fn unsubscribe(&self, subscription_id: &str) -> AgentResult<()> {
        if subscription_id.is_empty() {
            return Err(AgentError::configuration(
                "unable to unsubscribe without a subscription id",
            ));
        }

        let unsubscribe = UnsubscribeContext {
            subscription_id: subscription_id.to_string(),
        };
        let response: UnsubscribeContextResponse =
            self.post_json("/v1/unsubscribeContext", &unsubscribe).await?;

        if !response.status_code.is_ok() {
            return Err(AgentError::broker_rejection(format!(
                "unsubscribe failed ({subscription_id}): code {}",
                response.status_code.code
            )));
        }
        Ok(())
    }

    async fn update_attributes(
        &self,
        entity: &EntityId,
        attributes: &[ContextAttribute],
    ) -> AgentResult<()> {
        if entity.id.is_empty() {
            return Err(AgentError::configuration(
                "unable to update attributes of an entity without an id",
            ));
        }
        if attributes.is_empty() {
            return Err(AgentError::configuration(format!(
                "empty attribute list for entity {}",
                entity.id
            )));
        }

        let update = UpdateContext::append(entity.clone(), attributes.to_vec());
        debug!(entity_id = %entity.id, count = attributes.len(), "Calling updateContext");
        let response: UpdateContextResponse = self.post_json("/v1/updateContext", &update).await?;

        if let Some(error) = response.error_code {
            if !error.is_ok() {
                return Err(AgentError::broker_rejection(format!(
                    "updateContext failed for entity {}: code {}",
                    entity.id, error.code
                )));
            }
        }
        Ok(())
    }
}
