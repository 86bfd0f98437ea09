//! HTTP client for the LPWA provider REST API

use super::{CommandRequest, DeviceCommand, DeviceInfo, DeviceProvider};
use crate::config::ProviderSection;
use crate::error::{AgentError, AgentResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const BASE_PATH: &str = "api/v0";
const API_KEY_HEADER: &str = "X-API-Key";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// LPWA provider REST client
pub struct HttpDeviceProvider {
    url: String,
    api_key: String,
    client: Client,
}

impl HttpDeviceProvider {
    pub fn new(config: &ProviderSection) -> AgentResult<Self> {
        if config.url.is_empty() {
            return Err(AgentError::configuration("provider URL is missing"));
        }
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            AgentError::configuration(format!(
                "provider API key environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        if api_key.is_empty() {
            return Err(AgentError::configuration("provider API key is missing"));
        }

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AgentError::transport_caused_by("Failed to build HTTP client", e))?;

        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn check_device_id(device_id: &str) -> AgentResult<()> {
        if device_id.is_empty() {
            return Err(AgentError::configuration("device id parameter is missing"));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceProvider for HttpDeviceProvider {
    async fn register_device_command(
        &self,
        device_id: &str,
        command: &CommandRequest,
    ) -> AgentResult<DeviceCommand> {
        Self::check_device_id(device_id)?;
        if command.data.is_empty() {
            return Err(AgentError::configuration("data parameter is missing"));
        }

        let url = format!(
            "{}/{BASE_PATH}/vendors/lora/devices/{device_id}/commands",
            self.url
        );
        debug!(device_id, port = command.port, "Registering downlink command");

        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .json(command)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AgentError::transport_caused_by("Provider rejected the command", e))?;

        response
            .json()
            .await
            .map_err(|e| AgentError::transport_caused_by("Malformed provider response", e))
    }

    async fn get_device_information(&self, device_id: &str) -> AgentResult<DeviceInfo> {
        Self::check_device_id(device_id)?;

        let url = format!(
            "{}/{BASE_PATH}/data/streams/urn:lo:nsid:lora:{device_id}",
            self.url
        );
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| {
                AgentError::transport_caused_by("Provider device lookup failed", e)
            })?;

        response
            .json()
            .await
            .map_err(|e| AgentError::transport_caused_by("Malformed provider response", e))
    }
}
