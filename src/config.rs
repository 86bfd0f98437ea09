//! Configuration system for the agent
//!
//! Configuration is loaded from a TOML file. Secrets (provider API key,
//! OAuth2 credentials) are referenced indirectly through `*_env` fields
//! naming environment variables, never stored in the file itself.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Main agent configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub agent: AgentSection,
    pub mqtt: MqttSection,
    pub broker: BrokerSection,
    pub provider: ProviderSection,
}

/// Agent section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    /// Agent identifier (must match [a-zA-Z0-9._-]+)
    pub id: String,
    /// Public base URL of this agent, used to build notification callback
    /// references handed to the context broker
    pub local_url: String,
    /// Delay before a reconnection attempt after a lost MQTT connection
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// Interval of the subscription renewal sweep (default: 30 days)
    #[serde(default = "default_renewal_interval")]
    pub renewal_interval_secs: u64,
    /// Port of the local HTTP API (registration + notification callback)
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_renewal_interval() -> u64 {
    2_592_000 // 30 days
}

fn default_http_port() -> u16 {
    8080
}

/// MQTT section for the LPWA provider uplink
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port (tcp://, ssl://, mqtt://, mqtts://)
    pub broker_url: String,
    /// Client identifier (generated when absent)
    pub client_id: Option<String>,
    /// Environment variable containing the provider API key, used as the
    /// MQTT password (the username is fixed by the provider)
    pub api_key_env: String,
    /// Keep alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_keep_alive() -> u64 {
    30
}

/// NGSI context broker section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Context broker base URL
    pub url: String,
    /// Static X-Auth-Token header value (optional; OAuth2 used when absent)
    pub auth_token: Option<String>,
    /// Multi-tenant Fiware-Service header (optional)
    pub fiware_service: Option<String>,
    /// Multi-tenant Fiware-ServicePath header (optional)
    pub fiware_service_path: Option<String>,
    /// OAuth2 password-grant settings (optional)
    pub oauth: Option<OAuthSection>,
}

/// OAuth2 password-grant settings for broker authentication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthSection {
    /// Token endpoint URL
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Environment variable containing the resource-owner username
    pub username_env: String,
    /// Environment variable containing the resource-owner password
    pub password_env: String,
}

/// LPWA provider REST section (downlink commands, device information)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderSection {
    /// Provider REST base URL
    pub url: String,
    /// Environment variable containing the provider API key
    pub api_key_env: String,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid agent ID format: {0}")]
    InvalidAgentId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AgentConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AgentConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_agent_id(&self.agent.id)?;

        if self.agent.local_url.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "agent.local_url must not be empty".to_string(),
            ));
        }
        validate_url("mqtt.broker_url", &self.mqtt.broker_url)?;
        validate_url("broker.url", &self.broker.url)?;
        validate_url("provider.url", &self.provider.url)?;
        if self.mqtt.api_key_env.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.api_key_env must not be empty".to_string(),
            ));
        }
        if let Some(oauth) = &self.broker.oauth {
            validate_url("broker.oauth.token_url", &oauth.token_url)?;
        }
        Ok(())
    }

    /// Get the provider API key used as MQTT password
    pub fn mqtt_api_key(&self) -> Result<String, ConfigError> {
        get_env_var_required(&self.mqtt.api_key_env)
    }

    /// Get the provider API key for the REST interface
    pub fn provider_api_key(&self) -> Result<String, ConfigError> {
        get_env_var_required(&self.provider.api_key_env)
    }
}

impl OAuthSection {
    /// Resolve the resource-owner credentials from the environment
    pub fn credentials(&self) -> Result<(String, String), ConfigError> {
        let username = get_env_var_required(&self.username_env)?;
        let password = get_env_var_required(&self.password_env)?;
        Ok((username, password))
    }
}

fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
    std::env::var(env_var_name).map_err(|_| ConfigError::EnvVarNotFound(env_var_name.to_string()))
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::InvalidConfig(format!(
            "{field} must not be empty"
        )));
    }
    url::Url::parse(value)
        .map_err(|e| ConfigError::InvalidConfig(format!("{field} is not a valid URL: {e}")))?;
    Ok(())
}

/// Validate agent ID format
fn validate_agent_id(agent_id: &str) -> Result<(), ConfigError> {
    let valid_chars = agent_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if agent_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidAgentId(format!(
            "Agent ID '{agent_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
