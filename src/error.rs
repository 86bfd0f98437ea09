//! Error types for the agent core
//!
//! Maps the failure taxonomy used across the crate: configuration problems
//! fail fast before any I/O, transport problems carry their underlying cause,
//! and broker rejections cover NGSI responses whose embedded status code is
//! not a success even though the HTTP exchange itself succeeded.

use thiserror::Error;

/// Main error type for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    /// Missing or invalid input detected before any network call
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// MQTT or HTTP failure with the underlying cause attached
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The context broker answered, but with a non-success embedded status
    #[error("Context broker rejected the request: {0}")]
    BrokerRejection(String),

    /// Operation referenced a device the registry does not know
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// Device registry persistence failure
    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Configuration file error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl AgentError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a transport error from a message only
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error with its underlying cause attached
    pub fn transport_caused_by<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a broker rejection error
    pub fn broker_rejection<S: Into<String>>(message: S) -> Self {
        Self::BrokerRejection(message.into())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "HTTP request timed out".to_string()
        } else if err.is_connect() {
            "HTTP connection failed".to_string()
        } else {
            "HTTP request failed".to_string()
        };
        Self::transport_caused_by(message, err)
    }
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let error = AgentError::configuration("device port is missing");
        assert_eq!(
            error.to_string(),
            "Configuration error: device port is missing"
        );
    }

    #[test]
    fn test_transport_error_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = AgentError::transport_caused_by("unable to reach broker", io_err);

        assert_eq!(error.to_string(), "Transport error: unable to reach broker");
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_broker_rejection_display() {
        let error = AgentError::broker_rejection("subscribeError in response");
        assert!(error.to_string().contains("subscribeError"));
    }

    #[test]
    fn test_unknown_device_display() {
        let error = AgentError::UnknownDevice("0018B2000000170B".to_string());
        assert_eq!(error.to_string(), "Unknown device: 0018B2000000170B");
    }
}
