//! OAuth2 token acquisition for broker authentication
//!
//! A single password-grant call against the identity manager's token
//! endpoint. The caller caches the returned token for the process lifetime;
//! expiry handling is left to the broker rejecting a stale token.

use crate::config::OAuthSection;
use crate::error::{AgentError, AgentResult};
use reqwest::Client;
use serde::Deserialize;

/// Token endpoint response, tolerant of absent optional fields
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<serde_json::Value>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Fetch a bearer token with the password grant
pub async fn fetch_token(client: &Client, oauth: &OAuthSection) -> AgentResult<String> {
    let (username, password) = oauth.credentials()?;

    let params = [
        ("grant_type", "password"),
        ("client_id", oauth.client_id.as_str()),
        ("client_secret", oauth.client_secret.as_str()),
        ("username", username.as_str()),
        ("password", password.as_str()),
    ];

    let response = client
        .post(&oauth.token_url)
        .form(&params)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| AgentError::transport_caused_by("Token endpoint rejected the request", e))?;

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| AgentError::transport_caused_by("Malformed token response", e))?;

    Ok(token.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_minimal() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token": "abc123"}"#).unwrap();
        assert_eq!(token.access_token, "abc123");
        assert!(token.token_type.is_none());
    }

    #[test]
    fn test_token_response_full() {
        let body = r#"{
            "access_token": "abc123",
            "token_type": "Bearer",
            "expires_in": "3600",
            "refresh_token": "def456",
            "scope": ["all"]
        }"#;
        let token: TokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(token.access_token, "abc123");
        assert_eq!(token.refresh_token.as_deref(), Some("def456"));
    }
}
