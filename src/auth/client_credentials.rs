//! Authorize against KeyCloak using the client credentials flow.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::info;

use crate::config::{self, KeyCloakConfig, TransportConfig};

/// Deducted from the declared token lifetime so a token never expires mid-request.
pub const SAFETY_MARGIN: Duration = Duration::from_secs(60);

const TOKEN_PATH: &str = "/protocol/openid-connect/token";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("token endpoint answered {0}")]
    Status(reqwest::StatusCode),
    #[error("form encoding: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),
}

pub struct ClientCredentials {
    pub client: reqwest::Client,
    pub keycloak_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
}

impl ClientCredentials {
    /// Build the flow with its own HTTP client, presenting the configured
    /// client certificate if there is one.
    pub fn from_config(
        keycloak: &KeyCloakConfig,
        transport: &TransportConfig,
    ) -> Result<Self, config::Error> {
        let mut builder = transport.client_builder();
        if let Some(certificate) = &keycloak.certificate {
            builder = builder.identity(certificate.identity()?);
        }
        let client = builder.build().map_err(config::Error::Tls)?;

        Ok(Self {
            client,
            keycloak_url: keycloak.url.clone(),
            client_id: keycloak.client_id.clone(),
            client_secret: keycloak.client_secret.clone(),
            username: keycloak.username.clone(),
        })
    }

    pub fn token_url(&self) -> String {
        format!("{}{}", self.keycloak_url, TOKEN_PATH)
    }

    /// Perform the client credentials flow.
    pub async fn perform(&self) -> Result<AuthResponse, Error> {
        let params = &[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("username", self.username.as_str()),
        ];

        let params = serde_urlencoded::to_string(params)?;

        let req = self
            .client
            .post(self.token_url())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(params)
            .build()?;

        info!(message = "Requesting access token", client_id = %self.client_id);

        let res = self.client.execute(req).await?;
        if !res.status().is_success() {
            return Err(Error::Status(res.status()));
        }
        let login_response = res.json().await?;
        Ok(login_response)
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    /// The requested access token.
    access_token: String,
    /// The amount of time that an access token is valid (in seconds).
    expires_in: u64,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: String,
    pub expires_at: Instant,
}

impl Token {
    /// Expiry for a token issued at `issued_at` with the declared lifetime,
    /// minus [`SAFETY_MARGIN`]. Never earlier than `issued_at`.
    pub fn expiry(issued_at: Instant, expires_in: u64) -> Instant {
        issued_at + Duration::from_secs(expires_in).saturating_sub(SAFETY_MARGIN)
    }
}

impl From<AuthResponse> for Token {
    fn from(auth: AuthResponse) -> Self {
        let AuthResponse {
            access_token,
            expires_in,
        } = auth;
        Self {
            access_token,
            expires_at: Self::expiry(Instant::now(), expires_in),
        }
    }
}

#[async_trait::async_trait]
impl super::TokenProvider for ClientCredentials {
    type Token = Token;
    type Error = Error;

    async fn get_auth_token(&self) -> Result<Self::Token, Self::Error> {
        let auth_response = self.perform().await?;
        let token = auth_response.into();
        Ok(token)
    }
}

impl super::Token for Token {
    fn access_token(&self) -> &str {
        self.access_token.as_str()
    }
}

impl super::ExpiringToken for Token {
    fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_deducts_safety_margin() {
        let now = Instant::now();
        assert_eq!(Token::expiry(now, 300), now + Duration::from_secs(240));
    }

    #[test]
    fn expiry_saturates_for_short_lifetimes() {
        let now = Instant::now();
        assert_eq!(Token::expiry(now, 30), now);
        assert_eq!(Token::expiry(now, 0), now);
    }

    #[test]
    fn token_from_response() {
        let response: AuthResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":3600,"token_type":"Bearer"}"#)
                .unwrap();
        let before = Instant::now();
        let token = Token::from(response);
        assert_eq!(token.access_token, "abc");
        assert!(token.expires_at >= before + Duration::from_secs(3540));
    }

    #[test]
    fn token_url() {
        let flow = ClientCredentials::from_config(
            &KeyCloakConfig {
                url: "https://sso.example.com/realms/im".into(),
                client_id: "cli".into(),
                client_secret: "secret".into(),
                username: config::DEFAULT_USERNAME.into(),
                certificate: None,
            },
            &TransportConfig::default(),
        )
        .unwrap();
        assert_eq!(
            flow.token_url(),
            "https://sso.example.com/realms/im/protocol/openid-connect/token"
        );
    }
}
