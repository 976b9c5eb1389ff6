//! Bearer token acquisition.
//!
//! [`client_credentials::ClientCredentials`] talks to KeyCloak;
//! [`token_manager::TokenManager`] wraps any provider of expiring tokens
//! and only goes back to it once the cached token has expired.

pub mod client_credentials;
pub mod token_manager;

pub use self::{client_credentials::ClientCredentials, token_manager::TokenManager};

/// Source of access tokens for the `Authorization` header.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    type Token: Token;
    type Error: Send + Sync;

    async fn get_auth_token(&self) -> Result<Self::Token, Self::Error>;
}

pub trait Token: Send {
    fn access_token(&self) -> &str;
}

/// A token that stops being usable at a known instant.
pub trait ExpiringToken: Token {
    fn expires_at(&self) -> std::time::Instant;
}
