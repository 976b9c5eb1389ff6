use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{ExpiringToken, TokenProvider};

/// Caches the token handed out by `Provider` and logs in again once it expires.
pub struct TokenManager<Provider>
where
    Provider: TokenProvider,
{
    provider: Provider,
    cached_token: Mutex<Option<Record>>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error<RenewalError> {
    #[error("token provider: {0}")]
    Provider(#[source] RenewalError),
}

/// A cached access token. Fetched once per login, cloned out to callers.
#[derive(Debug, Clone)]
pub struct Record {
    pub access_token: String,
    pub expires_at: Instant,
}

impl Record {
    fn issued<T: ExpiringToken>(token: T) -> Self {
        Self {
            access_token: token.access_token().to_owned(),
            expires_at: token.expires_at(),
        }
    }

    /// True once `expires_at` lies in the past.
    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

impl super::Token for Record {
    fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl<Provider> TokenManager<Provider>
where
    Provider: TokenProvider,
    Provider::Token: ExpiringToken,
{
    /// Lazy manager: the first `get_token` call logs in.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            cached_token: Mutex::const_new(None),
        }
    }

    /// Eager manager: logs in before returning.
    pub async fn logged_in(provider: Provider) -> Result<Self, Error<Provider::Error>> {
        let manager = Self::new(provider);
        manager.login().await?;
        Ok(manager)
    }

    /// Fetch a new token unconditionally, replacing the cached one.
    pub async fn login(&self) -> Result<Record, Error<Provider::Error>> {
        let mut slot = self.cached_token.lock().await;
        self.refresh(&mut slot).await
    }

    /// The cached token, after logging in if there is none or it has expired.
    pub async fn get_token(&self) -> Result<Record, Error<Provider::Error>> {
        let mut slot = self.cached_token.lock().await;

        if let Some(record) = slot.as_ref().filter(|record| !record.is_expired()) {
            debug!(message = "Reusing cached token", token_expires_at = ?record.expires_at);
            return Ok(record.clone());
        }

        info!(
            message = "Logging in for a new token",
            token_is_stale = slot.is_some(),
        );
        self.refresh(&mut slot).await
    }

    /// Log in with the slot locked, so concurrent callers wait for this
    /// login instead of starting their own.
    async fn refresh(
        &self,
        slot: &mut Option<Record>,
    ) -> Result<Record, Error<Provider::Error>> {
        let token = self
            .provider
            .get_auth_token()
            .await
            .map_err(Error::Provider)?;
        let record = Record::issued(token);

        debug!(message = "Stored new token", token_expires_at = ?record.expires_at);

        *slot = Some(record.clone());
        Ok(record)
    }
}

#[async_trait::async_trait]
impl<Provider> TokenProvider for TokenManager<Provider>
where
    Provider: TokenProvider,
    Provider::Token: ExpiringToken,
{
    type Token = Record;
    type Error = Error<Provider::Error>;

    async fn get_auth_token(&self) -> Result<Self::Token, Self::Error> {
        self.get_token().await
    }
}
