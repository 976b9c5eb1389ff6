//! Runtime configuration, read from the environment.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USERNAME: &str = "pytsshon-client";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("env var {0} is not set")]
    Missing(&'static str),
    #[error("env var {key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("tls setup: {0}")]
    Tls(#[source] reqwest::Error),
}

/// Settings shared by every outgoing connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub timeout: Duration,
    /// Skip TLS certificate verification. On by default for compatibility
    /// with the self-signed deployments this client talks to.
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: true,
        }
    }
}

impl TransportConfig {
    pub fn client_builder(&self) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
    }
}

/// PEM material presented to the identity server for mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    pub cert_path: PathBuf,
    /// Separate key file; `None` when the key is bundled in `cert_path`.
    pub key_path: Option<PathBuf>,
}

impl ClientCertificate {
    pub fn identity(&self) -> Result<reqwest::Identity, Error> {
        let mut pem = read(&self.cert_path)?;
        if let Some(key_path) = &self.key_path {
            pem.push(b'\n');
            pem.extend(read(key_path)?);
        }
        reqwest::Identity::from_pem(&pem).map_err(Error::Tls)
    }
}

fn read(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Clone, PartialEq, Eq)]
pub struct KeyCloakConfig {
    /// Realm URL, e.g. `https://sso.example.com/realms/inventory`.
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub certificate: Option<ClientCertificate>,
}

impl std::fmt::Debug for KeyCloakConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCloakConfig")
            .field("url", &self.url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("username", &self.username)
            .field("certificate", &self.certificate)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Value of the `x-auth-token` header.
    pub auth_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub keycloak: KeyCloakConfig,
    pub client: ClientConfig,
    pub transport: TransportConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(Error::Missing(key));

        let certificate = lookup("KEYCLOAK_CLIENT_CERT").map(|cert| ClientCertificate {
            cert_path: cert.into(),
            key_path: lookup("KEYCLOAK_CLIENT_KEY").map(Into::into),
        });

        let keycloak = KeyCloakConfig {
            url: required("KEYCLOAK_URL")?,
            client_id: required("KEYCLOAK_CLIENT_ID")?,
            client_secret: required("KEYCLOAK_CLIENT_SECRET")?,
            username: lookup("KEYCLOAK_USERNAME").unwrap_or_else(|| DEFAULT_USERNAME.to_owned()),
            certificate,
        };

        let client = ClientConfig {
            base_url: required("IM_BASE_URL")?,
            auth_token: required("IM_AUTH_TOKEN")?,
        };

        let mut transport = TransportConfig::default();
        if let Some(value) = lookup("IM_TIMEOUT_SECS") {
            let secs = value.trim().parse::<u64>().map_err(|_| Error::Invalid {
                key: "IM_TIMEOUT_SECS",
                value: value.clone(),
            })?;
            transport.timeout = Duration::from_secs(secs);
        }
        if let Some(value) = lookup("IM_ACCEPT_INVALID_CERTS") {
            transport.accept_invalid_certs = parse_bool(&value).ok_or(Error::Invalid {
                key: "IM_ACCEPT_INVALID_CERTS",
                value,
            })?;
        }

        Ok(Self {
            keycloak,
            client,
            transport,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
