use anyhow::Context;
use clap::{Parser, Subcommand};
use im_client::{
    auth::{client_credentials::ClientCredentials, token_manager::TokenManager},
    config::Config,
    HttpClient,
};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Call the inventory manager API with a KeyCloak service account.
///
/// Connection settings come from the environment (`KEYCLOAK_URL`,
/// `KEYCLOAK_CLIENT_ID`, `KEYCLOAK_CLIENT_SECRET`, `IM_BASE_URL`,
/// `IM_AUTH_TOKEN`, ...).
#[derive(Debug, Parser)]
#[command(name = "im-client", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Get {
        path: String,
    },
    Post {
        path: String,
        /// JSON request body.
        #[arg(long)]
        data: Option<String>,
    },
    Put {
        path: String,
        /// JSON request body.
        #[arg(long)]
        data: String,
    },
    Delete {
        path: String,
        /// JSON request body.
        #[arg(long)]
        data: Option<String>,
    },
}

fn parse_payload(data: Option<&str>) -> anyhow::Result<Option<Value>> {
    data.map(|data| serde_json::from_str(data).context("--data is not valid JSON"))
        .transpose()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let auth_provider = ClientCredentials::from_config(&config.keycloak, &config.transport)?;
    let auth_provider = TokenManager::logged_in(auth_provider)
        .await
        .context("logging in to KeyCloak")?;

    info!(message = "Logged in", keycloak_url = %config.keycloak.url);

    let client = HttpClient::from_config(&config.client, &config.transport, auth_provider)?;

    let result = match cli.command {
        Command::Get { path } => client.get(&path).await,
        Command::Post { path, data } => {
            let payload = parse_payload(data.as_deref())?;
            client.post(&path, payload.as_ref()).await
        }
        Command::Put { path, data } => {
            let payload = parse_payload(Some(&data))?.unwrap_or(Value::Null);
            client.put(&path, &payload).await
        }
        Command::Delete { path, data } => {
            let payload = parse_payload(data.as_deref())?;
            client.delete(&path, payload.as_ref()).await
        }
    };

    match result {
        Ok(Some(payload)) => println!("{}", serde_json::to_string_pretty(&payload)?),
        Ok(None) => {}
        Err(err) => {
            if let Some(body) = err.degraded_body() {
                println!("{}", serde_json::to_string_pretty(body)?);
            }
            return Err(err.into());
        }
    }

    Ok(())
}
