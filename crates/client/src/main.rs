//! Jobfair Listen - command-line notification listener
//!
//! Connects to the notification stream and logs every event until Ctrl-C.
//!
//! Environment variables:
//! - `JOBFAIR_COMPANY_TOKEN`: connect as a company dashboard
//! - `JOBFAIR_ACCESS_TOKEN`: connect as a logged-in user (falls back to the
//!   stored token)
//! - `JOBFAIR_USER_ID`: user id for the bearer session (default: `cli`)
//! - plus everything [`ClientConfig::from_env`] reads
//!
//! `--save-token` and `--forget-token` maintain the stored credentials and
//! exit without connecting.

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use jobfair_client::{
    handler, install_default_consumers, log_debug, log_info, log_warn, logging, AuthState,
    ClientConfig, ClientEvent, QueryGroup, QueryInvalidator, SessionBinding, ToastLevel, Toaster,
    TokenStore, TungsteniteConnector, WsClient,
};
use jobfair_shared::EventKind;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "jobfair-listen")]
#[command(about = "Log the jobfair notification stream until Ctrl-C")]
struct Cli {
    /// Store an access token for later bearer sessions, then exit
    #[arg(long, value_name = "ACCESS", conflicts_with = "forget_token")]
    save_token: Option<String>,

    /// Refresh token stored alongside --save-token (keeps the stored one if omitted)
    #[arg(long, value_name = "REFRESH", requires = "save_token")]
    refresh_token: Option<String>,

    /// Remove the stored tokens, then exit
    #[arg(long)]
    forget_token: bool,
}

/// Stands in for the dashboard's query cache and toast area.
struct ConsoleConsumer;

impl QueryInvalidator for ConsoleConsumer {
    fn invalidate(&self, group: QueryGroup) {
        log_debug!("Would refetch '{}'", group);
    }
}

impl Toaster for ConsoleConsumer {
    fn show(&self, message: &str, level: ToastLevel) {
        match level {
            ToastLevel::Success => log_warn!("!! {}", message),
            ToastLevel::Info => log_info!("{}", message),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    if cli.save_token.is_some() || cli.forget_token {
        let store = TokenStore::open_default().context("no config directory for the token store")?;
        update_store(&cli, &store)?;
        return Ok(());
    }

    let config = ClientConfig::from_env().context("invalid client configuration")?;
    let ping_interval = config.ping_interval;

    let company_token = env_non_empty("JOBFAIR_COMPANY_TOKEN");
    let access_token = env_non_empty("JOBFAIR_ACCESS_TOKEN")
        .or_else(|| TokenStore::open_default().and_then(|store| store.access_token()));

    let client = WsClient::new(config, TungsteniteConnector)?;
    client.on(
        EventKind::Message,
        handler(|event: &ClientEvent| {
            if let ClientEvent::Message(frame) = event {
                log_info!("<- {}", frame);
            }
            Ok(())
        }),
    );
    client.on(
        EventKind::Connection,
        handler(|event: &ClientEvent| {
            if let ClientEvent::Connection(status) = event {
                log_info!("connection {}", status);
            }
            Ok(())
        }),
    );
    let consumer = Arc::new(ConsoleConsumer);
    let _consumers = install_default_consumers(client.router(), consumer.clone(), consumer);

    let (auth_tx, auth_rx) = watch::channel(AuthState::Unauthenticated);
    let mut session = SessionBinding::new(client, auth_rx);
    if let Some(period) = ping_interval {
        session = session.with_keepalive(period);
    }

    if let Some(token) = company_token {
        session.connect_with_company_token(token);
    } else if let Some(token) = access_token {
        let user_id = env_non_empty("JOBFAIR_USER_ID").unwrap_or_else(|| "cli".to_string());
        auth_tx.send_replace(AuthState::authenticated(user_id, token));
    } else {
        bail!("set JOBFAIR_COMPANY_TOKEN or JOBFAIR_ACCESS_TOKEN, or store one with --save-token");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    log_info!("Shutting down");
    session.shutdown();
    Ok(())
}

/// Apply `--save-token` / `--forget-token` to `store`.
fn update_store(cli: &Cli, store: &TokenStore) -> anyhow::Result<()> {
    if cli.forget_token {
        store.clear_tokens();
        log_info!("Removed stored tokens from {}", store.dir().display());
        return Ok(());
    }
    let Some(access) = cli.save_token.as_deref() else {
        return Ok(());
    };
    let refresh = cli
        .refresh_token
        .clone()
        .or_else(|| store.refresh_token())
        .unwrap_or_default();
    if !store.set_tokens(access, &refresh) {
        bail!("could not write tokens to {}", store.dir().display());
    }
    log_info!("Stored access token in {}", store.dir().display());
    Ok(())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
