//! Bí Cảnh coordination server
//!
//! Opens the database, wires Discord delivery and serves the request
//! protocol until interrupted.
//!
//! `bicanh-server generate-key` prints a new API key and its hash.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bicanh_core::{Database, NoopNotifier, Notifier};
use bicanh_net::Server;

mod auth;
mod config;
mod discord;
mod dispatch;
mod error;
mod state;

use config::Config;
use discord::DiscordNotifier;
use dispatch::Dispatcher;
use error::{Error, Result};
use state::AppState;

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let result = match std::env::args().nth(1).as_deref() {
        None | Some("serve") => serve(),
        Some("generate-key") => print_new_key(),
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Usage: bicanh-server [serve | generate-key]");
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn print_new_key() -> Result<()> {
    let generated = auth::generate_key()?;
    println!("API key (give to the bot):\n  {}", generated.key);
    println!();
    println!("Config entry:\n  [auth]\n  api_key_hash = \"{}\"", generated.hash);
    Ok(())
}

fn serve() -> Result<()> {
    let config = Config::load()?;

    let keys = auth::KeyVerifier::new(config.auth.api_key_hash.clone())?;
    if config.auth.api_key_hash.is_none() {
        return Err(Error::ConfigInvalid(
            "auth.api_key_hash is not set; run `bicanh-server generate-key`".into(),
        ));
    }

    let db_path = config.database_path()?;
    let db = Database::open(&db_path)?;
    tracing::info!(path = %db_path.display(), schema = db.schema_version(), "Database ready");

    let runtime = tokio::runtime::Runtime::new()?;

    let discord = DiscordNotifier::new(&config.discord, runtime.handle().clone());
    let configured = discord.has_direct_messages() || discord.has_announcements();
    let notifier: Arc<dyn Notifier> = if configured {
        if !discord.has_direct_messages() {
            tracing::warn!("discord.bot_token not set, direct messages will fail");
        }
        if !discord.has_announcements() {
            tracing::warn!("discord.webhook_url not set, announcements will fail");
        }
        Arc::new(discord)
    } else {
        tracing::warn!("Discord not configured, notifications disabled");
        Arc::new(NoopNotifier)
    };

    let state = Arc::new(AppState::new(db, notifier, config.scoring.meeting_credit));
    let dispatcher = Arc::new(Dispatcher::new(state, keys));

    runtime.block_on(async move {
        let server =
            Server::start_with_limit(config.server.bind, dispatcher, config.server.max_connections)
                .await?;
        tracing::info!(addr = %server.addr(), "Serving");

        tokio::signal::ctrl_c().await?;
        server.shutdown();
        Ok::<(), Error>(())
    })
}
