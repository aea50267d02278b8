//! # ezchat
//!
//! Terminal client for ezchat rooms.
//!
//! ## Usage
//!
//! ```bash
//! # Join room 42 on the default host
//! ezchat 42
//!
//! # Custom config and token
//! ezchat 42 --config ~/ezchat.toml --token "$TOKEN"
//!
//! # Environment variables
//! EZCHAT_HOST=chat.example.com EZCHAT_SECURE=1 ezchat 42
//! ```

mod commands;
mod config;
mod metrics;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ezchat")]
#[command(version, about = "Chat in an ezchat room from the terminal", long_about = None)]
struct Cli {
    /// Room to join.
    room: u64,

    /// Path to a config file.
    #[arg(short, long, env = "EZCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Chat service host, overriding the config file.
    #[arg(long)]
    host: Option<String>,

    /// Static bearer token.
    #[arg(short, long, env = "EZCHAT_TOKEN")]
    token: Option<String>,

    /// Shell command printing a fresh token.
    #[arg(long)]
    token_command: Option<String>,

    /// Show messages oldest-first.
    #[arg(short, long)]
    reverse: bool,

    /// Show join, leave and ban notices.
    #[arg(long)]
    include_join_leave: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they do not interleave with chat output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ezchat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };
    if let Some(host) = cli.host {
        config.client.host = host;
    }
    if cli.token.is_some() {
        config.auth.token = cli.token;
    }
    if cli.token_command.is_some() {
        config.auth.token_command = cli.token_command;
    }
    config.client.feed.reverse_order |= cli.reverse;
    config.client.feed.include_join_leave |= cli.include_join_leave;

    tracing::info!("Connecting to {} room {}", config.client.host, cli.room);

    metrics::init(&config.metrics)?;

    commands::run(cli.room, config).await?;

    Ok(())
}
