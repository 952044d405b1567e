//! synq command-line entry point.
//!
//! Results go to stdout as JSON lines; logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use synq_client::{RestConfig, RestSource};
use synq_core::{CacheConfig, QueryCache, SyncConfig};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Command};
use commands::Engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let mut config = SyncConfig::load().context("failed to load configuration")?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    if let Command::Prefs { action } = cli.command {
        return commands::prefs(&config, action).await;
    }

    let source = RestSource::new(RestConfig::from(&config))?;
    tracing::info!(base_url = %source.base_url(), "starting synq");
    let engine = Engine { cache: QueryCache::new(CacheConfig::from(&config)), source: Arc::new(source), config };

    let result = match cli.command {
        Command::List { resource, keyword, filters, size, limit, viewport } => {
            commands::list(&engine, resource, keyword, filters, size, limit, viewport).await
        }
        Command::Search { storage, text, keystroke_ms } => {
            commands::search(&engine, storage, &text, keystroke_ms).await
        }
        Command::Mutate { method, resource, id, body } => commands::mutate(&engine, method, resource, id, body).await,
        Command::Prefs { .. } => Ok(()),
    };

    engine.cache.shutdown();
    result
}
