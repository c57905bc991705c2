//! `linkdeck` command-line front end
//!
//! Every invocation opens the engine over a directory store, reconciles with
//! the server, applies one command, then pushes the result.

mod cli;
mod commands;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, DEFAULT_DIR};
use linkdeck_core::{
    BootstrapOutcome, EngineConfig, FileStore, HttpRemote, MemoryRemote, RemoteStore, SyncEngine,
};
use logging::Verbosity;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_subscriber(Verbosity::from_flags(cli.verbose, cli.quiet), cli.no_color);

    let config = load_config(&cli)?;
    let has_remote = config.remote.endpoint.is_some();
    commands::require_remote(&cli.command, has_remote)?;

    let dir = config
        .storage
        .dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR));
    let store = FileStore::open(&dir)
        .with_context(|| format!("opening storage at {}", dir.display()))?;
    let remote = build_remote(&config)?;
    let engine = SyncEngine::new(config, Arc::new(store), remote)?;

    if has_remote {
        let outcome = engine.bootstrap().await?;
        if outcome == BootstrapOutcome::Offline {
            tracing::warn!("server unreachable, working locally");
        }
    }

    {
        let mut stdout = std::io::stdout().lock();
        commands::run(&engine, &cli.command, &mut stdout)?;
    }

    if has_remote && engine.sync().is_bootstrapped() {
        match engine.flush().await {
            Ok(outcome) => tracing::info!(?outcome, revision = engine.revision(), "synced"),
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "push failed, changes kept locally");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// File config, then command-line overrides
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &cli.dir {
        config = config.with_storage_dir(dir);
    }
    if let Some(endpoint) = &cli.endpoint {
        config = config.with_endpoint(endpoint);
    }
    config.validate()?;
    Ok(config)
}

fn build_remote(config: &EngineConfig) -> Result<Arc<dyn RemoteStore>> {
    let Some(endpoint) = &config.remote.endpoint else {
        let local_only = MemoryRemote::new();
        local_only.set_offline(true);
        return Ok(Arc::new(local_only));
    };

    let mut remote = HttpRemote::new(endpoint.clone(), config.remote.timeout())?;
    if let Some(token) = &config.remote.auth_token {
        remote = remote.with_auth_token(token.clone());
    }
    Ok(Arc::new(remote))
}
