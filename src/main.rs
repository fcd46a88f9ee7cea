// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;

use easyflix_mediator::{
    api::router,
    auth::{SessionStore, SessionSweeper},
    commands::Dispatcher,
    config::{Config, ConfigError, LogFormat, DEFAULT_LOG_FILTER},
    crypto::{credentials::EntropyError, hash_password, ChannelError, SecureChannel},
    mediator::Mediator,
    state::AppState,
    storage::{seed, Store, StoreError},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("database: {0}")]
    Store(#[from] StoreError),

    #[error("secure channel: {0}")]
    Channel(#[from] ChannelError),

    #[error("admin bootstrap: {0}")]
    Entropy(#[from] EntropyError),

    #[error("server: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("easyflix-mediator: {err}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_format);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Mediator stopped");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    info!(?config, "Starting EasyFlix mediator");

    let store = Arc::new(Store::open(&config.db_path)?);
    info!(path = %config.db_path.display(), "Database opened");

    if let Some(admin) = &config.admin {
        let created = seed::ensure_admin(&store, &admin.username, hash_password(&admin.password)?)?;
        if created {
            info!(target: "audit", username = %admin.username, "Bootstrap admin created");
        }
    }
    if config.seed_catalog {
        let inserted = seed::seed_catalog(&store)?;
        info!(inserted, "Catalog seeding finished");
    }

    let channel = SecureChannel::derive(
        &config.channel_secret,
        &config.channel_salt,
        config.kdf_iterations,
        config.token_ttl,
    )?;
    let sessions = Arc::new(SessionStore::new(config.session_capacity, config.session_ttl));
    let dispatcher = Dispatcher::new(store, sessions.clone(), config.pricing);
    let state = AppState::new(Mediator::new(channel, dispatcher));

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(SessionSweeper::new(sessions).run(shutdown.clone()));

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "EasyFlix mediator listening (docs at /docs)");

    let signal = shutdown.clone();
    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
                _ = signal.cancelled() => {},
            }
        })
        .await;

    shutdown.cancel();
    if let Err(err) = sweeper.await {
        error!(error = %err, "Session sweeper task failed");
    }
    served?;
    info!("EasyFlix mediator stopped");
    Ok(())
}
