use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use jobsync_engine::{
    ConnectionManager, CredentialSource, EngineError, EnvCredential, RestSnapshotClient,
};
use jobsync_logging::{sync_error, sync_info, sync_warn};
use thiserror::Error;

use super::config::{AppConfig, ConfigError, DEFAULT_CONFIG_PATH};
use super::{logging, render};

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] io::Error),
}

pub fn run_app() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            sync_error!("{}", err);
            eprintln!("jobsync: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), AppError> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = AppConfig::load(&config_path)?;
    logging::initialize(&config.log);
    sync_info!("Watching {}", config.events_url);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(watch(config))
}

async fn watch(config: AppConfig) -> Result<(), AppError> {
    let credential = EnvCredential::new(config.token_env.clone());
    let manager = ConnectionManager::new(config.sync_settings())?;

    if credential.access_token().is_none() {
        sync_warn!("{} is not set; the connection will fail", credential.var());
    }
    prefetch(&config, &credential, &manager).await;
    manager.connect_with(&credential);

    let changes = manager.changes();
    let mut ticker = tokio::time::interval(config.render_interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    // Redraw on the ticker, and only when something changed since the last frame.
    let mut rendered = None;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }
        let revision = *changes.borrow();
        if rendered != Some(revision) {
            print!("{}", render::render(&manager.view()));
            rendered = Some(revision);
        }
    }

    sync_info!("Interrupted; disconnecting");
    manager.disconnect();
    Ok(())
}

/// Seeds the store from REST so the first frame is not empty.
async fn prefetch(config: &AppConfig, credential: &EnvCredential, manager: &ConnectionManager) {
    let (Some(settings), Some(token)) = (config.rest_settings(), credential.access_token()) else {
        return;
    };
    let client = match RestSnapshotClient::new(settings) {
        Ok(client) => client,
        Err(err) => {
            sync_warn!("REST prefetch unavailable: {}", err);
            return;
        }
    };
    match client.fetch_jobs(&token).await {
        Ok(records) => {
            sync_info!("Prefetched {} jobs over REST", records.len());
            manager.merge_rest_snapshot(records);
        }
        Err(err) => sync_warn!("REST prefetch failed: {}", err),
    }
}
