//! rebootd - reboot following the configured strategy.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reboot_daemon::api::{self, AppState, AuthToken};
use reboot_daemon::config::{ConfigStore, RuntimeConfig, DEFAULT_CONFIG_PATH};
use reboot_daemon::runner::{LogOnlyRunner, RebootRunner, SystemctlRunner};
use reboot_daemon::scheduler::RebootScheduler;

#[derive(Debug, Parser)]
#[command(name = "rebootd", about = "Reboot daemon following a configured strategy")]
struct Args {
    /// Debug mode, no reboot is executed
    #[arg(short, long)]
    debug: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the persisted policy file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting rebootd");

    let runtime = RuntimeConfig::from_env();
    let config_path = args
        .config
        .or_else(|| std::env::var("REBOOTD_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let store = ConfigStore::new(config_path);
    let settings = store.load();
    info!(
        config = %store.path().display(),
        strategy = %settings.strategy,
        window = ?settings.window.as_ref().map(|w| w.start.to_string()),
        "Configuration loaded"
    );

    let runner: Arc<dyn RebootRunner> = if args.debug {
        info!("Debug mode, reboots will only be logged");
        Arc::new(LogOnlyRunner)
    } else {
        Arc::new(SystemctlRunner)
    };

    let scheduler = RebootScheduler::new(runner, store, settings.strategy, settings.window);

    let token = load_or_create_token(&runtime)?;
    let state = AppState {
        scheduler,
        auth: AuthToken::new(token),
    };

    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&runtime.listen_addr)
        .await
        .with_context(|| format!("binding {}", runtime.listen_addr))?;
    info!(listen_addr = %runtime.listen_addr, "rebootd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("rebootd shutdown complete");
    Ok(())
}

/// Reuse the token from a previous run or mint a fresh one. The file is
/// only readable by the daemon's own user; possession of its content is
/// what authorizes mutating API calls.
fn load_or_create_token(runtime: &RuntimeConfig) -> Result<String> {
    fs::create_dir_all(&runtime.state_dir)
        .with_context(|| format!("creating {}", runtime.state_dir.display()))?;

    let path = runtime.token_path();
    if let Ok(existing) = fs::read_to_string(&path) {
        let existing = existing.trim();
        if !existing.is_empty() {
            return Ok(existing.to_string());
        }
    }

    let token: String = rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(48)
        .map(char::from)
        .collect();
    fs::write(&path, &token).with_context(|| format!("writing {}", path.display()))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("restricting {}", path.display()))?;

    Ok(token)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Received shutdown signal");
}
