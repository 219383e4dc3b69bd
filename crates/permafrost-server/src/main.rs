use anyhow::{Context, Result};
use clap::Parser;
use permafrost_server::cli::{Cli, Command};
use permafrost_server::{router, AppState, ServerConfig, TaskRunner};
use permafrost_core::{
    BackendRegistry, Coordinator, Ledger, Role, RootRegistry, RootsDocument, SqliteLedger,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(&config).await,
        Command::CheckConfig { config } => check_config(&config),
    }
}

fn load_config(path: &Path) -> Result<ServerConfig> {
    if path.exists() {
        ServerConfig::from_file(path)
    } else {
        tracing::warn!("Config file not found, using defaults: {}", path.display());
        Ok(ServerConfig::default())
    }
}

async fn serve(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    tracing::info!(
        "Permafrost starting in {:?} role, roots from {}",
        config.role,
        config.roots_file.display()
    );

    let doc = RootsDocument::from_file(&config.roots_file)
        .with_context(|| format!("loading roots from {}", config.roots_file.display()))?;
    let registry = Arc::new(RootRegistry::load(&doc, config.role)?);
    tracing::info!("Loaded {} roots", registry.roots().len());

    if let Some(parent) = config.ledger_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let ledger: Arc<dyn Ledger> = Arc::new(SqliteLedger::open(&config.ledger_path)?);
    let backends = Arc::new(BackendRegistry::with_defaults());

    let runner = TaskRunner::new(
        ledger.clone(),
        registry.clone(),
        backends.clone(),
        config.role,
        Duration::from_secs(config.poll_interval_secs),
    );
    let coordinator = Arc::new(Coordinator::new(ledger.clone(), Arc::new(runner.clone())));

    let state = AppState {
        registry,
        ledger,
        backends,
        coordinator,
        runner,
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Permafrost API listening on {}", config.bind_addr);
    axum::serve(listener, router(state).into_make_service()).await?;
    Ok(())
}

fn check_config(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let doc = RootsDocument::from_file(&config.roots_file)
        .with_context(|| format!("loading roots from {}", config.roots_file.display()))?;

    // Validation only; skip worker probing so the check can run anywhere.
    let registry = RootRegistry::load(&doc, Role::Web)?;
    for root in registry.roots() {
        println!(
            "{} backend={} freeze_age={} exclude={:?}",
            root.local_path, root.backend, root.freeze_age, root.exclude
        );
    }
    println!("Configuration OK: {} roots", registry.roots().len());
    Ok(())
}
