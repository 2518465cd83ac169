//! Companion engine binary.
//!
//! Wires the storage backend, media vendor, and prompt templates into the
//! pet manager, generation orchestrator, and status poller, then serves
//! the HTTP API until the process is stopped.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `companion-config.yaml` (or the path given
//!    as the first argument, or `COMPANION_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Open the storage backend (in-memory or `PostgreSQL`)
//! 4. Build the media vendor client and prompt engine
//! 5. Start the expiry sweeper
//! 6. Serve the HTTP API

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use companion_api::state::AppState;
use companion_core::config::{LoggingConfig, StorageKind};
use companion_core::{
    CompanionConfig, Orchestrator, PetManager, PromptEngine, StatusPoller, create_vendor,
};
use companion_db::{MemoryStore, PetStore, PgPetStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Config file used when neither an argument nor `COMPANION_CONFIG` names one.
const DEFAULT_CONFIG_PATH: &str = "companion-config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config_path = config_path();
    let config = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        config = %config_path.display(),
        port = config.server.port,
        storage = ?config.infrastructure.storage,
        vendor = ?config.vendor.backend,
        "companion-server starting"
    );

    // 3. Storage.
    let store = open_store(&config).await?;

    // 4. Engine services.
    let manager = Arc::new(PetManager::new(
        store,
        config.scoring.clone(),
        config.economy,
        config.generation.cas_retries,
    ));
    let vendor = create_vendor(&config.vendor).context("failed to build media vendor client")?;
    let prompts = match &config.generation.templates_dir {
        Some(dir) => PromptEngine::from_dir(Path::new(dir))
            .with_context(|| format!("failed to load prompt templates from {dir}"))?,
        None => PromptEngine::new().context("failed to load built-in prompt templates")?,
    };
    let orchestrator = Orchestrator::new(
        Arc::clone(&manager),
        Arc::new(vendor),
        Arc::new(prompts),
        config.generation.clone(),
    );
    let poller = StatusPoller::new(Arc::clone(&manager), config.generation.clone());

    // 5. Expiry sweeper.
    spawn_sweeper(orchestrator.clone());

    // 6. HTTP API.
    let state = Arc::new(AppState::new(manager, orchestrator, poller));
    companion_api::start_server(&config.server, state)
        .await
        .context("HTTP server failed")?;

    info!("companion-server shutdown complete");
    Ok(())
}

/// First CLI argument, then `COMPANION_CONFIG`, then the default file name.
fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("COMPANION_CONFIG").ok())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load the configuration, falling back to defaults when the file is absent.
fn load_config(path: &Path) -> anyhow::Result<CompanionConfig> {
    if path.exists() {
        CompanionConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))
    } else {
        let mut config = CompanionConfig::default();
        config.apply_env_overrides();
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// `RUST_LOG` wins; otherwise `logging.level` from the config.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

async fn open_store(config: &CompanionConfig) -> anyhow::Result<Arc<dyn PetStore>> {
    match config.infrastructure.storage {
        StorageKind::Memory => {
            info!("using in-memory store; state is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageKind::Postgres => {
            let store = PgPetStore::connect(
                &config.infrastructure.database_url,
                config.infrastructure.max_connections,
            )
            .await
            .context("failed to open PostgreSQL pet store")?;
            Ok(Arc::new(store))
        }
    }
}

/// Periodically fail jobs that outlived the generation ceiling.
fn spawn_sweeper(orchestrator: Orchestrator) {
    let period = orchestrator.timing().sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match orchestrator.reap_expired().await {
                Ok(0) => {}
                Ok(reaped) => info!(reaped, "expired generation jobs failed"),
                Err(e) => tracing::warn!(error = %e, "expiry sweep failed"),
            }
        }
    });
    info!(period_secs = period.as_secs(), "expiry sweeper started");
}
