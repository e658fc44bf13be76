//! Coordinator entry point for the Custos storage network.
//!
//! Bootstraps config, identity, and state, connects to the configured
//! providers, then serves the user API while a ticker drives challenge
//! rounds against every placed item.

use anyhow::Result;
use clap::Parser;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use coordinator::api::{router, AppState};
use coordinator::gateway::EncryptionGateway;
use coordinator::metrics::Metrics;
use coordinator::placement::{PlacementConfig, PlacementCoordinator};
use coordinator::rounds::ChallengeRunner;
use coordinator::state::CoordinatorState;
use coordinator::transport::{HttpProviderClient, ProviderClient, StaticRegistry};
use coordinator::{load_config, NetworkContext};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file (default: coordinator.toml if present)
    #[arg(long, env = "COORDINATOR_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    std::fs::create_dir_all(&config.data_dir)?;

    let signing_key = load_keypair(&config.keypair_path)?;
    let custodial_secret = load_secret(&config.custodial_key_path)?;
    let context = Arc::new(NetworkContext::new(signing_key, custodial_secret));

    let state = Arc::new(CoordinatorState::open(&config.db_path)?);
    let gateway = Arc::new(EncryptionGateway::new(
        *context.custodial_secret(),
        state.payloads_tree(),
    ));
    let metrics = Arc::new(Metrics::new());
    metrics.placement_records.set(state.record_count() as i64);

    // Connect to the configured provider set; unreachable providers are
    // skipped at startup and can be re-added on a peer-set-changed event.
    let mut clients: Vec<Arc<dyn ProviderClient>> = Vec::new();
    for url in &config.provider_urls {
        match HttpProviderClient::connect(url).await {
            Ok(client) => clients.push(Arc::new(client)),
            Err(e) => warn!(url = %url, error = %e, "Failed to connect to provider"),
        }
    }
    if clients.len() < config.redundancy_factor {
        warn!(
            connected = clients.len(),
            redundancy_factor = config.redundancy_factor,
            "Fewer providers than the redundancy factor; stores may fail quorum"
        );
    }
    let registry = Arc::new(StaticRegistry::new(clients));

    let provider_timeout = Duration::from_secs(config.provider_timeout_secs);
    let placement = Arc::new(PlacementCoordinator::new(
        state.clone(),
        registry.clone(),
        context.clone(),
        PlacementConfig {
            redundancy_factor: config.redundancy_factor,
            quorum: config.quorum_policy,
            chunk_size: config.chunk_size,
            provider_timeout,
        },
        metrics.clone(),
    ));
    let runner = Arc::new(ChallengeRunner::new(
        state.clone(),
        registry.clone(),
        context.clone(),
        provider_timeout,
        metrics.clone(),
    ));

    info!(
        listen_addr = %config.listen_addr,
        providers = config.provider_urls.len(),
        redundancy_factor = config.redundancy_factor,
        quorum_policy = ?config.quorum_policy,
        challenge_interval_secs = config.challenge_interval_secs,
        records = state.record_count(),
        "Coordinator started"
    );

    // The ticker is the external clock driving challenge rounds; the round
    // logic itself only reacts to these events.
    let tick_runner = runner.clone();
    let rounds_per_tick = config.rounds_per_tick;
    let mut ticker = tokio::time::interval(Duration::from_secs(config.challenge_interval_secs));
    tokio::spawn(async move {
        loop {
            ticker.tick().await;
            let outcomes = tick_runner.run_tick(rounds_per_tick).await;
            if !outcomes.is_empty() {
                debug!(rounds = outcomes.len(), "Challenge tick completed");
            }
        }
    });

    let app = router(AppState {
        placement,
        gateway,
        state,
        metrics,
    });
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Load or generate the coordinator's Ed25519 keypair.
fn load_keypair(path: &Path) -> Result<SigningKey> {
    Ok(SigningKey::from_bytes(&load_secret(path)?))
}

/// Load or generate a 32-byte secret file.
fn load_secret(path: &Path) -> Result<[u8; 32]> {
    if path.exists() {
        let bytes = std::fs::read(path)?;
        let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!(
                "Corrupted key file at {}: expected 32 bytes. Delete the file to regenerate.",
                path.display()
            )
        })?;
        debug!(path = %path.display(), "Loaded existing key");
        return Ok(bytes);
    }

    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    info!(path = %path.display(), "Generated new key");
    Ok(bytes)
}
