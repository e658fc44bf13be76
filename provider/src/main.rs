//! Provider entry point for the Custos storage network.
//!
//! The provider receives ciphertext from the coordinator, stores it in sled,
//! and answers proof-of-storage challenges and retrievals over HTTP.

use anyhow::Result;
use clap::Parser;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use provider::handlers::{router, AppState};
use provider::{load_config, ProviderNode, ProviderStore};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file (default: provider.toml if present)
    #[arg(long, env = "PROVIDER_CONFIG")]
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
    let store = ProviderStore::open(&config.db_path)?;
    let node = Arc::new(ProviderNode::new(store, signing_key));

    info!(
        provider_id = %node.provider_id(),
        listen_addr = %config.listen_addr,
        blobs = node.store().blob_count(),
        "Provider started"
    );

    let app = router(AppState { node });
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Load or generate the provider's Ed25519 keypair.
fn load_keypair(path: &Path) -> Result<SigningKey> {
    if path.exists() {
        let bytes = std::fs::read(path)?;
        let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!(
                "Corrupted keypair file at {}: expected 32 bytes. Delete the file to regenerate.",
                path.display()
            )
        })?;
        debug!(path = %path.display(), "Loaded existing keypair");
        return Ok(SigningKey::from_bytes(&bytes));
    }

    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let key = SigningKey::from_bytes(&bytes);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, key.to_bytes())?;
    info!(path = %path.display(), "Generated new keypair");
    Ok(key)
}
