//! Configuration loading for a provider node.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Provider configuration loaded from TOML + environment overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Data directory for provider state (keypair, blob store)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Ed25519 keypair path for signing protocol responses
    #[serde(default = "default_keypair_path")]
    pub keypair_path: PathBuf,

    /// Sled database path for blob and chain-state storage
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// HTTP listen address for the protocol RPC endpoint
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/provider")
}

fn default_keypair_path() -> PathBuf {
    PathBuf::from("data/provider/keypair.bin")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/provider/blobs.db")
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:4001".parse().unwrap()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            keypair_path: default_keypair_path(),
            db_path: default_db_path(),
            listen_addr: default_listen_addr(),
        }
    }
}

/// Load configuration from TOML file with environment variable overrides.
pub fn load_config(path: Option<&str>) -> anyhow::Result<ProviderConfig> {
    let config_path = path.map(std::path::Path::new).or_else(|| {
        let default = std::path::Path::new("provider.toml");
        default.exists().then_some(default)
    });

    let config = match config_path {
        Some(p) => toml::from_str(&std::fs::read_to_string(p)?)?,
        None => ProviderConfig::default(),
    };

    Ok(apply_env_overrides(config))
}

fn apply_env_overrides(mut config: ProviderConfig) -> ProviderConfig {
    if let Ok(val) = std::env::var("PROVIDER_DATA_DIR") {
        config.data_dir = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("PROVIDER_KEYPAIR_PATH") {
        config.keypair_path = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("PROVIDER_DB_PATH") {
        config.db_path = PathBuf::from(val);
    }
    if let Some(addr) = std::env::var("PROVIDER_LISTEN_ADDR")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        config.listen_addr = addr;
    }
    config
}
