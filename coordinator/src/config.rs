//! Configuration loading for the coordinator.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::placement::QuorumPolicy;

/// Coordinator configuration loaded from TOML + environment overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Data directory for coordinator state (keys, placement database)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Ed25519 keypair path for the coordinator's network identity
    #[serde(default = "default_keypair_path")]
    pub keypair_path: PathBuf,

    /// Custodial secret path (32 bytes) for envelope key derivation
    #[serde(default = "default_custodial_key_path")]
    pub custodial_key_path: PathBuf,

    /// Sled database path for placement records and payload descriptors
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// HTTP listen address for the user API (store, retrieve, metrics)
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Provider RPC base URLs to connect to at startup
    #[serde(default)]
    pub provider_urls: Vec<String>,

    /// Number of distinct providers targeted per store
    #[serde(default = "default_redundancy_factor")]
    pub redundancy_factor: usize,

    /// Quorum required for a store to succeed: all, majority, or at_least_one
    #[serde(default = "default_quorum_policy")]
    pub quorum_policy: QuorumPolicy,

    /// Chunk size in bytes for ciphertext Merkle trees
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Timeout in seconds for each provider round trip
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Seconds between challenge scheduler ticks
    #[serde(default = "default_challenge_interval_secs")]
    pub challenge_interval_secs: u64,

    /// Maximum challenge rounds issued per tick
    #[serde(default = "default_rounds_per_tick")]
    pub rounds_per_tick: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/coordinator")
}

fn default_keypair_path() -> PathBuf {
    PathBuf::from("data/coordinator/keypair.bin")
}

fn default_custodial_key_path() -> PathBuf {
    PathBuf::from("data/coordinator/custodial.bin")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/coordinator/state.db")
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:4000".parse().unwrap()
}

fn default_redundancy_factor() -> usize {
    3
}

fn default_quorum_policy() -> QuorumPolicy {
    QuorumPolicy::Majority
}

fn default_chunk_size() -> u32 {
    pos_commitments::DEFAULT_CHUNK_SIZE as u32
}

fn default_provider_timeout_secs() -> u64 {
    10
}

fn default_challenge_interval_secs() -> u64 {
    30
}

fn default_rounds_per_tick() -> usize {
    10
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            keypair_path: default_keypair_path(),
            custodial_key_path: default_custodial_key_path(),
            db_path: default_db_path(),
            listen_addr: default_listen_addr(),
            provider_urls: Vec::new(),
            redundancy_factor: default_redundancy_factor(),
            quorum_policy: default_quorum_policy(),
            chunk_size: default_chunk_size(),
            provider_timeout_secs: default_provider_timeout_secs(),
            challenge_interval_secs: default_challenge_interval_secs(),
            rounds_per_tick: default_rounds_per_tick(),
        }
    }
}

/// Load configuration from TOML file with environment variable overrides.
pub fn load_config(path: Option<&str>) -> anyhow::Result<CoordinatorConfig> {
    let config_path = path.map(std::path::Path::new).or_else(|| {
        let default = std::path::Path::new("coordinator.toml");
        default.exists().then_some(default)
    });

    let config = match config_path {
        Some(p) => toml::from_str(&std::fs::read_to_string(p)?)?,
        None => CoordinatorConfig::default(),
    };

    Ok(apply_env_overrides(config))
}

/// Read an env var and parse it, returning None if missing or parse fails.
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn apply_env_overrides(mut config: CoordinatorConfig) -> CoordinatorConfig {
    if let Ok(val) = std::env::var("COORDINATOR_DATA_DIR") {
        config.data_dir = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("COORDINATOR_KEYPAIR_PATH") {
        config.keypair_path = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("COORDINATOR_CUSTODIAL_KEY_PATH") {
        config.custodial_key_path = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("COORDINATOR_DB_PATH") {
        config.db_path = PathBuf::from(val);
    }
    if let Some(addr) = env_parse("COORDINATOR_LISTEN_ADDR") {
        config.listen_addr = addr;
    }
    if let Ok(val) = std::env::var("COORDINATOR_PROVIDER_URLS") {
        config.provider_urls = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(v) = env_parse("COORDINATOR_REDUNDANCY_FACTOR") {
        config.redundancy_factor = v;
    }
    if let Some(v) = env_parse("COORDINATOR_QUORUM_POLICY") {
        config.quorum_policy = v;
    }
    if let Some(v) = env_parse("COORDINATOR_CHUNK_SIZE") {
        config.chunk_size = v;
    }
    if let Some(v) = env_parse("COORDINATOR_PROVIDER_TIMEOUT_SECS") {
        config.provider_timeout_secs = v;
    }
    if let Some(v) = env_parse("COORDINATOR_CHALLENGE_INTERVAL_SECS") {
        config.challenge_interval_secs = v;
    }
    if let Some(v) = env_parse("COORDINATOR_ROUNDS_PER_TICK") {
        config.rounds_per_tick = v;
    }
    config
}
