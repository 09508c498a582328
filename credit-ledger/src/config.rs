//! Configuration for the registry ledger

use crate::{attestation::DEFAULT_VALIDITY_DAYS, buffer::DEFAULT_BUFFER_BPS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Metrics listen address
    pub metrics_listen_addr: String,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// Snapshot every N facts (0 disables snapshots)
    pub snapshot_interval_facts: u64,

    /// Ledger policy knobs
    pub policy: PolicyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/registry"),
            service_name: "credit-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            rocksdb: RocksDbConfig::default(),
            snapshot_interval_facts: 10_000,
            policy: PolicyConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 128,
            max_write_buffer_number: 4,
            target_file_size_mb: 128,
            max_background_jobs: 4,
        }
    }
}

/// Policy knobs baked into a fresh ledger. Governance can retune the first
/// two at runtime; the transitions take precedence after replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Attestation validity window in days
    pub attestation_validity_days: u32,

    /// Buffer reserve percentage applied when no custom value is given, bps
    pub default_buffer_bps: u16,

    /// Refuse mints against an MRV without a valid, unexpired attestation
    pub require_attested_mint: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            attestation_validity_days: DEFAULT_VALIDITY_DAYS,
            default_buffer_bps: DEFAULT_BUFFER_BPS,
            require_attested_mint: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("REGISTRY_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("REGISTRY_METRICS_ADDR") {
            config.metrics_listen_addr = addr;
        }

        if let Ok(flag) = std::env::var("REGISTRY_REQUIRE_ATTESTED_MINT") {
            config.policy.require_attested_mint = flag == "1" || flag.eq_ignore_ascii_case("true");
        }

        Ok(config)
    }
}
