//! Configuration types.
//!
//! Every interval and ceiling the scheduler relies on lives here with a
//! serde default, so a minimal TOML file (or none at all, via env
//! overrides) yields a working daemon and tests can shrink timings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Marketplace coordinator API.
    #[serde(default)]
    pub marketplace: MarketplaceConfig,

    /// Chain node RPC endpoint (retrievals, exports, signing).
    #[serde(default)]
    pub node: NodeConfig,

    /// Deal-execution service RPC endpoint.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Archive storage directories.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Scheduler and attempt tuning.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Marketplace coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    /// Base URL of the coordinator API.
    #[serde(default = "default_marketplace_url")]
    pub api_url: String,

    /// How long the open-deal list stays fresh before a refresh (seconds).
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Per-counterparty ceiling on concurrent retrievals.
    #[serde(default = "default_max_per_provider")]
    pub max_concurrent_retrievals_per_provider: u32,
}

/// Chain node settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// JSON-RPC endpoint URL.
    #[serde(default = "default_node_url")]
    pub rpc_url: String,

    /// Bearer token for the RPC endpoint.
    #[serde(default)]
    pub rpc_token: String,

    /// Maximum acceptable retrieval price in attoFIL (0 = free only).
    #[serde(default)]
    pub max_retrieval_price_attofil: u128,

    /// Retrieval inactivity timeout (seconds).
    #[serde(default = "default_retrieval_timeout")]
    pub retrieval_timeout_secs: u64,
}

/// Deal-execution service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// JSON-RPC endpoint URL.
    #[serde(default = "default_execution_url")]
    pub rpc_url: String,

    /// Bearer token for the RPC endpoint.
    #[serde(default)]
    pub rpc_token: String,
}

/// Archive directory layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Long-term archive directory (pre-staged `.car` files live here).
    #[serde(default = "default_storage_dir")]
    pub longterm_dir: PathBuf,

    /// Scratch directory for freshly retrieved archives.
    #[serde(default = "default_storage_dir")]
    pub download_dir: PathBuf,
}

/// Scheduler and per-attempt tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of concurrently running acquisition attempts.
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,

    /// Candidate picks one worker cycle may make before expiring.
    #[serde(default = "default_attempts_per_cycle")]
    pub attempts_per_cycle: u32,

    /// Candidates below this padded size are never attempted (bytes).
    #[serde(default = "default_min_piece_size")]
    pub min_piece_size: u64,

    /// Pause between pending-proposal polls (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Pending-proposal polls before the attempt gives up.
    #[serde(default = "default_poll_max_retries")]
    pub poll_max_retries: u32,

    /// Period of the pre-staged archive watcher (seconds).
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,

    /// Grace before cancelling a failed retrieval, letting the transfer
    /// register with the transport layer first (seconds).
    #[serde(default = "default_cancel_grace")]
    pub cancel_grace_secs: u64,

    /// Time box on the data-transfer cancellation sweep (seconds).
    #[serde(default = "default_sweep_box")]
    pub cancel_sweep_timeout_secs: u64,
}

fn default_marketplace_url() -> String {
    "https://api.evergreen.filecoin.io".to_string()
}

fn default_refresh_interval() -> u64 {
    120 // 2 minutes
}

fn default_max_per_provider() -> u32 {
    2
}

fn default_node_url() -> String {
    "http://127.0.0.1:1234/rpc/v1".to_string()
}

fn default_retrieval_timeout() -> u64 {
    600 // 10 minutes
}

fn default_execution_url() -> String {
    "http://127.0.0.1:1288/rpc/v0".to_string()
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_max_workers() -> u32 {
    4
}

fn default_attempts_per_cycle() -> u32 {
    1
}

fn default_min_piece_size() -> u64 {
    1 << 30 // 1 GiB
}

fn default_poll_interval() -> u64 {
    60
}

fn default_poll_max_retries() -> u32 {
    15
}

fn default_watch_interval() -> u64 {
    600 // 10 minutes
}

fn default_cancel_grace() -> u64 {
    30
}

fn default_sweep_box() -> u64 {
    10
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            api_url: default_marketplace_url(),
            refresh_interval_secs: default_refresh_interval(),
            max_concurrent_retrievals_per_provider: default_max_per_provider(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_node_url(),
            rpc_token: String::new(),
            max_retrieval_price_attofil: 0,
            retrieval_timeout_secs: default_retrieval_timeout(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_execution_url(),
            rpc_token: String::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            longterm_dir: default_storage_dir(),
            download_dir: default_storage_dir(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            attempts_per_cycle: default_attempts_per_cycle(),
            min_piece_size: default_min_piece_size(),
            poll_interval_secs: default_poll_interval(),
            poll_max_retries: default_poll_max_retries(),
            watch_interval_secs: default_watch_interval(),
            cancel_grace_secs: default_cancel_grace(),
            cancel_sweep_timeout_secs: default_sweep_box(),
        }
    }
}

/// Validate cross-field constraints that serde defaults cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.scheduler.max_workers == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.max_workers must be at least 1".to_string(),
        ));
    }
    if config.scheduler.attempts_per_cycle == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.attempts_per_cycle must be at least 1".to_string(),
        ));
    }
    if config.marketplace.max_concurrent_retrievals_per_provider == 0 {
        return Err(ConfigError::ValidationError(
            "marketplace.max_concurrent_retrievals_per_provider must be at least 1".to_string(),
        ));
    }
    if config.marketplace.api_url.is_empty() {
        return Err(ConfigError::ValidationError(
            "marketplace.api_url must not be empty".to_string(),
        ));
    }
    Ok(())
}
