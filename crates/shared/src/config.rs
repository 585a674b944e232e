//! Application configuration management.

use std::collections::HashMap;

use serde::Deserialize;
use uuid::Uuid;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Escalation scheduler configuration.
    #[serde(default)]
    pub escalation: EscalationConfig,
    /// Static approver directory.
    #[serde(default)]
    pub directory: DirectoryConfig,
    /// Log output configuration.
    #[serde(default)]
    pub log: LogConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Escalation scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EscalationConfig {
    /// Whether the periodic sweep runs at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seconds between two sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// How long workflow definitions stay cached.
    #[serde(default = "default_workflow_cache_ttl")]
    pub workflow_cache_ttl_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    300 // 5 minutes
}

fn default_workflow_cache_ttl() -> u64 {
    60
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            sweep_interval_secs: default_sweep_interval(),
            workflow_cache_ttl_secs: default_workflow_cache_ttl(),
        }
    }
}

/// Role membership used to resolve level approvers.
///
/// Maps an approver role name to the users holding it, in preference order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    /// Role name to user ids.
    #[serde(default)]
    pub roles: HashMap<String, Vec<Uuid>>,
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("QUORUM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
