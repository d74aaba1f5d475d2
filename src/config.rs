//! Configuration management for VoteChain

use crate::error::{ChainError, Result};
use crate::miner::{check_difficulty, MiningLimits};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "votechain.toml";
pub const CONFIG_ENV_VAR: &str = "VOTECHAIN_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    /// Nonce attempts per mine before giving up; 0 means no cap.
    #[serde(default)]
    pub max_mining_attempts: u64,
    /// Wall-clock seconds per mine before giving up; 0 means no cap.
    #[serde(default = "default_max_mining_secs")]
    pub max_mining_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

/// Rules for the transaction shape check.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Reject properties not named by a payload's schema.
    #[serde(default = "default_enabled")]
    pub strict_mode: bool,
    /// Reject payloads that are neither votes nor elections.
    #[serde(default)]
    pub require_known_kind: bool,
    #[serde(default = "default_max_transaction_bytes")]
    pub max_transaction_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            bind_address: default_bind_address(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            max_mining_attempts: 0,
            max_mining_secs: default_max_mining_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            peers: Vec::new(),
            interval_secs: default_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict_mode: default_enabled(),
            require_known_kind: false,
            max_transaction_bytes: default_max_transaction_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ChainConfig {
    pub fn mining_limits(&self) -> MiningLimits {
        MiningLimits {
            max_attempts: Some(self.max_mining_attempts).filter(|&n| n > 0),
            max_duration: Some(self.max_mining_secs)
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> Result<tracing::Level> {
        self.level
            .parse()
            .map_err(|_| ChainError::Config(format!("unknown logging.level '{}'", self.level)))
    }
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate critical values
    pub fn validate(&self) -> Result<()> {
        check_difficulty(self.chain.difficulty)
            .map_err(|e| ChainError::Config(format!("chain.difficulty: {}", e)))?;

        if self.sync.interval_secs == 0 {
            return Err(ChainError::Config("sync.interval_secs must be positive".to_string()));
        }
        if self.sync.fetch_timeout_secs == 0 {
            return Err(ChainError::Config("sync.fetch_timeout_secs must be positive".to_string()));
        }
        if let Some(peer) = self.sync.peers.iter().find(|p| p.trim().is_empty()) {
            return Err(ChainError::Config(format!("sync.peers contains an empty entry: {:?}", peer)));
        }
        if self.validation.max_transaction_bytes == 0 {
            return Err(ChainError::Config("validation.max_transaction_bytes must be positive".to_string()));
        }
        self.logging.max_level()?;
        Ok(())
    }
}

/// Load configuration from `path`, falling back to defaults when the file is absent.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(raw) => Config::from_toml(&raw),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(ChainError::Config(format!("cannot read {}: {}", path.display(), e))),
    }
}

fn default_api_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_difficulty() -> u32 {
    4
}

fn default_max_mining_secs() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    10
}

fn default_fetch_timeout() -> u64 {
    5
}

fn default_max_transaction_bytes() -> usize {
    crate::transaction::MAX_TRANSACTION_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.chain.difficulty, 4);
        assert_eq!(config.node.api_port, 8080);
        assert_eq!(config.sync.interval(), Duration::from_secs(10));
        assert!(config.validation.strict_mode);
        assert_eq!(config.chain.mining_limits().max_duration, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[chain]\ndifficulty = 2\nmax_mining_attempts = 1000\n\n[sync]\npeers = [\"http://127.0.0.1:9000\"]"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.chain.difficulty, 2);
        assert_eq!(config.chain.mining_limits().max_attempts, Some(1000));
        assert_eq!(config.sync.peers, vec!["http://127.0.0.1:9000".to_string()]);
        assert_eq!(config.sync.fetch_timeout_secs, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_toml("[chain]\ndifficulty = 65").is_err());
        assert!(Config::from_toml("[sync]\ninterval_secs = 0").is_err());
        assert!(Config::from_toml("[sync]\npeers = [\"\"]").is_err());
        assert!(Config::from_toml("[logging]\nlevel = \"chatty\"").is_err());
        assert!(Config::from_toml("[chain]\ndifficulty = \"four\"").is_err());
    }

    #[test]
    fn test_zero_mining_caps_mean_unbounded() {
        let config = Config::from_toml("[chain]\nmax_mining_secs = 0\nmax_mining_attempts = 0").unwrap();
        assert_eq!(config.chain.mining_limits(), MiningLimits::unbounded());

        let config = Config::from_toml("[chain]\nmax_mining_secs = 5").unwrap();
        assert_eq!(config.chain.mining_limits(), MiningLimits::duration(Duration::from_secs(5)));
        assert_eq!(Config::default().chain.mining_limits().max_attempts, None);
    }

    #[test]
    fn test_log_level_parsing() {
        let config = Config::from_toml("[logging]\nlevel = \"debug\"").unwrap();
        assert_eq!(config.logging.max_level().unwrap(), tracing::Level::DEBUG);
    }
}
