//! Error types for VoteChain

use crate::blockchain::ChainFault;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    /// A payload failed the shape check and never reached the pending pool.
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// An imported snapshot failed structural validation.
    #[error("Invalid chain: {0}")]
    Linkage(ChainFault),

    /// The node's own chain no longer validates. Distinct from a peer conflict.
    #[error("Local chain corrupted: {0}")]
    LocalChainCorrupted(ChainFault),

    #[error("Mining timed out after {attempts} attempts")]
    MiningTimeout { attempts: u64 },

    #[error("Invalid difficulty {0}: must be at most {max}", max = crate::miner::MAX_DIFFICULTY)]
    InvalidDifficulty(u32),

    #[error("Peer {peer} unavailable: {reason}")]
    PeerUnavailable { peer: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ChainError {
    /// Conditions that are skipped and retried rather than surfaced to an operator.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ChainError::LocalChainCorrupted(_) | ChainError::Config(_))
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::Config(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
