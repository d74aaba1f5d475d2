use super::block::Block;
use super::validation::{validate_chain, ChainFault};
use crate::config::{ChainConfig, ValidationConfig};
use crate::error::{ChainError, Result};
use crate::mempool::Mempool;
use crate::miner::{Miner, MiningLimits, MiningTimeout};
use crate::transaction::{PayloadKind, Transaction};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Result of a mining request. Neither `NoOp` nor `Timeout` is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineOutcome {
    Mined(Block),
    /// The pending pool was empty.
    NoOp,
    /// The proof-of-work search hit its cap; chain and pool are untouched.
    Timeout { attempts: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotLonger { local: usize, candidate: usize },
    Invalid(ChainFault),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RejectReason::NotLonger { local, candidate } => {
                write!(f, "candidate length {} is not longer than local length {}", candidate, local)
            }
            RejectReason::Invalid(fault) => write!(f, "candidate is invalid: {}", fault),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced { previous_len: usize, new_len: usize },
    Rejected(RejectReason),
}

impl ReplaceOutcome {
    pub fn is_replaced(&self) -> bool {
        matches!(self, ReplaceOutcome::Replaced { .. })
    }
}

/// Diagnostic view of a full validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidityReport {
    pub valid: bool,
    pub length: usize,
    pub first_invalid_index: Option<u64>,
    pub error: Option<String>,
}

impl ValidityReport {
    pub fn from_result(length: usize, result: std::result::Result<(), ChainFault>) -> Self {
        match result {
            Ok(()) => ValidityReport {
                valid: true,
                length,
                first_invalid_index: None,
                error: None,
            },
            Err(fault) => ValidityReport {
                valid: false,
                length,
                first_invalid_index: Some(fault.index),
                error: Some(fault.error.to_string()),
            },
        }
    }
}

/// The block sequence together with its pending pool.
///
/// All mutation goes through `&mut self`; sharing across threads is done by
/// wrapping the whole value in one lock (see [`crate::ledger::Ledger`]), so a
/// mine is a single critical section from candidate construction to append.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    mempool: Mempool,
    miner: Miner,
    rules: ValidationConfig,
}

impl Blockchain {
    /// Genesis-only chain with an unbounded miner and default shape rules.
    pub fn new(difficulty: u32) -> Result<Self> {
        Self::with_miner(Miner::new(difficulty, MiningLimits::unbounded())?, ValidationConfig::default())
    }

    pub fn with_config(chain: &ChainConfig, rules: ValidationConfig) -> Result<Self> {
        Self::with_miner(Miner::new(chain.difficulty, chain.mining_limits())?, rules)
    }

    pub fn with_miner(miner: Miner, rules: ValidationConfig) -> Result<Self> {
        Ok(Blockchain {
            blocks: vec![Block::genesis()],
            mempool: Mempool::new(),
            miner,
            rules,
        })
    }

    /// Rebuild from a previously exported snapshot. The snapshot must validate;
    /// a broken one is a `Linkage` error since it never became the running chain.
    pub fn restore(blocks: Vec<Block>, miner: Miner, rules: ValidationConfig) -> Result<Self> {
        validate_chain(&blocks).map_err(ChainError::Linkage)?;
        Ok(Blockchain {
            blocks,
            mempool: Mempool::new(),
            miner,
            rules,
        })
    }

    /// Shape-check a payload and append it to the pending pool.
    pub fn enqueue(&mut self, tx: Transaction) -> Result<PayloadKind> {
        let kind = tx.validate_shape(&self.rules)?;
        self.mempool.add_transaction(tx);
        Ok(kind)
    }

    /// Build a candidate on the current tail, solve it and append it.
    pub fn mine(&mut self) -> MineOutcome {
        if self.mempool.is_empty() {
            return MineOutcome::NoOp;
        }

        let tail = self.last_block();
        let candidate = Block::new(
            tail.index + 1,
            now_millis(),
            self.mempool.get_all_transactions(),
            tail.hash,
            0,
        );

        match self.miner.search(candidate) {
            Ok(solution) => {
                let block = solution.block;
                self.blocks.push(block.clone());
                self.mempool.take_all();
                info!(
                    index = block.index,
                    transactions = block.transactions.len(),
                    attempts = solution.attempts,
                    elapsed_ms = solution.elapsed.as_millis() as u64,
                    hash = %block.hash_hex(),
                    "Mined block"
                );
                MineOutcome::Mined(block)
            }
            Err(MiningTimeout { attempts }) => {
                warn!(attempts, pending = self.mempool.len(), "Mining timed out; pending pool kept");
                MineOutcome::Timeout { attempts }
            }
        }
    }

    pub fn validate_full(&self) -> std::result::Result<(), ChainFault> {
        validate_chain(&self.blocks)
    }

    pub fn is_valid(&self) -> bool {
        self.validate_full().is_ok()
    }

    pub fn validity(&self) -> ValidityReport {
        ValidityReport::from_result(self.blocks.len(), self.validate_full())
    }

    /// Swap in `candidate` only when it is strictly longer and fully valid.
    pub fn replace(&mut self, candidate: Vec<Block>) -> ReplaceOutcome {
        let local = self.blocks.len();
        if candidate.len() <= local {
            return ReplaceOutcome::Rejected(RejectReason::NotLonger {
                local,
                candidate: candidate.len(),
            });
        }
        if let Err(fault) = validate_chain(&candidate) {
            return ReplaceOutcome::Rejected(RejectReason::Invalid(fault));
        }

        let new_len = candidate.len();
        self.blocks = candidate;
        ReplaceOutcome::Replaced {
            previous_len: local,
            new_len,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn last_block(&self) -> &Block {
        // `blocks` always holds at least the genesis block.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.mempool.len()
    }

    pub fn difficulty(&self) -> u32 {
        self.miner.difficulty()
    }

    #[cfg(test)]
    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
