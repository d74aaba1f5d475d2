//! Proof-of-work search for VoteChain
//!
//! A block satisfies difficulty `d` when the hexadecimal rendering of its
//! digest starts with `d` zero characters, i.e. its first `d` nibbles are
//! zero. Numerically this is `digest < 16^(64 - d)` with the digest read as a
//! big-endian 256-bit integer; [`meets_target`] implements that form and is
//! kept in agreement with [`meets_difficulty`].

use crate::blockchain::{Block, Sha256Hash};
use crate::error::{ChainError, Result};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Number of hex characters in a SHA-256 digest.
pub const MAX_DIFFICULTY: u32 = 64;

/// Attempts between wall-clock checks.
const CLOCK_CHECK_INTERVAL: u64 = 4096;

/// External caps on a single search. `None` leaves that dimension unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MiningLimits {
    pub max_attempts: Option<u64>,
    pub max_duration: Option<Duration>,
}

impl MiningLimits {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn attempts(max_attempts: u64) -> Self {
        MiningLimits {
            max_attempts: Some(max_attempts),
            max_duration: None,
        }
    }

    pub fn duration(max_duration: Duration) -> Self {
        MiningLimits {
            max_attempts: None,
            max_duration: Some(max_duration),
        }
    }
}

/// The only way a search fails: a cap was reached before a nonce qualified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Mining timed out after {attempts} attempts")]
pub struct MiningTimeout {
    pub attempts: u64,
}

impl From<MiningTimeout> for ChainError {
    fn from(timeout: MiningTimeout) -> Self {
        ChainError::MiningTimeout {
            attempts: timeout.attempts,
        }
    }
}

/// Result of a successful search.
#[derive(Debug, Clone)]
pub struct Solution {
    pub block: Block,
    pub attempts: u64,
    pub elapsed: Duration,
}

pub fn check_difficulty(difficulty: u32) -> Result<()> {
    if difficulty > MAX_DIFFICULTY {
        return Err(ChainError::InvalidDifficulty(difficulty));
    }
    Ok(())
}

pub fn leading_zero_nibbles(hash: &Sha256Hash) -> u32 {
    let mut count = 0;
    for byte in hash {
        if *byte == 0 {
            count += 2;
            continue;
        }
        if byte >> 4 == 0 {
            count += 1;
        }
        break;
    }
    count
}

/// Textual predicate: the hex digest begins with `difficulty` zeros.
pub fn meets_difficulty(hash: &Sha256Hash, difficulty: u32) -> bool {
    leading_zero_nibbles(hash) >= difficulty
}

/// `16^(64 - difficulty)` as a big-endian 256-bit value.
///
/// Returns `None` for difficulty 0, whose threshold (2^256) does not fit and
/// admits every digest.
pub fn difficulty_target(difficulty: u32) -> Option<Sha256Hash> {
    if difficulty == 0 || difficulty > MAX_DIFFICULTY {
        return None;
    }
    let bit = 4 * (MAX_DIFFICULTY - difficulty) as usize;
    let mut target = [0u8; 32];
    target[31 - bit / 8] = 1 << (bit % 8);
    Some(target)
}

/// Numeric predicate: `digest < 16^(64 - difficulty)`.
pub fn meets_target(hash: &Sha256Hash, difficulty: u32) -> bool {
    if difficulty > MAX_DIFFICULTY {
        return false;
    }
    match difficulty_target(difficulty) {
        Some(target) => hash < &target,
        None => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Miner {
    difficulty: u32,
    limits: MiningLimits,
}

impl Miner {
    pub fn new(difficulty: u32, limits: MiningLimits) -> Result<Self> {
        check_difficulty(difficulty)?;
        Ok(Miner { difficulty, limits })
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Search nonces upward from zero until the digest satisfies the
    /// difficulty, or a limit is hit.
    pub fn search(&self, mut block: Block) -> std::result::Result<Solution, MiningTimeout> {
        let started = Instant::now();
        let prefix = block.hashing_prefix();
        let mut nonce: u64 = 0;
        let mut attempts: u64 = 0;

        debug!(index = block.index, difficulty = self.difficulty, "Starting proof-of-work");

        loop {
            if self.limits.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(MiningTimeout { attempts });
            }
            if attempts % CLOCK_CHECK_INTERVAL == 0 && attempts > 0 {
                if let Some(max) = self.limits.max_duration {
                    if started.elapsed() >= max {
                        return Err(MiningTimeout { attempts });
                    }
                }
            }

            let hash = Block::finish_with_nonce(prefix.clone(), nonce);
            attempts += 1;

            if meets_difficulty(&hash, self.difficulty) {
                block.nonce = nonce;
                block.hash = hash;
                let elapsed = started.elapsed();
                debug!(
                    index = block.index,
                    nonce,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    hash = %block.hash_hex(),
                    "Proof-of-work completed"
                );
                return Ok(Solution { block, attempts, elapsed });
            }

            nonce = match nonce.checked_add(1) {
                Some(next) => next,
                None => return Err(MiningTimeout { attempts }),
            };
        }
    }
}

/// Solve `block` at `difficulty` with no limits.
pub fn mine_block(block: Block, difficulty: u32) -> Result<Block> {
    let solution = Miner::new(difficulty, MiningLimits::unbounded())?.search(block)?;
    Ok(solution.block)
}
