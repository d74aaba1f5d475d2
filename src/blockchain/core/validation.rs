//! Structural integrity checks over blocks and chains.
//!
//! Pure functions only: nothing here mutates or repairs a chain.

use super::block::{Block, GENESIS_PREVIOUS_HASH};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkageError {
    /// Stored digest differs from the recomputed one.
    HashMismatch,
    /// `previous_hash` does not reference the predecessor's digest.
    LinkMismatch,
    /// Index does not follow the predecessor's index by exactly one.
    IndexMismatch,
    /// A chain must contain at least the genesis block.
    MissingGenesis,
}

impl fmt::Display for LinkageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkageError::HashMismatch => write!(f, "hash mismatch"),
            LinkageError::LinkMismatch => write!(f, "previous hash mismatch"),
            LinkageError::IndexMismatch => write!(f, "index mismatch"),
            LinkageError::MissingGenesis => write!(f, "missing genesis block"),
        }
    }
}

/// First failure found while scanning a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainFault {
    /// Position in the chain of the offending block.
    pub index: u64,
    pub error: LinkageError,
}

impl fmt::Display for ChainFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at block {}", self.error, self.index)
    }
}

/// The genesis block is accepted as long as it sits at index 0 and
/// references the all-zero sentinel.
pub fn validate_genesis(block: &Block) -> Result<(), LinkageError> {
    if block.previous_hash != GENESIS_PREVIOUS_HASH {
        return Err(LinkageError::LinkMismatch);
    }
    if block.index != 0 {
        return Err(LinkageError::IndexMismatch);
    }
    Ok(())
}

/// Checks, in order: previous-hash linkage, index continuity, digest integrity.
pub fn validate_block(block: &Block, previous: &Block) -> Result<(), LinkageError> {
    if block.previous_hash != previous.hash {
        return Err(LinkageError::LinkMismatch);
    }
    if previous.index.checked_add(1) != Some(block.index) {
        return Err(LinkageError::IndexMismatch);
    }
    if !block.has_valid_hash() {
        return Err(LinkageError::HashMismatch);
    }
    Ok(())
}

/// Short-circuits on the first failing block and reports its position.
pub fn validate_chain(blocks: &[Block]) -> Result<(), ChainFault> {
    let genesis = blocks.first().ok_or(ChainFault {
        index: 0,
        error: LinkageError::MissingGenesis,
    })?;
    validate_genesis(genesis).map_err(|error| ChainFault { index: 0, error })?;

    for (position, pair) in blocks.windows(2).enumerate() {
        validate_block(&pair[1], &pair[0]).map_err(|error| ChainFault {
            index: position as u64 + 1,
            error,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;
    use serde_json::json;

    fn build_chain(len: usize) -> Vec<Block> {
        let mut blocks = vec![Block::genesis()];
        for i in 1..len {
            let prev = blocks.last().unwrap();
            let tx = Transaction::new(json!({"seq": i}));
            blocks.push(Block::new(prev.index + 1, prev.timestamp + 1, vec![tx], prev.hash, 0));
        }
        blocks
    }

    #[test]
    fn test_valid_chain_passes() {
        assert_eq!(validate_chain(&build_chain(5)), Ok(()));
        assert_eq!(validate_chain(&build_chain(1)), Ok(()));
    }

    #[test]
    fn test_empty_chain_rejected() {
        let fault = validate_chain(&[]).unwrap_err();
        assert_eq!(fault.error, LinkageError::MissingGenesis);
    }

    #[test]
    fn test_genesis_sentinel_required() {
        let mut chain = build_chain(2);
        chain[0].previous_hash = [1u8; 32];
        assert_eq!(
            validate_chain(&chain),
            Err(ChainFault { index: 0, error: LinkageError::LinkMismatch })
        );
    }

    #[test]
    fn test_tampered_payload_is_hash_mismatch() {
        let mut chain = build_chain(4);
        chain[2].transactions = vec![Transaction::new(json!({"seq": "forged"}))];
        assert_eq!(
            validate_chain(&chain),
            Err(ChainFault { index: 2, error: LinkageError::HashMismatch })
        );
    }

    #[test]
    fn test_broken_link_reported_before_hash() {
        let mut chain = build_chain(5);
        // Both link and digest are now wrong; linkage is checked first.
        chain[3].previous_hash = [9u8; 32];
        assert_eq!(
            validate_chain(&chain),
            Err(ChainFault { index: 3, error: LinkageError::LinkMismatch })
        );
    }

    #[test]
    fn test_index_gap_detected() {
        let chain = build_chain(2);
        let prev = &chain[1];
        let skipped = Block::new(prev.index + 2, prev.timestamp + 1, vec![], prev.hash, 0);
        assert_eq!(validate_block(&skipped, prev), Err(LinkageError::IndexMismatch));
    }

    #[test]
    fn test_first_failure_wins() {
        let mut chain = build_chain(6);
        chain[2].nonce += 1;
        chain[4].nonce += 1;
        assert_eq!(validate_chain(&chain).unwrap_err().index, 2);
    }
}
