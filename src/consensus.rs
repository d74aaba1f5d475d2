use crate::blockchain::{validate_chain, Block, ChainFault};
use std::cmp::Ordering;

/// A candidate chain fetched from one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub peer: String,
    pub blocks: Vec<Block>,
}

impl PeerSnapshot {
    pub fn new(peer: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            peer: peer.into(),
            blocks,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Outcome of comparing peer snapshots against the local length.
#[derive(Debug, Default)]
pub struct Selection {
    /// Longest valid snapshot strictly longer than the local chain, if any.
    pub best: Option<PeerSnapshot>,
    /// Candidates that were long enough to matter but failed validation.
    pub invalid: Vec<(String, ChainFault)>,
}

/// Longest-valid-chain selection by block count.
pub struct Consensus;

impl Consensus {
    /// Pick the longest snapshot that validates and is strictly longer than
    /// `local_len`. Equal lengths never win; among equal-length peers the
    /// lexicographically smallest peer address is tried first.
    pub fn select_canonical(snapshots: Vec<PeerSnapshot>, local_len: usize) -> Selection {
        let mut candidates: Vec<_> = snapshots
            .into_iter()
            .filter(|s| s.len() > local_len)
            .collect();

        candidates.sort_by(|a, b| match b.len().cmp(&a.len()) {
            Ordering::Equal => a.peer.cmp(&b.peer),
            ord => ord,
        });

        let mut selection = Selection::default();
        for snapshot in candidates {
            match validate_chain(&snapshot.blocks) {
                Ok(()) => {
                    selection.best = Some(snapshot);
                    break;
                }
                Err(fault) => selection.invalid.push((snapshot.peer, fault)),
            }
        }
        selection
    }
}
