//! Shared handle over the chain used by the API, the synchronizer and binaries
//!
//! One `RwLock` guards the whole [`Blockchain`]. Mutating operations hold the
//! write guard for their entire critical section; readers copy a snapshot out
//! under the read guard, so nobody observes a half-applied mine or replace.

use crate::blockchain::{Block, Blockchain, MineOutcome, ReplaceOutcome, ValidityReport};
use crate::error::{ChainError, Result};
use crate::transaction::{PayloadKind, Transaction};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Enqueued { kind: PayloadKind, pending: usize },
    ShapeRejected(String),
}

#[derive(Debug, Clone)]
pub struct Ledger {
    inner: Arc<RwLock<Blockchain>>,
}

impl Ledger {
    pub fn new(chain: Blockchain) -> Self {
        Ledger {
            inner: Arc::new(RwLock::new(chain)),
        }
    }

    pub fn submit_transaction(&self, payload: Value) -> SubmitOutcome {
        let mut chain = self.inner.write();
        match chain.enqueue(Transaction::new(payload)) {
            Ok(kind) => SubmitOutcome::Enqueued {
                kind,
                pending: chain.pending_count(),
            },
            Err(ChainError::InvalidTransaction(reason)) => {
                warn!("Rejected transaction: {}", reason);
                SubmitOutcome::ShapeRejected(reason)
            }
            Err(e) => SubmitOutcome::ShapeRejected(e.to_string()),
        }
    }

    /// Blocks the calling thread for the whole proof-of-work search.
    pub fn trigger_mine(&self) -> MineOutcome {
        self.inner.write().mine()
    }

    pub fn get_chain(&self) -> Vec<Block> {
        self.inner.read().blocks().to_vec()
    }

    pub fn get_validity(&self) -> bool {
        self.inner.read().is_valid()
    }

    pub fn validity_report(&self) -> ValidityReport {
        self.inner.read().validity()
    }

    /// Length comparison and validation happen under the same write guard as the swap.
    pub fn replace_if_longer(&self, candidate: Vec<Block>) -> ReplaceOutcome {
        let outcome = self.inner.write().replace(candidate);
        match &outcome {
            ReplaceOutcome::Replaced { previous_len, new_len } => {
                info!(previous_len, new_len, "Replaced local chain with longer valid candidate");
            }
            ReplaceOutcome::Rejected(reason) => {
                warn!("Replacement rejected: {}", reason);
            }
        }
        outcome
    }

    /// Validate the node's own chain. A failure here is corruption, not a peer conflict.
    pub fn verify_local(&self) -> Result<()> {
        self.inner.read().validate_full().map_err(|fault| {
            error!(index = fault.index, "LOCAL CHAIN CORRUPTED: {}", fault);
            ChainError::LocalChainCorrupted(fault)
        })
    }

    pub fn height(&self) -> usize {
        self.inner.read().len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.read().pending_count()
    }

    pub fn difficulty(&self) -> u32 {
        self.inner.read().difficulty()
    }

    #[cfg(test)]
    pub(crate) fn with_chain_mut<R>(&self, f: impl FnOnce(&mut Blockchain) -> R) -> R {
        f(&mut *self.inner.write())
    }
}
