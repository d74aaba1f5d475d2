//! VoteChain - a hash-linked proof-of-work ledger for a voting platform
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Block model, chain management and structural validation
//! - [`transaction`] - Opaque payloads, canonical encoding and shape checks
//! - [`mempool`] - Pending transaction pool
//! - [`ledger`] - Thread-safe handle shared by every consumer of the chain
//!
//! ## Consensus & Mining
//! - [`miner`] - Proof-of-work search with attempt and time caps
//! - [`consensus`] - Longest-valid-chain selection
//!
//! ## Networking
//! - [`sync`] - Periodic chain synchronization with peers
//! - [`api`] - HTTP service surface (feature `api`)
//!
//! ## Node & Utilities
//! - [`node`] - Node orchestration and logging setup
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod ledger;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod consensus;
pub mod miner;

// ============================================================================
// Networking
// ============================================================================
pub mod sync;

#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Node & Utilities
// ============================================================================
pub mod config;
pub mod error;
pub mod node;
