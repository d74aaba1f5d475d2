//! Chain synchronization for VoteChain
//!
//! On a fixed cadence the synchronizer:
//! - checks the node's own chain before trusting it as a baseline
//! - fetches every peer's snapshot concurrently, each under a timeout
//! - hands the snapshots to [`Consensus`] and adopts the longest valid one
//!   when it is strictly longer than the local chain
//!
//! A failing peer is logged and skipped; it never aborts a cycle.

use crate::blockchain::{Block, ChainFault, RejectReason, ReplaceOutcome};
use crate::consensus::{Consensus, PeerSnapshot};
use crate::error::{ChainError, Result};
use crate::ledger::Ledger;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Consecutive failures after which a peer is reported as unreliable.
pub const UNRELIABLE_AFTER: u32 = 3;

/// Base URL of another node, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Peer {
    url: String,
}

impl Peer {
    pub fn new(url: impl AsRef<str>) -> Self {
        Self {
            url: url.as_ref().trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn chain_endpoint(&self) -> String {
        format!("{}/chain", self.url)
    }
}

/// Transport used to pull a peer's full chain snapshot.
#[async_trait]
pub trait PeerFetcher: Send + Sync {
    async fn fetch_chain(&self, peer: &Peer) -> Result<Vec<Block>>;
}

/// `GET {peer}/chain` over HTTP, decoding the JSON block array.
#[derive(Debug, Clone)]
pub struct HttpPeerFetcher {
    client: reqwest::Client,
}

impl HttpPeerFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PeerFetcher for HttpPeerFetcher {
    async fn fetch_chain(&self, peer: &Peer) -> Result<Vec<Block>> {
        let unavailable = |reason: String| ChainError::PeerUnavailable {
            peer: peer.url().to_string(),
            reason,
        };

        let response = self
            .client
            .get(peer.chain_endpoint())
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {}", status)));
        }

        response
            .json::<Vec<Block>>()
            .await
            .map_err(|e| unavailable(format!("malformed snapshot: {}", e)))
    }
}

/// Peer sync information
#[derive(Debug, Clone)]
pub struct PeerSyncInfo {
    pub peer: Peer,
    /// Length of the last snapshot received.
    pub last_length: Option<usize>,
    pub last_seen: Option<Instant>,
    pub successes: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl PeerSyncInfo {
    pub fn new(peer: Peer) -> Self {
        Self {
            peer,
            last_length: None,
            last_seen: None,
            successes: 0,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    /// Unreliable peers are still polled; the flag is informational.
    pub fn is_unreliable(&self) -> bool {
        self.consecutive_failures >= UNRELIABLE_AFTER
    }

    fn record_success(&mut self, length: usize) {
        self.last_length = Some(length);
        self.last_seen = Some(Instant::now());
        self.successes += 1;
        self.consecutive_failures = 0;
        self.last_error = None;
    }

    fn record_failure(&mut self, reason: String) {
        self.consecutive_failures += 1;
        self.last_error = Some(reason);
    }
}

/// Sync statistics
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub cycles: u64,
    pub replacements: u64,
    pub fetch_failures: u64,
    pub invalid_snapshots: u64,
    pub last_cycle: Option<Instant>,
    pub last_cycle_duration: Duration,
}

/// Sync state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    Synced,
    /// The last cycle reached no peer, or found the local chain corrupted.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Replaced { old_len: usize, new_len: usize, peer: String },
    UpToDate,
    Rejected(RejectReason),
    /// The local chain failed validation; nothing was fetched or adopted.
    LocalCorruption(ChainFault),
}

/// Summary of one synchronization cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: usize,
    pub failed: usize,
    pub invalid: usize,
    pub outcome: SyncOutcome,
}

/// Chain synchronizer
#[derive(Clone)]
pub struct ChainSynchronizer {
    ledger: Ledger,
    fetcher: Arc<dyn PeerFetcher>,
    fetch_timeout: Duration,
    peers: Arc<RwLock<HashMap<Peer, PeerSyncInfo>>>,
    sync_state: Arc<RwLock<SyncState>>,
    stats: Arc<RwLock<SyncStats>>,
}

impl ChainSynchronizer {
    pub fn new(
        ledger: Ledger,
        fetcher: Arc<dyn PeerFetcher>,
        peers: impl IntoIterator<Item = Peer>,
        fetch_timeout: Duration,
    ) -> Self {
        let peers = peers
            .into_iter()
            .map(|peer| (peer.clone(), PeerSyncInfo::new(peer)))
            .collect();
        Self {
            ledger,
            fetcher,
            fetch_timeout,
            peers: Arc::new(RwLock::new(peers)),
            sync_state: Arc::new(RwLock::new(SyncState::Idle)),
            stats: Arc::new(RwLock::new(SyncStats::default())),
        }
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn get_peer_info(&self, peer: &Peer) -> Option<PeerSyncInfo> {
        self.peers.read().await.get(peer).cloned()
    }

    pub async fn get_sync_state(&self) -> SyncState {
        *self.sync_state.read().await
    }

    pub async fn get_stats(&self) -> SyncStats {
        self.stats.read().await.clone()
    }

    async fn set_sync_state(&self, state: SyncState) {
        *self.sync_state.write().await = state;
    }

    /// Run one full cycle: local check, concurrent fetch, selection, replace.
    pub async fn sync_once(&self) -> Result<SyncReport> {
        let started = Instant::now();
        self.set_sync_state(SyncState::Syncing).await;

        // The chain lock may be held by a running mine; keep it off the async workers.
        let ledger = self.ledger.clone();
        let local = tokio::task::spawn_blocking(move || ledger.verify_local().map(|_| ledger.height())).await?;

        let report = match local {
            Ok(local_len) => self.reconcile(local_len).await?,
            Err(ChainError::LocalChainCorrupted(fault)) => {
                error!(index = fault.index, "Skipping sync: local chain failed validation ({})", fault);
                SyncReport {
                    fetched: 0,
                    failed: 0,
                    invalid: 0,
                    outcome: SyncOutcome::LocalCorruption(fault),
                }
            }
            Err(e) => return Err(e),
        };

        let state = match report.outcome {
            SyncOutcome::LocalCorruption(_) => SyncState::Failed,
            _ if report.fetched == 0 && report.failed > 0 => SyncState::Failed,
            _ => SyncState::Synced,
        };
        self.set_sync_state(state).await;

        let mut stats = self.stats.write().await;
        stats.cycles += 1;
        stats.fetch_failures += report.failed as u64;
        stats.invalid_snapshots += report.invalid as u64;
        if matches!(report.outcome, SyncOutcome::Replaced { .. }) {
            stats.replacements += 1;
        }
        stats.last_cycle = Some(Instant::now());
        stats.last_cycle_duration = started.elapsed();

        Ok(report)
    }

    async fn reconcile(&self, local_len: usize) -> Result<SyncReport> {
        let (snapshots, failed) = self.fetch_all().await;
        let fetched = snapshots.len();

        let selection = tokio::task::spawn_blocking(move || Consensus::select_canonical(snapshots, local_len)).await?;
        for (peer, fault) in &selection.invalid {
            warn!(peer = %peer, "Discarding invalid snapshot: {}", fault);
        }
        let invalid = selection.invalid.len();

        let outcome = match selection.best {
            Some(best) => {
                let peer = best.peer;
                let ledger = self.ledger.clone();
                match tokio::task::spawn_blocking(move || ledger.replace_if_longer(best.blocks)).await? {
                    ReplaceOutcome::Replaced { previous_len, new_len } => SyncOutcome::Replaced {
                        old_len: previous_len,
                        new_len,
                        peer,
                    },
                    // The local chain grew while the snapshot was being checked.
                    ReplaceOutcome::Rejected(reason) => SyncOutcome::Rejected(reason),
                }
            }
            None => match selection.invalid.first() {
                Some((_, fault)) => SyncOutcome::Rejected(RejectReason::Invalid(*fault)),
                None => SyncOutcome::UpToDate,
            },
        };

        Ok(SyncReport {
            fetched,
            failed,
            invalid,
            outcome,
        })
    }

    /// Fetch every known peer concurrently. Returns the snapshots and the failure count.
    async fn fetch_all(&self) -> (Vec<PeerSnapshot>, usize) {
        let peers: Vec<Peer> = self.peers.read().await.keys().cloned().collect();

        let mut tasks = JoinSet::new();
        for peer in peers {
            let fetcher = Arc::clone(&self.fetcher);
            let limit = self.fetch_timeout;
            tasks.spawn(async move {
                let result = match tokio::time::timeout(limit, fetcher.fetch_chain(&peer)).await {
                    Ok(result) => result,
                    Err(_) => Err(ChainError::PeerUnavailable {
                        peer: peer.url().to_string(),
                        reason: format!("timed out after {:?}", limit),
                    }),
                };
                (peer, result)
            });
        }

        let mut snapshots = Vec::new();
        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            let (peer, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Peer fetch task failed: {}", e);
                    failed += 1;
                    continue;
                }
            };

            let mut peers = self.peers.write().await;
            let info = peers
                .entry(peer.clone())
                .or_insert_with(|| PeerSyncInfo::new(peer.clone()));
            match result {
                Ok(blocks) => {
                    debug!(peer = %peer.url(), length = blocks.len(), "Fetched peer snapshot");
                    info.record_success(blocks.len());
                    snapshots.push(PeerSnapshot::new(peer.url(), blocks));
                }
                Err(e) => {
                    warn!(peer = %peer.url(), "Fetch failed: {}", e);
                    info.record_failure(e.to_string());
                    if info.consecutive_failures == UNRELIABLE_AFTER {
                        warn!(peer = %peer.url(), "Peer marked as unreliable");
                    }
                    failed += 1;
                }
            }
        }
        (snapshots, failed)
    }

    /// Drive cycles on `interval` until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// The first cycle runs one full interval after start; the caller owns the startup sync.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let peers = self.peer_count().await;
        info!(peers, ?interval, "Chain synchronizer started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sync_once().await {
                        Ok(report) => match &report.outcome {
                            SyncOutcome::Replaced { old_len, new_len, peer } => {
                                info!(old_len, new_len, peer = %peer, "Blockchain synchronized with the network");
                            }
                            SyncOutcome::UpToDate => {
                                debug!(fetched = report.fetched, failed = report.failed, "No longer valid chain; up to date");
                            }
                            SyncOutcome::Rejected(reason) => {
                                info!(fetched = report.fetched, "No candidate adopted: {}", reason);
                            }
                            SyncOutcome::LocalCorruption(_) => {}
                        },
                        Err(e) if e.is_recoverable() => warn!("Sync cycle failed, retrying next tick: {}", e),
                        Err(e) => error!("Sync cycle failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Chain synchronizer stopped");
    }

    pub fn spawn(self, interval: Duration, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(interval, shutdown))
    }
}
