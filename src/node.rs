use crate::blockchain::Blockchain;
use crate::config::Config;
use crate::error::{ChainError, Result};
use crate::ledger::Ledger;
use crate::sync::{ChainSynchronizer, HttpPeerFetcher, Peer, SyncOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Booting,
    Syncing,
    Ready,
    /// The local chain failed validation; the node keeps serving but alarms.
    Degraded,
}

/// Install the global fmt subscriber. `RUST_LOG` directives, when set, replace `level`.
pub fn init_logging(level: tracing::Level) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| ChainError::Config(format!("failed to install logger: {}", e)))
}

fn default_filter(level: tracing::Level) -> EnvFilter {
    EnvFilter::new(level.as_str())
}

pub struct Node {
    pub config: Config,
    pub ledger: Ledger,
    pub synchronizer: Option<ChainSynchronizer>,
    pub state: Arc<RwLock<NodeState>>,
}

impl Node {
    pub fn init(config: Config) -> Result<Self> {
        config.validate()?;

        let chain = Blockchain::with_config(&config.chain, config.validation.clone())?;
        let ledger = Ledger::new(chain);
        info!(
            difficulty = config.chain.difficulty,
            peers = config.sync.peers.len(),
            "Starting VoteChain node"
        );

        let synchronizer = if config.sync.enabled && !config.sync.peers.is_empty() {
            let fetcher = HttpPeerFetcher::new(config.sync.fetch_timeout())?;
            Some(ChainSynchronizer::new(
                ledger.clone(),
                Arc::new(fetcher),
                config.sync.peers.iter().map(Peer::new),
                config.sync.fetch_timeout(),
            ))
        } else {
            if config.sync.enabled {
                warn!("Sync enabled but no peers configured; running standalone");
            }
            None
        };

        Ok(Self {
            config,
            ledger,
            synchronizer,
            state: Arc::new(RwLock::new(NodeState::Booting)),
        })
    }

    async fn set_state(&self, state: NodeState) {
        let mut s = self.state.write().await;
        if *s != state {
            info!("Node state: {:?} -> {:?}", *s, state);
            *s = state;
        }
    }

    /// Run until Ctrl-C.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                return;
            }
            info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        });

        self.run(shutdown_rx).await
    }

    /// Startup order: local check, initial sync, API, then the health loop.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.set_state(NodeState::Syncing).await;
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        if let Some(sync) = self.synchronizer.clone() {
            match sync.sync_once().await {
                Ok(report) if matches!(report.outcome, SyncOutcome::LocalCorruption(_)) => {
                    self.set_state(NodeState::Degraded).await;
                }
                Ok(report) => info!(fetched = report.fetched, failed = report.failed, "Initial sync complete"),
                Err(e) => warn!("Initial sync failed: {}", e),
            }
            tasks.push(sync.spawn(self.config.sync.interval(), shutdown.clone()));
        }

        if *self.state.read().await == NodeState::Syncing {
            self.set_state(NodeState::Ready).await;
        }

        tasks.push(self.clone().spawn_api(shutdown.clone())?);

        let mut ticker = tokio::time::interval(HEALTH_LOG_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.log_health().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        for task in tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        info!("Node stopped");
        Ok(())
    }

    async fn log_health(&self) {
        let ledger = self.ledger.clone();
        let checked = tokio::task::spawn_blocking(move || {
            (ledger.verify_local(), ledger.height(), ledger.pending_count())
        })
        .await;

        match checked {
            Ok((Ok(()), height, pending)) => {
                info!(height, pending, "Node running");
                if *self.state.read().await == NodeState::Degraded {
                    self.set_state(NodeState::Ready).await;
                }
            }
            // verify_local already logged the fault at error level
            Ok((Err(_), height, pending)) => {
                warn!(height, pending, "Node running with a corrupted local chain");
                self.set_state(NodeState::Degraded).await;
            }
            Err(e) => error!("Health check task failed: {}", e),
        }
    }

    #[cfg(feature = "api")]
    fn spawn_api(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
        let addr: std::net::SocketAddr = format!("{}:{}", self.config.node.bind_address, self.config.node.api_port)
            .parse()
            .map_err(|e| ChainError::Config(format!("invalid API bind address: {}", e)))?;

        let api_node = Arc::new(crate::api::ApiNode::new_shared(self.ledger.clone(), Some(self.state.clone())));
        Ok(tokio::spawn(async move {
            if let Err(e) = crate::api::run_api_server(api_node, addr, shutdown).await {
                error!("API server failed: {}", e);
            }
        }))
    }

    #[cfg(not(feature = "api"))]
    fn spawn_api(self: Arc<Self>, _shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
        warn!("API feature not enabled in this build; peers cannot fetch this node's chain");
        Ok(tokio::spawn(async {}))
    }
}
