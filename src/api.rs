//! REST API server for a VoteChain node
//!
//! Exposes the ledger boundary to the voting service and to peers:
//! transaction submission, mining, validity reporting, the raw chain
//! snapshot used by synchronization, and explicit chain replacement.
//! Anything touching the chain lock runs on the blocking pool because a mine
//! holds that lock for the whole proof-of-work search.

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, RwLock};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use crate::blockchain::{Block, MineOutcome, ReplaceOutcome};
use crate::error::ChainError;
use crate::ledger::{Ledger, SubmitOutcome};
use crate::node::NodeState;

/// Snapshots are posted whole; allow room for long chains.
const MAX_REQUEST_BODY_SIZE: usize = 10 * 1024 * 1024; // 10 MB

/// Shared state handed to every handler
#[derive(Clone)]
pub struct ApiNode {
    pub ledger: Ledger,
    // Optional orchestrator state for health checks and logging
    pub state: Option<Arc<RwLock<NodeState>>>,
    api_stats: Arc<RwLock<ApiStats>>,
}

/// API statistics and monitoring
#[derive(Debug, Default)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    transactions_submitted: u64,
    transactions_rejected: u64,
    blocks_mined: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

impl ApiNode {
    pub fn new(ledger: Ledger) -> Self {
        Self::new_shared(ledger, None)
    }

    pub fn new_shared(ledger: Ledger, state: Option<Arc<RwLock<NodeState>>>) -> Self {
        Self {
            ledger,
            state,
            api_stats: Arc::new(RwLock::new(ApiStats::new())),
        }
    }

    /// Run `f` against the ledger on the blocking pool.
    async fn with_ledger<R, F>(&self, f: F) -> Result<R, ApiError>
    where
        F: FnOnce(&Ledger) -> R + Send + 'static,
        R: Send + 'static,
    {
        let ledger = self.ledger.clone();
        tokio::task::spawn_blocking(move || f(&ledger))
            .await
            .map_err(|e| ApiError::InternalError(format!("ledger task failed: {}", e)))
    }

    pub async fn get_stats(&self) -> ApiStatsResponse {
        let stats = self.api_stats.read().await;
        ApiStatsResponse {
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            transactions_submitted: stats.transactions_submitted,
            transactions_rejected: stats.transactions_rejected,
            blocks_mined: stats.blocks_mined,
            uptime_seconds: stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0),
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BlockchainError(ChainError),
    ShapeRejected(String),
    MiningTimeout { attempts: u64 },
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BlockchainError(e) => (StatusCode::BAD_REQUEST, json!({ "error": e.to_string() })),
            ApiError::ShapeRejected(reason) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "status": "rejected", "error": reason }),
            ),
            ApiError::MiningTimeout { attempts } => (
                StatusCode::GATEWAY_TIMEOUT,
                json!({ "error": "mining_timeout", "attempts": attempts }),
            ),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
        };

        (status, Json(body)).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::InvalidTransaction(reason) => ApiError::ShapeRejected(reason),
            ChainError::MiningTimeout { attempts } => ApiError::MiningTimeout { attempts },
            other => ApiError::BlockchainError(other),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub transactions_submitted: u64,
    pub transactions_rejected: u64,
    pub blocks_mined: u64,
    pub uptime_seconds: u64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    node_state: Option<String>,
    height: usize,
    pending: usize,
    difficulty: u32,
    timestamp: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Request statistics middleware
async fn stats_middleware(State(node): State<Arc<ApiNode>>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    node.api_stats.write().await.record_request(success);

    response
}

/// Logs method, path, status, duration and current `NodeState` (when available).
async fn logging_middleware(State(node): State<Arc<ApiNode>>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let node_state = match &node.state {
        Some(s) => format!("{:?}", *s.read().await),
        None => "unknown".to_string(),
    };

    info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        node_state = %node_state,
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the router with all endpoints
pub fn build_api_router(node: Arc<ApiNode>) -> Router {
    // CORS configuration - reflect the caller's origin
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    let api_routes = Router::new()
        // Ledger endpoints
        .route("/transactions", post(submit_transaction))
        .route("/mine", post(mine))
        .route("/chain/validity", get(get_validity))
        .route("/chain/replace", post(replace_chain))
        // System endpoints
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats));

    Router::new()
        // Peer snapshot endpoint, polled by other nodes' synchronizers
        .route("/chain", get(get_chain))
        .nest("/api", api_routes)
        // logging before stats so we always record timing and node-state
        .layer(middleware::from_fn_with_state(node.clone(), logging_middleware))
        .layer(middleware::from_fn_with_state(node.clone(), stats_middleware))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_SIZE))
        .with_state(node)
        .layer(cors)
}

/// Serve the API on `addr` until `shutdown` flips to `true`.
pub async fn run_api_server(
    node: Arc<ApiNode>,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> crate::error::Result<()> {
    let app = build_api_router(node);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("API server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow_and_update() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(node): State<Arc<ApiNode>>) -> Result<Response, ApiError> {
    let (height, pending, difficulty) = node
        .with_ledger(|ledger| (ledger.height(), ledger.pending_count(), ledger.difficulty()))
        .await?;

    let node_state = match &node.state {
        Some(s) => Some(s.read().await.clone()),
        None => None,
    };
    // No orchestrator state available, assume healthy
    let healthy = node_state.as_ref().map_or(true, |s| *s == NodeState::Ready);

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        node_state: node_state.map(|s| format!("{:?}", s)),
        height,
        pending,
        difficulty,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    Ok((status, Json(body)).into_response())
}

async fn get_chain(State(node): State<Arc<ApiNode>>) -> Result<Json<Vec<Block>>, ApiError> {
    Ok(Json(node.with_ledger(|ledger| ledger.get_chain()).await?))
}

async fn get_validity(State(node): State<Arc<ApiNode>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(node.with_ledger(|ledger| ledger.validity_report()).await?))
}

async fn submit_transaction(
    State(node): State<Arc<ApiNode>>,
    Json(payload): Json<Value>,
) -> Result<Response, ApiError> {
    let outcome = node.with_ledger(move |ledger| ledger.submit_transaction(payload)).await?;

    let mut stats = node.api_stats.write().await;
    match outcome {
        SubmitOutcome::Enqueued { kind, pending } => {
            stats.transactions_submitted += 1;
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({ "status": "enqueued", "kind": kind.to_string(), "pending": pending })),
            )
                .into_response())
        }
        SubmitOutcome::ShapeRejected(reason) => {
            stats.transactions_rejected += 1;
            Err(ApiError::ShapeRejected(reason))
        }
    }
}

async fn mine(State(node): State<Arc<ApiNode>>) -> Result<Response, ApiError> {
    match node.with_ledger(|ledger| ledger.trigger_mine()).await? {
        MineOutcome::Mined(block) => {
            node.api_stats.write().await.blocks_mined += 1;
            Ok((StatusCode::CREATED, Json(block)).into_response())
        }
        MineOutcome::NoOp => Ok((
            StatusCode::OK,
            Json(json!({ "status": "noop", "message": "No pending transactions to mine" })),
        )
            .into_response()),
        MineOutcome::Timeout { attempts } => Err(ApiError::MiningTimeout { attempts }),
    }
}

async fn replace_chain(
    State(node): State<Arc<ApiNode>>,
    Json(candidate): Json<Vec<Block>>,
) -> Result<Response, ApiError> {
    match node.with_ledger(move |ledger| ledger.replace_if_longer(candidate)).await? {
        ReplaceOutcome::Replaced { previous_len, new_len } => Ok((
            StatusCode::OK,
            Json(json!({ "status": "replaced", "previous_len": previous_len, "new_len": new_len })),
        )
            .into_response()),
        ReplaceOutcome::Rejected(reason) => Ok((
            StatusCode::CONFLICT,
            Json(json!({ "status": "rejected", "reason": reason.to_string() })),
        )
            .into_response()),
    }
}

async fn get_api_stats(State(node): State<Arc<ApiNode>>) -> impl IntoResponse {
    Json(node.get_stats().await)
}
