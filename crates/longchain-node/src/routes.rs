use crate::peers::PeerSet;
use crate::transport::HttpTransport;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use longchain_core::{
    CancelToken, ChainSnapshot, ConsensusResolver, LedgerError, LedgerHandle, Resolution,
    TransactionError, TransactionRequest,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerHandle,
    pub peers: PeerSet,
    pub resolver: Arc<ConsensusResolver<HttpTransport>>,
    /// Upper bound on one `/mine` request; `None` lets the search run.
    pub mine_timeout: Option<Duration>,
}

pub type ApiResult = Result<(StatusCode, Json<Value>), ApiError>;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match err {
            LedgerError::EmptyPool => StatusCode::BAD_REQUEST,
            LedgerError::Stale { .. } => StatusCode::CONFLICT,
            LedgerError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::DifficultyTooHigh { .. }
            | LedgerError::InvalidReward
            | LedgerError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match err {
            LedgerError::EmptyPool => json!({
                "error": err.to_string(),
                "tip": "submit transactions via POST /transactions/new first",
            }),
            _ => json!({ "error": err.to_string() }),
        };
        Self::new(status, body)
    }
}

impl From<TransactionError> for ApiError {
    fn from(err: TransactionError) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            json!({
                "error": err.to_string(),
                "required": ["sender", "recipient", "amount"],
            }),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .route("/chain", get(chain))
        .route("/chain/length", get(chain_length))
        .route("/transactions/new", post(new_transaction))
        .route("/transactions/pending", get(pending))
        .route("/mine", post(mine))
        .route("/validate", get(validate))
        .route("/balance/{address}", get(balance))
        .route("/nodes/register", post(register_nodes))
        .route("/nodes/list", get(list_nodes))
        .route("/nodes/status", get(node_status))
        .route("/nodes/resolve", get(resolve))
        .route("/nodes/{address}", delete(remove_node))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

const ROUTES: &[(&str, &str)] = &[
    ("GET /", "this route list"),
    ("GET /health", "liveness check"),
    ("GET /chain", "full chain snapshot"),
    ("GET /chain/length", "chain length"),
    ("POST /transactions/new", "queue a transfer {sender, recipient, amount}"),
    ("GET /transactions/pending", "pending pool"),
    ("POST /mine", "seal the pending pool {miner}"),
    ("GET /validate", "validate the local chain"),
    ("GET /balance/{address}", "balance of an address"),
    ("POST /nodes/register", "register peers {nodes}"),
    ("GET /nodes/list", "registered peers"),
    ("GET /nodes/status", "probe every peer"),
    ("GET /nodes/resolve", "adopt the longest valid peer chain"),
    ("DELETE /nodes/{address}", "forget a peer"),
];

pub async fn index(State(state): State<AppState>) -> Json<Value> {
    let routes: serde_json::Map<String, Value> = ROUTES
        .iter()
        .map(|(route, about)| (route.to_string(), json!(about)))
        .collect();
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "difficulty": state.ledger.difficulty(),
        "routes": routes,
    }))
}

pub async fn chain(State(state): State<AppState>) -> Json<ChainSnapshot> {
    Json(state.ledger.snapshot())
}

pub async fn chain_length(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "length": state.ledger.len() }))
}

pub async fn pending(State(state): State<AppState>) -> Json<Value> {
    let pending = state.ledger.pending();
    Json(json!({ "count": pending.len(), "transactions": pending }))
}

pub async fn new_transaction(
    State(state): State<AppState>,
    Json(req): Json<TransactionRequest>,
) -> ApiResult {
    let (sender, recipient, amount) = req.validate()?;
    let index = state.ledger.add_transaction(&sender, &recipient, amount);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "transaction queued",
            "transaction": { "sender": sender, "recipient": recipient, "amount": amount },
            "block_index": index,
        })),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct MineRequest {
    pub miner: Option<String>,
}

pub async fn mine(State(state): State<AppState>, Json(req): Json<MineRequest>) -> ApiResult {
    let Some(miner) = req.miner.filter(|m| !m.is_empty()) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            json!({ "error": "missing miner address", "required": ["miner"] }),
        ));
    };

    let cancel = CancelToken::new();
    let search = state.ledger.mine(&miner, cancel.clone());
    let block = match state.mine_timeout {
        Some(limit) => match tokio::time::timeout(limit, search).await {
            Ok(result) => result?,
            Err(_) => {
                cancel.cancel();
                warn!(miner = %miner, "mining abandoned after {limit:?}");
                return Err(ApiError::new(
                    StatusCode::GATEWAY_TIMEOUT,
                    json!({ "error": format!("mining did not finish within {limit:?}") }),
                ));
            }
        },
        None => search.await?,
    };

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "new block mined",
            "block": block.serialize(),
            "reward": state.ledger.mining_reward(),
        })),
    ))
}

pub async fn validate(State(state): State<AppState>) -> Json<Value> {
    let length = state.ledger.len();
    match state.ledger.validate() {
        Ok(()) => Json(json!({ "valid": true, "message": "chain is valid", "length": length })),
        Err(err) => Json(json!({
            "valid": false,
            "message": "chain is invalid",
            "length": length,
            "error": err.to_string(),
            "block": err.block_index(),
        })),
    }
}

pub async fn balance(State(state): State<AppState>, Path(address): Path<String>) -> Json<Value> {
    let balance = state.ledger.balance_of(&address);
    Json(json!({ "address": address, "balance": balance }))
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub nodes: Option<Vec<String>>,
}

pub async fn register_nodes(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult {
    let Some(nodes) = req.nodes else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            json!({ "error": "missing node list", "format": { "nodes": ["http://host:port"] } }),
        ));
    };
    for node in &nodes {
        state.peers.register(node);
    }
    let total = state.peers.list();
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "peers registered",
            "count": total.len(),
            "total_nodes": total,
        })),
    ))
}

pub async fn list_nodes(State(state): State<AppState>) -> Json<Value> {
    let nodes = state.peers.list();
    Json(json!({ "count": nodes.len(), "nodes": nodes }))
}

pub async fn remove_node(State(state): State<AppState>, Path(address): Path<String>) -> ApiResult {
    if state.peers.remove(&address) {
        Ok((StatusCode::OK, Json(json!({ "removed": address }))))
    } else {
        Err(ApiError::new(
            StatusCode::NOT_FOUND,
            json!({ "error": format!("unknown peer {address}") }),
        ))
    }
}

pub async fn node_status(State(state): State<AppState>) -> Json<Value> {
    let statuses = state.resolver.probe(&state.peers.list()).await;
    let active = statuses.iter().filter(|s| s.active).count();
    Json(json!({
        "total_nodes": statuses.len(),
        "active_nodes": active,
        "inactive_nodes": statuses.len() - active,
        "nodes": statuses,
    }))
}

pub async fn resolve(State(state): State<AppState>) -> Json<Value> {
    let resolution = state
        .resolver
        .resolve(&state.ledger, &state.peers.list())
        .await;
    let message = match &resolution {
        Resolution::Replaced { peer, length } => {
            format!("chain replaced by {length}-block chain from {peer}")
        }
        Resolution::Unchanged => "local chain is authoritative".to_string(),
    };
    Json(json!({
        "message": message,
        "replaced": resolution.is_replaced(),
        "chain": state.ledger.snapshot(),
    }))
}
