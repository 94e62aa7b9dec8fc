//! HTTP facade over the ledger engine.
//!
//! Every route is a `GET` taking query-string parameters and answering with
//! `{"value": ...}` or `{"transactions": ...}`. The facade parses strings into
//! typed values, calls [`LedgerService`], and formats the result; it holds no
//! ledger logic of its own. Read routes call the engine inline and wait at
//! most for one confirmation commit; routes that write to the pool go
//! through `spawn_blocking`.

use axum::{
    extract::{Query, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::amount::Amount;
use crate::crypto::{address_from_hex, address_to_hex, hash_from_hex, hash_to_hex, Sha256Hash};
use crate::error::ChainError;
use crate::node::LedgerService;
use crate::transaction::TransactionType;

/// Rendering of transaction times.
pub const TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

pub type SharedLedger = Arc<dyn LedgerService>;

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub struct ApiError(pub ChainError);

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            ChainError::ValidationError(_)
            | ChainError::ParseError(_)
            | ChainError::InvalidSignature(_)
            | ChainError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
            ChainError::NotFound(_) => StatusCode::NOT_FOUND,
            ChainError::DuplicateTransaction(_) | ChainError::DuplicateConfirmation(_) => {
                StatusCode::CONFLICT
            }
            ChainError::MempoolFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChainError::KeyLoadError(_) | ChainError::StorageError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.0.to_string(),
            status: self.0.status().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError(err)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ValueResponse {
    pub value: String,
}

/// Hashes joined by newlines, oldest first.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub transactions: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OverviewItem {
    pub hash: String,
    pub pending: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OverviewResponse {
    pub address: String,
    pub transactions: Vec<OverviewItem>,
}

#[derive(Deserialize)]
struct AddressQuery {
    #[serde(default)]
    address: String,
}

#[derive(Deserialize)]
struct HashQuery {
    #[serde(default, rename = "transactionHash")]
    transaction_hash: String,
}

#[derive(Deserialize)]
struct CreateQuery {
    #[serde(default)]
    sender: String,
    #[serde(default)]
    recipient: String,
    #[serde(default = "default_amount")]
    amount: String,
    #[serde(default = "default_amount")]
    fee: String,
    #[serde(default, rename = "type")]
    tx_type: String,
}

#[derive(Deserialize)]
struct SendQuery {
    #[serde(default)]
    data: String,
}

fn default_amount() -> String {
    "0".to_string()
}

// ============================================================================
// Utility Functions
// ============================================================================

fn join_hashes(hashes: &[Sha256Hash]) -> String {
    hashes.iter().map(hash_to_hex).collect::<Vec<_>>().join("\n")
}

fn value(value: impl ToString) -> Json<ValueResponse> {
    Json(ValueResponse {
        value: value.to_string(),
    })
}

/// Runs an engine call that takes the pool write lock on the blocking pool.
/// A confirmation holds the chain write lock across a synchronous SQLite
/// commit, and waiting on it must not park an async worker.
async fn run_blocking<T, F>(ledger: SharedLedger, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn LedgerService) -> Result<T, ChainError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(ledger.as_ref()))
        .await
        .map_err(|e| ApiError(ChainError::StorageError(format!("Engine task failed: {}", e))))?
        .map_err(ApiError)
}

/// Formats unix seconds as UTC `dd.mm.yyyy HH:MM:SS`.
pub fn format_time(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| chrono::DateTime::from_timestamp(s, 0))
        .map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| secs.to_string())
}

// ============================================================================
// Middleware
// ============================================================================

/// Logs method, path, status and duration of every request.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

pub fn build_api_router(ledger: SharedLedger) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![http::Method::GET, http::Method::OPTIONS])
        .allow_headers(vec![http::header::CONTENT_TYPE]);

    Router::new()
        .route("/getBalance", get(get_balance))
        .route("/getPendingBalance", get(get_pending_balance))
        .route("/getTransactions", get(get_transactions))
        .route("/getPendingTransactions", get(get_pending_transactions))
        .route(
            "/getPendingTransactionsForAddress",
            get(get_pending_transactions_for_address),
        )
        .route("/getTransactionAmount", get(get_transaction_amount))
        .route("/getTransactionTime", get(get_transaction_time))
        .route("/getTransactionSender", get(get_transaction_sender))
        .route("/getTransactionRecipient", get(get_transaction_recipient))
        .route("/createTransaction", get(create_transaction))
        .route("/sendTransaction", get(send_transaction))
        .route("/getOverview", get(get_overview))
        .route("/health", get(health_check))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(ledger)
        .layer(cors)
}

/// Serves the facade on `addr` until ctrl-c.
pub async fn run_api_server(
    ledger: SharedLedger,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_api_router(ledger);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down API server");
        })
        .await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(ledger): State<SharedLedger>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "address": address_to_hex(&ledger.node_address()),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn get_balance(
    State(ledger): State<SharedLedger>,
    Query(q): Query<AddressQuery>,
) -> Result<Json<ValueResponse>, ApiError> {
    let address = address_from_hex(&q.address)?;
    Ok(value(ledger.get_balance(&address)))
}

async fn get_pending_balance(
    State(ledger): State<SharedLedger>,
    Query(q): Query<AddressQuery>,
) -> Result<Json<ValueResponse>, ApiError> {
    let address = address_from_hex(&q.address)?;
    Ok(value(ledger.get_pending_balance(&address)))
}

async fn get_transactions(
    State(ledger): State<SharedLedger>,
    Query(q): Query<AddressQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let address = address_from_hex(&q.address)?;
    Ok(Json(TransactionsResponse {
        transactions: join_hashes(&ledger.get_transactions(&address)),
    }))
}

/// Without an address this lists the whole pool.
async fn get_pending_transactions(
    State(ledger): State<SharedLedger>,
    Query(q): Query<AddressQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let address = match q.address.trim() {
        "" => None,
        s => Some(address_from_hex(s)?),
    };
    Ok(Json(TransactionsResponse {
        transactions: join_hashes(&ledger.get_pending_transactions(address.as_ref())),
    }))
}

async fn get_pending_transactions_for_address(
    State(ledger): State<SharedLedger>,
    Query(q): Query<AddressQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let address = address_from_hex(&q.address)?;
    Ok(Json(TransactionsResponse {
        transactions: join_hashes(&ledger.get_pending_transactions_for_address(&address)),
    }))
}

async fn get_transaction_amount(
    State(ledger): State<SharedLedger>,
    Query(q): Query<HashQuery>,
) -> Result<Json<ValueResponse>, ApiError> {
    let hash = hash_from_hex(&q.transaction_hash)?;
    Ok(value(ledger.get_transaction_amount(&hash)?))
}

async fn get_transaction_time(
    State(ledger): State<SharedLedger>,
    Query(q): Query<HashQuery>,
) -> Result<Json<ValueResponse>, ApiError> {
    let hash = hash_from_hex(&q.transaction_hash)?;
    Ok(value(format_time(ledger.get_transaction_time(&hash)?)))
}

async fn get_transaction_sender(
    State(ledger): State<SharedLedger>,
    Query(q): Query<HashQuery>,
) -> Result<Json<ValueResponse>, ApiError> {
    let hash = hash_from_hex(&q.transaction_hash)?;
    Ok(value(address_to_hex(&ledger.get_transaction_sender(&hash)?)))
}

async fn get_transaction_recipient(
    State(ledger): State<SharedLedger>,
    Query(q): Query<HashQuery>,
) -> Result<Json<ValueResponse>, ApiError> {
    let hash = hash_from_hex(&q.transaction_hash)?;
    Ok(value(address_to_hex(&ledger.get_transaction_recipient(&hash)?)))
}

async fn create_transaction(
    State(ledger): State<SharedLedger>,
    Query(q): Query<CreateQuery>,
) -> Result<Json<ValueResponse>, ApiError> {
    let sender = address_from_hex(&q.sender)?;
    let recipient = address_from_hex(&q.recipient)?;
    let amount: Amount = q.amount.parse()?;
    let fee: Amount = q.fee.parse()?;
    let tx_type: TransactionType = q.tx_type.parse()?;

    let tx = run_blocking(ledger, move |ledger| {
        ledger.create_transaction(&sender, &recipient, amount, fee, tx_type)
    })
    .await?;
    Ok(value(tx.to_wire()?))
}

async fn send_transaction(
    State(ledger): State<SharedLedger>,
    Query(q): Query<SendQuery>,
) -> Result<Json<ValueResponse>, ApiError> {
    let hash = run_blocking(ledger, move |ledger| ledger.send_transaction(&q.data)).await?;
    Ok(value(hash_to_hex(&hash)))
}

async fn get_overview(
    State(ledger): State<SharedLedger>,
    Query(q): Query<AddressQuery>,
) -> Result<Json<OverviewResponse>, ApiError> {
    let address = address_from_hex(&q.address)?;
    let transactions = ledger
        .overview(&address)
        .into_iter()
        .map(|entry| OverviewItem {
            hash: hash_to_hex(&entry.hash),
            pending: entry.pending,
        })
        .collect();
    Ok(Json(OverviewResponse {
        address: address_to_hex(&address),
        transactions,
    }))
}
