//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::domain::{AccountState, AccountType, Balance, OperationContext};
use crate::error::AppError;
use crate::handlers::{
    CreateAccountCommand, CreateAccountHandler, CreateUserCommand, CreateUserHandler,
    FundsCommand, FundsHandler,
};
use crate::identifier::{Identifier, ACCOUNT_PREFIX, TRANSACTION_PREFIX, USER_PREFIX};
use crate::idempotency::{compute_request_hash, BeginOutcome, CachedResponse, IdempotencyError, IdempotencyStore};
use crate::ledger::{
    Account, LedgerStore, PostingPolicy, TransactionFilter, TransactionRecord, User,
};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const IDEMPOTENT_REPLAYED_HEADER: &str = "idempotent-replayed";

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Shared state for API handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub ledger: LedgerStore,
    pub idempotency: IdempotencyStore,
}

impl AppState {
    pub fn new(ledger: LedgerStore, idempotency: IdempotencyStore) -> Self {
        Self {
            ledger,
            idempotency,
        }
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserResponse {
    pub id: Identifier,
    pub internal_account_id: Identifier,
    pub external_account_id: Identifier,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    #[serde(default = "default_account_state")]
    pub state: AccountState,
    #[serde(rename = "type")]
    pub account_type: AccountType,
}

fn default_account_state() -> AccountState {
    AccountState::Open
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAccountResponse {
    pub id: Identifier,
}

/// Body of deposit, withdrawal and transfer requests
#[derive(Debug, Deserialize)]
pub struct FundsRequest {
    /// Major units
    pub amount: f64,
    pub user_id: String,
    #[serde(default)]
    pub debit_account_id: Option<String>,
    #[serde(default)]
    pub credit_account_id: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl FundsRequest {
    fn into_command(self) -> Result<FundsCommand, AppError> {
        let user_id = Identifier::parse_prefixed(&self.user_id, USER_PREFIX)?;
        let debit = parse_optional(self.debit_account_id.as_deref(), ACCOUNT_PREFIX)?;
        let credit = parse_optional(self.credit_account_id.as_deref(), ACCOUNT_PREFIX)?;

        Ok(FundsCommand::new(self.amount, user_id).with_accounts(debit, credit))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundsResponse {
    pub transaction_id: Identifier,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTransactionsQuery {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

impl ListTransactionsQuery {
    fn into_filter(self) -> Result<TransactionFilter, AppError> {
        let limit = match self.limit.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<u32>().map_err(|_| {
                AppError::InvalidRequest(format!("invalid limit value: {}", raw))
            })?),
        };

        Ok(TransactionFilter {
            account_id: parse_optional(self.account_id.as_deref(), ACCOUNT_PREFIX)?,
            cursor: parse_optional(self.cursor.as_deref(), TRANSACTION_PREFIX)?,
            limit,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    pub transactions: Vec<TransactionRecord>,
    pub next_cursor: Option<Identifier>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub account_id: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: Identifier,
    /// Major units as a decimal string
    pub balance: String,
    pub balance_minor: i64,
}

impl BalanceResponse {
    fn new(account_id: Identifier, balance: Balance) -> Self {
        Self {
            account_id,
            balance: balance.to_major().to_string(),
            balance_minor: balance.minor_units(),
        }
    }
}

fn parse_optional(raw: Option<&str>, prefix: &str) -> Result<Option<Identifier>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Ok(Some(Identifier::parse_prefixed(s, prefix)?)),
    }
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidRequest(format!("invalid JSON body: {}", e)))
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:user_id", get(get_user))
        .route("/accounts", post(create_account))
        .route("/accounts/:account_id", get(get_account))
        .route("/accounts/:account_id/balance", get(get_account_balance))
        .route("/deposits", post(deposit_funds))
        .route("/withdrawals", post(withdraw_funds))
        .route("/transfers", post(transfer_funds))
        .route("/transactions", get(list_transactions))
}

/// Legacy endpoints for compatibility with the original gateway paths
pub fn create_legacy_router() -> Router<AppState> {
    Router::new()
        .route("/create_user", post(create_user))
        .route("/create_account", post(create_account))
        .route("/deposit_funds", post(deposit_funds))
        .route("/withdraw_funds", post(withdraw_funds))
        .route("/transfer_funds", post(transfer_funds))
        .route("/list_transactions", get(list_transactions))
        .route("/get_account_balance", get(get_balance_legacy))
}

// =========================================================================
// Users and accounts
// =========================================================================

async fn create_user(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserResponse>), AppError> {
    let handler = CreateUserHandler::new(state.ledger);
    let user = handler
        .execute(CreateUserCommand::new(request.email, request.name), &context)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            id: user.id,
            internal_account_id: user.internal_account_id,
            external_account_id: user.external_account_id,
        }),
    ))
}

async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<User>, AppError> {
    let user_id = Identifier::parse_prefixed(&user_id, USER_PREFIX)?;
    Ok(Json(state.ledger.get_user(&user_id).await?))
}

async fn create_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<CreateAccountResponse>), AppError> {
    let handler = CreateAccountHandler::new(state.ledger);
    let account = handler
        .execute(
            CreateAccountCommand::new(request.state, request.account_type),
            &context,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateAccountResponse { id: account.id }),
    ))
}

async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<Account>, AppError> {
    let account_id = Identifier::parse_prefixed(&account_id, ACCOUNT_PREFIX)?;
    Ok(Json(state.ledger.get_account(&account_id).await?))
}

// =========================================================================
// Balances and listing
// =========================================================================

async fn get_account_balance(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<BalanceResponse>, AppError> {
    balance_response(&state.ledger, &account_id).await
}

async fn get_balance_legacy(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, AppError> {
    balance_response(&state.ledger, &query.account_id).await
}

async fn balance_response(
    ledger: &LedgerStore,
    account_id: &str,
) -> Result<Json<BalanceResponse>, AppError> {
    let account_id = Identifier::parse_prefixed(account_id.trim(), ACCOUNT_PREFIX)?;
    let balance = ledger.get_balance(&account_id).await?;
    Ok(Json(BalanceResponse::new(account_id, balance)))
}

async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, AppError> {
    let filter = query.into_filter()?;
    let page = state.ledger.list_transactions(&filter).await?;

    Ok(Json(ListTransactionsResponse {
        transactions: page.transactions,
        next_cursor: page.next_cursor,
    }))
}

// =========================================================================
// Funds (idempotent)
// =========================================================================

async fn deposit_funds(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    post_funds(state, PostingPolicy::Deposit, context, headers, body).await
}

async fn withdraw_funds(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    post_funds(state, PostingPolicy::Withdraw, context, headers, body).await
}

async fn transfer_funds(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    post_funds(state, PostingPolicy::Transfer, context, headers, body).await
}

/// Idempotency key from the header, falling back to the body field
fn idempotency_key(headers: &HeaderMap, body_key: Option<&str>) -> Result<Option<String>, AppError> {
    let header_key = match headers.get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => Some(value.to_str().map_err(|_| {
            AppError::InvalidRequest("Idempotency-Key header must be ASCII".to_string())
        })?),
        None => None,
    };

    match header_key.or(body_key).map(str::trim) {
        None | Some("") => Ok(None),
        Some(key) if key.len() > MAX_IDEMPOTENCY_KEY_LEN => Err(AppError::InvalidRequest(
            "idempotency key is too long".to_string(),
        )),
        Some(key) => Ok(Some(key.to_string())),
    }
}

/// Releases an in-progress key if the request ends without completing it,
/// including when the handler future is dropped by a timeout.
struct InFlightKey<'a> {
    store: &'a IdempotencyStore,
    key: Option<String>,
}

impl InFlightKey<'_> {
    fn complete(mut self, response: CachedResponse) {
        if let Some(key) = self.key.take() {
            self.store.complete(&key, response);
        }
    }
}

impl Drop for InFlightKey<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.store.release(&key);
        }
    }
}

async fn post_funds(
    state: AppState,
    policy: PostingPolicy,
    context: OperationContext,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let request: FundsRequest = parse_json(&body)?;
    let key = idempotency_key(&headers, request.idempotency_key.as_deref())?;
    let command = request.into_command()?;
    let handler = FundsHandler::new(state.ledger.clone(), policy);

    let Some(key) = key else {
        let posted = handler.execute(command, &context).await?;
        return Ok(Json(FundsResponse {
            transaction_id: posted.transaction_id,
        })
        .into_response());
    };

    let request_hash = compute_request_hash(policy.as_str(), &body);
    match state.idempotency.begin(&key, &request_hash) {
        Ok(BeginOutcome::Proceed) => {}
        Ok(BeginOutcome::Replay(cached)) => {
            tracing::info!(idempotency_key = %key, policy = %policy, "Replaying idempotent response");
            return Ok(replay(cached));
        }
        Err(IdempotencyError::KeyInProgress) => return Err(AppError::IdempotencyInProgress),
        Err(IdempotencyError::HashMismatch(_)) => return Err(AppError::IdempotencyKeyReused),
    }

    let in_flight = InFlightKey {
        store: &state.idempotency,
        key: Some(key),
    };

    // On error the guard drops and releases the key
    let posted = handler.execute(command, &context).await?;
    let response = FundsResponse {
        transaction_id: posted.transaction_id,
    };

    let body = serde_json::to_value(&response)
        .map_err(|e| AppError::Internal(format!("failed to encode response: {}", e)))?;
    in_flight.complete(CachedResponse {
        status: StatusCode::OK.as_u16(),
        body,
    });

    Ok(Json(response).into_response())
}

fn replay(cached: CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    let mut response = (status, Json(cached.body)).into_response();
    response
        .headers_mut()
        .insert(IDEMPOTENT_REPLAYED_HEADER, HeaderValue::from_static("true"));
    response
}
