//! Account endpoints (bearer auth required)

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::super::state::AppState;
use crate::account::{Account, AccountPatch, TransferOutcome};
use crate::auth::{AuthenticatedUser, ensure_owner};
use crate::error::{ErrorResponse, LedgerError};

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Number of records to skip
    #[serde(default)]
    #[param(minimum = 0, default = 0)]
    pub skip: i64,
    /// Number of records to return
    #[serde(default = "default_limit")]
    #[param(minimum = 1, maximum = 1000, default = 100)]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl ListParams {
    fn validate(&self) -> Result<(), LedgerError> {
        if self.skip < 0 {
            return Err(LedgerError::InvalidRequest(
                "skip must be greater than or equal to 0".into(),
            ));
        }
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            return Err(LedgerError::InvalidRequest(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AmountParams {
    /// Positive amount with at most 2 decimal places
    #[param(value_type = String, example = "50.00")]
    pub amount: Decimal,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateAccountRequest {
    /// Must match the caller when given
    #[serde(default)]
    #[schema(example = 7)]
    pub user_id: Option<i64>,
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "0.00")]
    pub balance: Option<Decimal>,
}

fn rejected(rejection: impl std::fmt::Display) -> LedgerError {
    LedgerError::InvalidRequest(rejection.to_string())
}

/// Load an account and check the caller owns it.
async fn owned_account(
    state: &AppState,
    user: &AuthenticatedUser,
    account_id: i64,
) -> Result<Account, LedgerError> {
    let account = state.accounts.get_by_id(account_id).await?;
    ensure_owner(user, account.user_id)?;
    Ok(account)
}

/// List accounts
#[utoipa::path(
    get,
    path = "/accounts",
    params(ListParams),
    responses(
        (status = 200, description = "Accounts ordered by id", body = Vec<Account>),
        (status = 400, description = "Invalid paging parameters", body = ErrorResponse),
        (status = 401, description = "Authentication failed", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Account>>, LedgerError> {
    let Query(params) = params.map_err(rejected)?;
    params.validate()?;
    let accounts = state
        .accounts
        .list_accounts(params.skip, params.limit)
        .await?;
    Ok(Json(accounts))
}

/// Get an account by id
#[utoipa::path(
    get,
    path = "/accounts/{account_id}",
    params(("account_id" = i64, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account", body = Account),
        (status = 403, description = "Account belongs to another user", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(account_id): Path<i64>,
) -> Result<Json<Account>, LedgerError> {
    Ok(Json(owned_account(&state, &user, account_id).await?))
}

/// Get the account of a user
#[utoipa::path(
    get,
    path = "/accounts/user/{user_id}",
    params(("user_id" = i64, Path, description = "Owner user id")),
    responses(
        (status = 200, description = "Account", body = Account),
        (status = 403, description = "Not the caller's user id", body = ErrorResponse),
        (status = 404, description = "User has no account", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn get_account_by_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(user_id): Path<i64>,
) -> Result<Json<Account>, LedgerError> {
    ensure_owner(&user, user_id)?;
    Ok(Json(state.accounts.get_by_user(user_id).await?))
}

/// Open the caller's account
#[utoipa::path(
    post,
    path = "/accounts",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = Account),
        (status = 400, description = "Invalid balance", body = ErrorResponse),
        (status = 403, description = "user_id is not the caller", body = ErrorResponse),
        (status = 409, description = "Caller already has an account", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Account>), LedgerError> {
    let Json(req) = body.map_err(rejected)?;
    if let Some(user_id) = req.user_id {
        ensure_owner(&user, user_id)?;
    }
    let account = state
        .accounts
        .create_account(user.user_id, req.balance)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// Update an account
#[utoipa::path(
    put,
    path = "/accounts/{account_id}",
    params(("account_id" = i64, Path, description = "Account id")),
    request_body = AccountPatch,
    responses(
        (status = 200, description = "Updated account", body = Account),
        (status = 400, description = "Invalid balance", body = ErrorResponse),
        (status = 403, description = "Account belongs to another user", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn update_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(account_id): Path<i64>,
    body: Result<Json<AccountPatch>, JsonRejection>,
) -> Result<Json<Account>, LedgerError> {
    let Json(patch) = body.map_err(rejected)?;
    owned_account(&state, &user, account_id).await?;
    Ok(Json(state.accounts.update_account(account_id, patch).await?))
}

/// Delete an account
#[utoipa::path(
    delete,
    path = "/accounts/{account_id}",
    params(("account_id" = i64, Path, description = "Account id")),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 403, description = "Account belongs to another user", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(account_id): Path<i64>,
) -> Result<StatusCode, LedgerError> {
    owned_account(&state, &user, account_id).await?;
    state.accounts.delete_account(account_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Deposit into an account
#[utoipa::path(
    post,
    path = "/accounts/{account_id}/deposit",
    params(("account_id" = i64, Path, description = "Account id"), AmountParams),
    responses(
        (status = 200, description = "Updated account", body = Account),
        (status = 400, description = "Invalid amount", body = ErrorResponse),
        (status = 403, description = "Account belongs to another user", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn deposit(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(account_id): Path<i64>,
    params: Result<Query<AmountParams>, QueryRejection>,
) -> Result<Json<Account>, LedgerError> {
    let Query(params) = params.map_err(rejected)?;
    owned_account(&state, &user, account_id).await?;
    Ok(Json(state.accounts.deposit(account_id, params.amount).await?))
}

/// Withdraw from an account
#[utoipa::path(
    post,
    path = "/accounts/{account_id}/withdraw",
    params(("account_id" = i64, Path, description = "Account id"), AmountParams),
    responses(
        (status = 200, description = "Updated account", body = Account),
        (status = 400, description = "Invalid amount", body = ErrorResponse),
        (status = 403, description = "Account belongs to another user", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 422, description = "Insufficient balance", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(account_id): Path<i64>,
    params: Result<Query<AmountParams>, QueryRejection>,
) -> Result<Json<Account>, LedgerError> {
    let Query(params) = params.map_err(rejected)?;
    owned_account(&state, &user, account_id).await?;
    Ok(Json(
        state.accounts.withdraw(account_id, params.amount).await?,
    ))
}

/// Transfer between two accounts
///
/// The caller must own the source account.
#[utoipa::path(
    post,
    path = "/accounts/{account_id}/transfer/{to_account_id}",
    params(
        ("account_id" = i64, Path, description = "Source account id"),
        ("to_account_id" = i64, Path, description = "Destination account id"),
        AmountParams
    ),
    responses(
        (status = 200, description = "Transfer completed", body = TransferOutcome),
        (status = 400, description = "Invalid amount", body = ErrorResponse),
        (status = 403, description = "Source belongs to another user", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 422, description = "Insufficient balance", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn transfer(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((from_account_id, to_account_id)): Path<(i64, i64)>,
    params: Result<Query<AmountParams>, QueryRejection>,
) -> Result<Json<TransferOutcome>, LedgerError> {
    let Query(params) = params.map_err(rejected)?;
    owned_account(&state, &user, from_account_id).await?;
    let outcome = state
        .accounts
        .transfer(from_account_id, to_account_id, params.amount)
        .await?;
    Ok(Json(outcome))
}
