//! JSON endpoints for accounts.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    AppState,
    account::core::{
        Account, AccountData, AccountId, AccountSummary, create_account, delete_account,
        get_account, get_account_summary, list_accounts, update_account, update_balance,
    },
    api::ApiResult,
    auth::UserID,
    db,
    pagination::{ListQuery, Page, PaginationConfig},
};

/// The state needed for the account endpoints.
#[derive(Debug, Clone)]
pub struct AccountState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for AccountState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

pub async fn list_accounts_endpoint(
    State(state): State<AccountState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<Account>>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(list_accounts(
        user_id,
        &query,
        &state.pagination_config,
        &connection,
    )?))
}

pub async fn get_account_endpoint(
    State(state): State<AccountState>,
    Extension(user_id): Extension<UserID>,
    Path(account_id): Path<AccountId>,
) -> ApiResult<Json<Account>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(get_account(account_id, user_id, &connection)?))
}

pub async fn create_account_endpoint(
    State(state): State<AccountState>,
    Extension(user_id): Extension<UserID>,
    Json(data): Json<AccountData>,
) -> ApiResult<(StatusCode, Json<Account>)> {
    let connection = db::lock(&state.db_connection)?;
    let account = create_account(user_id, data, &connection)?;

    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn update_account_endpoint(
    State(state): State<AccountState>,
    Extension(user_id): Extension<UserID>,
    Path(account_id): Path<AccountId>,
    Json(data): Json<AccountData>,
) -> ApiResult<Json<Account>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(update_account(account_id, user_id, data, &connection)?))
}

pub async fn delete_account_endpoint(
    State(state): State<AccountState>,
    Extension(user_id): Extension<UserID>,
    Path(account_id): Path<AccountId>,
) -> ApiResult<StatusCode> {
    let connection = db::lock(&state.db_connection)?;
    delete_account(account_id, user_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct BalanceUpdate {
    pub balance: Decimal,
}

/// `POST /api/accounts/{account_id}/update_balance`
pub async fn update_balance_endpoint(
    State(state): State<AccountState>,
    Extension(user_id): Extension<UserID>,
    Path(account_id): Path<AccountId>,
    Json(update): Json<BalanceUpdate>,
) -> ApiResult<Json<Account>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(update_balance(
        account_id,
        user_id,
        update.balance,
        &connection,
    )?))
}

/// `GET /api/accounts/summary`
pub async fn account_summary_endpoint(
    State(state): State<AccountState>,
    Extension(user_id): Extension<UserID>,
) -> ApiResult<Json<AccountSummary>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(get_account_summary(user_id, &connection)?))
}
