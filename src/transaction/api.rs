//! JSON endpoints for transactions.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;

use crate::{
    AppState,
    api::ApiResult,
    auth::UserID,
    db,
    pagination::{Page, PaginationConfig},
    transaction::{
        bulk::{BulkCreateRequest, BulkCreateResult, bulk_create_transactions},
        core::{
            DateRangeQuery, Transaction, TransactionData, TransactionId, TransactionQuery,
            TransactionSummary, create_transaction, delete_transaction, get_transaction,
            get_transaction_summary, list_transactions, update_transaction,
        },
        export::export_transactions_csv,
    },
};

/// The state needed for the transaction endpoints.
#[derive(Debug, Clone)]
pub struct TransactionState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

pub async fn list_transactions_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<Json<Page<Transaction>>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(list_transactions(
        user_id,
        &query,
        &state.pagination_config,
        &connection,
    )?))
}

pub async fn get_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Path(transaction_id): Path<TransactionId>,
) -> ApiResult<Json<Transaction>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(get_transaction(transaction_id, user_id, &connection)?))
}

/// Create a transaction, categorizing it with the user's rules.
pub async fn create_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Json(data): Json<TransactionData>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let connection = db::lock(&state.db_connection)?;
    let transaction = create_transaction(user_id, data, &connection)?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn update_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Path(transaction_id): Path<TransactionId>,
    Json(data): Json<TransactionData>,
) -> ApiResult<Json<Transaction>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(update_transaction(
        transaction_id,
        user_id,
        data,
        &connection,
    )?))
}

pub async fn delete_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Path(transaction_id): Path<TransactionId>,
) -> ApiResult<StatusCode> {
    let connection = db::lock(&state.db_connection)?;
    delete_transaction(transaction_id, user_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/transactions/summary`
pub async fn transaction_summary_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<Json<TransactionSummary>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(get_transaction_summary(user_id, range, &connection)?))
}

/// `POST /api/transactions/bulk_create`
pub async fn bulk_create_transactions_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Json(request): Json<BulkCreateRequest>,
) -> ApiResult<(StatusCode, Json<BulkCreateResult>)> {
    let connection = db::lock(&state.db_connection)?;
    let result = bulk_create_transactions(user_id, request, &connection)?;

    Ok((StatusCode::CREATED, Json(result)))
}

/// `GET /api/transactions/export`, sends the filtered transactions as a CSV download.
pub async fn export_transactions_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<Response> {
    let connection = db::lock(&state.db_connection)?;
    let csv = export_transactions_csv(user_id, &query, &connection)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"transactions.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}
