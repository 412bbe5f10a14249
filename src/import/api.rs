//! JSON endpoints for uploading statements and tracking their imports.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Multipart, Path, Query, State},
    http::StatusCode,
};
use rusqlite::Connection;
use serde::Serialize;

use crate::{
    AppState,
    account::AccountId,
    api::ApiResult,
    auth::UserID,
    db,
    import::core::{Import, ImportId, create_import, delete_import, get_import, list_imports, retry_import},
    pagination::{ListQuery, Page, PaginationConfig},
    upload::read_upload_form,
};

/// The largest statement that can be uploaded, in bytes.
pub const MAX_IMPORT_FILE_SIZE: usize = 10 * 1024 * 1024;

/// The state needed for the import endpoints.
#[derive(Debug, Clone)]
pub struct ImportState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for ImportState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

/// Store an uploaded CSV or OFX statement to be imported by the background job.
///
/// Expects the fields `file`, `account_id` and optionally `notes`.
pub async fn upload_import_endpoint(
    State(state): State<ImportState>,
    Extension(user_id): Extension<UserID>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Import>)> {
    let mut form = read_upload_form(multipart, MAX_IMPORT_FILE_SIZE).await?;
    let account_id: AccountId = form.parse("account_id")?;
    let notes = form.text("notes").unwrap_or_default().to_owned();
    let file = form.take_file()?;
    let content = String::from_utf8_lossy(&file.data).into_owned();

    let connection = db::lock(&state.db_connection)?;
    let import = create_import(
        user_id,
        account_id,
        &file.file_name,
        &notes,
        content,
        &connection,
    )?;

    tracing::info!(
        "Queued import {} of '{}' for user {user_id}",
        import.id,
        import.filename
    );

    Ok((StatusCode::CREATED, Json(import)))
}

pub async fn list_imports_endpoint(
    State(state): State<ImportState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<Import>>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(list_imports(
        user_id,
        &query,
        &state.pagination_config,
        &connection,
    )?))
}

pub async fn get_import_endpoint(
    State(state): State<ImportState>,
    Extension(user_id): Extension<UserID>,
    Path(import_id): Path<ImportId>,
) -> ApiResult<Json<Import>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(get_import(import_id, user_id, &connection)?))
}

pub async fn delete_import_endpoint(
    State(state): State<ImportState>,
    Extension(user_id): Extension<UserID>,
    Path(import_id): Path<ImportId>,
) -> ApiResult<StatusCode> {
    let connection = db::lock(&state.db_connection)?;
    delete_import(import_id, user_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Queue a failed import to be processed again by the background job.
pub async fn retry_import_endpoint(
    State(state): State<ImportState>,
    Extension(user_id): Extension<UserID>,
    Path(import_id): Path<ImportId>,
) -> ApiResult<Json<MessageResponse>> {
    let connection = db::lock(&state.db_connection)?;
    retry_import(import_id, user_id, &connection)?;

    tracing::info!("Import {import_id} queued for retry");

    Ok(Json(MessageResponse {
        message: "Import retry initiated".to_owned(),
    }))
}
