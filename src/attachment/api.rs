//! JSON endpoints for transaction attachments and the file download.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;

use crate::{
    AppState,
    api::ApiResult,
    attachment::core::{
        Attachment, AttachmentId, AttachmentQuery, MAX_ATTACHMENT_SIZE, create_attachment,
        delete_attachment, get_attachment, list_attachments,
    },
    auth::UserID,
    db,
    pagination::{Page, PaginationConfig},
    transaction::TransactionId,
    upload::read_upload_form,
};

/// The state needed for the attachment endpoints.
#[derive(Debug, Clone)]
pub struct AttachmentState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for AttachmentState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

/// Attach a file to a transaction.
///
/// Expects the fields `transaction_id`, `file` and optionally `description`.
pub async fn upload_attachment_endpoint(
    State(state): State<AttachmentState>,
    Extension(user_id): Extension<UserID>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Attachment>)> {
    let mut form = read_upload_form(multipart, MAX_ATTACHMENT_SIZE).await?;
    let transaction_id: TransactionId = form.parse("transaction_id")?;
    let description = form.text("description").unwrap_or_default().to_owned();
    let file = form.take_file()?;

    let connection = db::lock(&state.db_connection)?;
    let attachment =
        create_attachment(transaction_id, user_id, file, &description, &connection)?;

    Ok((StatusCode::CREATED, Json(attachment)))
}

pub async fn list_attachments_endpoint(
    State(state): State<AttachmentState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<AttachmentQuery>,
) -> ApiResult<Json<Page<Attachment>>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(list_attachments(
        user_id,
        &query,
        &state.pagination_config,
        &connection,
    )?))
}

pub async fn get_attachment_endpoint(
    State(state): State<AttachmentState>,
    Extension(user_id): Extension<UserID>,
    Path(attachment_id): Path<AttachmentId>,
) -> ApiResult<Json<Attachment>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(get_attachment(attachment_id, user_id, &connection)?))
}

/// Send the attached file with its original name and type.
pub async fn download_attachment_endpoint(
    State(state): State<AttachmentState>,
    Extension(user_id): Extension<UserID>,
    Path(attachment_id): Path<AttachmentId>,
) -> ApiResult<Response> {
    let attachment = {
        let connection = db::lock(&state.db_connection)?;
        get_attachment(attachment_id, user_id, &connection)?
    };

    let filename = attachment.filename.replace(['"', '\\', '\r', '\n'], "_");

    Ok((
        [
            (header::CONTENT_TYPE, attachment.file_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        attachment.data,
    )
        .into_response())
}

pub async fn delete_attachment_endpoint(
    State(state): State<AttachmentState>,
    Extension(user_id): Extension<UserID>,
    Path(attachment_id): Path<AttachmentId>,
) -> ApiResult<StatusCode> {
    let connection = db::lock(&state.db_connection)?;
    delete_attachment(attachment_id, user_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Extension, Router, extract::State, http::StatusCode, routing::get};
    use axum_test::TestServer;
    use serde_json::Value;
    use time::macros::date;

    use crate::{
        Error,
        api::ApiError,
        endpoints,
        pagination::PaginationConfig,
        test_utils::{MultipartPart, must_make_multipart},
        transaction::test_utils::{create_test_transaction, expense, get_test_connection},
    };

    use super::{
        AttachmentState, delete_attachment_endpoint, download_attachment_endpoint,
        get_attachment_endpoint, list_attachments_endpoint, upload_attachment_endpoint,
    };

    #[tokio::test]
    async fn upload_list_download_and_delete() {
        let (connection, user_id, account_id) = get_test_connection();
        let transaction = create_test_transaction(
            user_id,
            expense(12, date!(2024 - 03 - 01), "Lunch", account_id),
            &connection,
        );
        let state = AttachmentState {
            db_connection: Arc::new(Mutex::new(connection)),
            pagination_config: PaginationConfig::default(),
        };
        let transaction_id = transaction.id.to_string();
        let multipart = must_make_multipart(
            endpoints::ATTACHMENTS,
            &[
                MultipartPart::text("transaction_id", &transaction_id),
                MultipartPart::text("description", "Receipt"),
                MultipartPart::file("file", "receipt.txt", "text/plain", b"coffee 4.50"),
            ],
        )
        .await;

        let (status, attachment) =
            upload_attachment_endpoint(State(state.clone()), Extension(user_id), multipart)
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(attachment.file_size, 11);

        let app = Router::new()
            .route(endpoints::ATTACHMENTS, get(list_attachments_endpoint))
            .route(
                endpoints::ATTACHMENT,
                get(get_attachment_endpoint).delete(delete_attachment_endpoint),
            )
            .route(
                endpoints::ATTACHMENT_DOWNLOAD,
                get(download_attachment_endpoint),
            )
            .layer(Extension(user_id))
            .with_state(state);
        let server = TestServer::try_new(app).unwrap();
        let attachment_path = format!("/api/attachments/{}", attachment.id);

        let response = server.get(endpoints::ATTACHMENTS).await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"][0]["filename"], "receipt.txt");
        assert_eq!(body["results"][0]["file_type"], "text/plain");

        let response = server.get(&format!("{attachment_path}/download")).await;
        response.assert_status_ok();
        assert_eq!(response.header("content-type"), "text/plain");
        assert_eq!(
            response.header("content-disposition"),
            "attachment; filename=\"receipt.txt\""
        );
        assert_eq!(&response.as_bytes()[..], b"coffee 4.50");

        server
            .delete(&attachment_path)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .get(&attachment_path)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_to_unknown_transaction_fails() {
        let (connection, user_id, _) = get_test_connection();
        let state = AttachmentState {
            db_connection: Arc::new(Mutex::new(connection)),
            pagination_config: PaginationConfig::default(),
        };
        let multipart = must_make_multipart(
            endpoints::ATTACHMENTS,
            &[
                MultipartPart::text("transaction_id", "42"),
                MultipartPart::file("file", "receipt.txt", "text/plain", b"coffee"),
            ],
        )
        .await;

        let result = upload_attachment_endpoint(State(state), Extension(user_id), multipart).await;

        assert_eq!(result.err(), Some(ApiError(Error::InvalidTransaction(42))));
    }
}
