use rusqlite::{Connection, Row, params, types::Value};
use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::{
    Error,
    auth::UserID,
    database_id::DatabaseId,
    db::SqlFilter,
    pagination::{ListQuery, Page, PaginationConfig, limit_clause},
    transaction::{TransactionId, get_transaction},
    upload::UploadedFile,
};

pub type AttachmentId = DatabaseId;

/// The largest file that can be attached to a transaction, in bytes.
pub const MAX_ATTACHMENT_SIZE: usize = 10 * 1024 * 1024;

/// How long attachments are kept before the cleanup job deletes them.
pub const ATTACHMENT_RETENTION: Duration = Duration::days(730);

const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

/// A file, such as a receipt, attached to a transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub transaction_id: TransactionId,
    pub filename: String,
    /// The MIME type sent with the upload.
    pub file_type: String,
    /// The size of the file in bytes.
    pub file_size: u64,
    pub description: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub fn create_attachment_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS attachment (
            id INTEGER PRIMARY KEY,
            transaction_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            file_type TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            data BLOB NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(transaction_id) REFERENCES \"transaction\"(id) ON DELETE CASCADE
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_attachment_transaction ON attachment(transaction_id)",
        (),
    )?;

    Ok(())
}

const ATTACHMENT_COLUMNS: &str = "a.id, a.transaction_id, a.filename, a.file_type, a.file_size, \
    a.description, a.data, a.created_at";

/// Restricts attachments to those on transactions of the user bound to the placeholder.
const OWNED_BY_USER: &str = "a.transaction_id IN (SELECT id FROM \"transaction\" WHERE user_id = ?)";

fn map_attachment_row(row: &Row) -> Result<Attachment, rusqlite::Error> {
    Ok(Attachment {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        filename: row.get(2)?,
        file_type: row.get(3)?,
        file_size: row.get(4)?,
        description: row.get(5)?,
        data: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Attach an uploaded file to one of the user's transactions.
///
/// # Errors
/// Returns [Error::InvalidTransaction] if the transaction does not belong to the user,
/// [Error::FileTooLarge] if the file is over [MAX_ATTACHMENT_SIZE] or [Error::EmptyField]
/// if the file has no name.
pub fn create_attachment(
    transaction_id: TransactionId,
    user_id: UserID,
    file: UploadedFile,
    description: &str,
    connection: &Connection,
) -> Result<Attachment, Error> {
    match get_transaction(transaction_id, user_id, connection) {
        Ok(_) => {}
        Err(Error::NotFound) => return Err(Error::InvalidTransaction(transaction_id)),
        Err(error) => return Err(error),
    }

    if file.data.len() > MAX_ATTACHMENT_SIZE {
        return Err(Error::FileTooLarge(MAX_ATTACHMENT_SIZE));
    }

    let filename = file.file_name.trim();
    if filename.is_empty() {
        return Err(Error::EmptyField("filename"));
    }

    let file_type = file
        .content_type
        .as_deref()
        .map(str::trim)
        .filter(|content_type| !content_type.is_empty())
        .unwrap_or(DEFAULT_FILE_TYPE);

    let id = connection
        .prepare(
            "INSERT INTO attachment
                (transaction_id, filename, file_type, file_size, description, data, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING id",
        )?
        .query_row(
            params![
                transaction_id,
                filename,
                file_type,
                file.data.len() as u64,
                description.trim(),
                file.data,
                OffsetDateTime::now_utc()
            ],
            |row| row.get(0),
        )?;

    get_attachment(id, user_id, connection)
}

/// Get an attachment on one of the user's transactions.
///
/// # Errors
/// Returns [Error::NotFound] if the attachment does not exist or belongs to another user.
pub fn get_attachment(
    id: AttachmentId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Attachment, Error> {
    connection
        .prepare(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachment a WHERE a.id = ? AND {OWNED_BY_USER}"
        ))?
        .query_row(params![id, user_id], map_attachment_row)
        .map_err(Error::from)
}

/// The filters accepted by the attachment list endpoint.
#[derive(Debug, Default, Clone, serde::Deserialize)]
pub struct AttachmentQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub transaction_id: Option<TransactionId>,
}

impl AttachmentQuery {
    fn list_query(&self) -> ListQuery {
        ListQuery {
            page: self.page,
            page_size: self.page_size,
            search: self.search.clone(),
            ordering: self.ordering.clone(),
        }
    }
}

/// List a page of the attachments on the user's transactions.
pub fn list_attachments(
    user_id: UserID,
    query: &AttachmentQuery,
    config: &PaginationConfig,
    connection: &Connection,
) -> Result<Page<Attachment>, Error> {
    let list_query = query.list_query();
    let mut filter = SqlFilter::new(OWNED_BY_USER, [Value::Integer(user_id.as_i64())]);
    if let Some(transaction_id) = query.transaction_id {
        filter.and("a.transaction_id = ?", [Value::Integer(transaction_id)]);
    }
    filter.search(&["a.filename", "a.description"], list_query.search_pattern());

    let (page, page_size) = list_query.page_and_size(config);
    let order_by = list_query.order_by(
        &[
            ("filename", "a.filename"),
            ("file_size", "a.file_size"),
            ("created_at", "a.created_at"),
        ],
        "-created_at",
    );

    let count: u64 = connection.query_row(
        &format!(
            "SELECT COUNT(*) FROM attachment a {}",
            filter.where_clause()
        ),
        filter.params(),
        |row| row.get(0),
    )?;

    let attachments = connection
        .prepare(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachment a {} {order_by} {}",
            filter.where_clause(),
            limit_clause(page, page_size)
        ))?
        .query_map(filter.params(), map_attachment_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(attachments, count, page, page_size))
}

/// # Errors
/// Returns [Error::DeleteMissingAttachment] if the attachment is not on one of the user's
/// transactions.
pub fn delete_attachment(
    id: AttachmentId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        &format!("DELETE FROM attachment AS a WHERE a.id = ? AND {OWNED_BY_USER}"),
        params![id, user_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingAttachment);
    }

    Ok(())
}

/// Delete attachments created more than [ATTACHMENT_RETENTION] before `now`.
///
/// Returns the number of attachments deleted.
pub fn cleanup_old_attachments(now: OffsetDateTime, connection: &Connection) -> Result<usize, Error> {
    let cutoff = now - ATTACHMENT_RETENTION;
    let deleted = connection.execute("DELETE FROM attachment WHERE created_at < ?1", [cutoff])?;

    if deleted > 0 {
        tracing::info!("Deleted {deleted} attachments created before {cutoff}");
    }

    Ok(deleted)
}
