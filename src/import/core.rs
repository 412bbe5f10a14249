use rusqlite::{Connection, Row, params, types::Value};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    Error,
    account::{AccountId, ensure_account_owned},
    auth::UserID,
    choice::text_enum,
    database_id::DatabaseId,
    db::SqlFilter,
    pagination::{ListQuery, Page, PaginationConfig, limit_clause},
};

pub type ImportId = DatabaseId;

text_enum! {
    /// The format of an imported statement.
    pub enum ImportSource ("import source") {
        Csv => "csv",
        Ofx => "ofx",
    }
}

impl ImportSource {
    /// Choose the format from the extension of `filename`.
    ///
    /// # Errors
    /// Returns [Error::UnsupportedImportFormat] for anything other than CSV, OFX or QFX files.
    pub fn from_filename(filename: &str) -> Result<Self, Error> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, extension)| extension.to_ascii_lowercase());

        match extension.as_deref() {
            Some("csv") => Ok(ImportSource::Csv),
            Some("ofx" | "qfx") => Ok(ImportSource::Ofx),
            _ => Err(Error::UnsupportedImportFormat(filename.to_owned())),
        }
    }
}

text_enum! {
    pub enum ImportStatus ("import status") {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
    }
}

/// An uploaded statement and the outcome of importing its transactions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Import {
    pub id: ImportId,
    pub user_id: UserID,
    /// The account the imported transactions are recorded against.
    pub account_id: AccountId,
    pub filename: String,
    pub source: ImportSource,
    pub status: ImportStatus,
    pub total_records: u64,
    pub processed_records: u64,
    /// Records that were already imported.
    pub skipped_records: u64,
    pub error_records: u64,
    pub error_log: Vec<String>,
    pub notes: String,
    /// The text of the uploaded file.
    #[serde(skip)]
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The record counts of a finished import.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportCounts {
    pub total_records: u64,
    pub processed_records: u64,
    pub skipped_records: u64,
    pub error_records: u64,
}

pub fn create_import_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS import (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            source TEXT NOT NULL,
            status TEXT NOT NULL,
            total_records INTEGER NOT NULL DEFAULT 0,
            processed_records INTEGER NOT NULL DEFAULT 0,
            skipped_records INTEGER NOT NULL DEFAULT 0,
            error_records INTEGER NOT NULL DEFAULT 0,
            error_log TEXT NOT NULL DEFAULT '[]',
            notes TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE,
            FOREIGN KEY(account_id) REFERENCES account(id) ON DELETE CASCADE
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_import_status ON import(status)",
        (),
    )?;

    Ok(())
}

const IMPORT_COLUMNS: &str = "id, user_id, account_id, filename, source, status, total_records, \
    processed_records, skipped_records, error_records, error_log, notes, content, created_at, \
    updated_at";

fn map_import_row(row: &Row) -> Result<Import, rusqlite::Error> {
    let error_log: String = row.get(10)?;
    let error_log = serde_json::from_str(&error_log).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(error))
    })?;

    Ok(Import {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        account_id: row.get(2)?,
        filename: row.get(3)?,
        source: row.get(4)?,
        status: row.get(5)?,
        total_records: row.get(6)?,
        processed_records: row.get(7)?,
        skipped_records: row.get(8)?,
        error_records: row.get(9)?,
        error_log,
        notes: row.get(11)?,
        content: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

/// Store an uploaded statement as a pending import.
///
/// # Errors
/// Returns [Error::UnsupportedImportFormat] if the file is not CSV or OFX, or
/// [Error::InvalidAccount] if the account does not belong to the user.
pub fn create_import(
    user_id: UserID,
    account_id: AccountId,
    filename: &str,
    notes: &str,
    content: String,
    connection: &Connection,
) -> Result<Import, Error> {
    let source = ImportSource::from_filename(filename)?;
    ensure_account_owned(account_id, user_id, connection)?;
    let now = OffsetDateTime::now_utc();

    connection
        .prepare(&format!(
            "INSERT INTO import
                (user_id, account_id, filename, source, status, notes, content, created_at,
                 updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            RETURNING {IMPORT_COLUMNS}"
        ))?
        .query_row(
            params![
                user_id,
                account_id,
                filename,
                source,
                ImportStatus::Pending,
                notes.trim(),
                content,
                now
            ],
            map_import_row,
        )
        .map_err(Error::from)
}

/// Get one of the user's imports.
///
/// # Errors
/// Returns [Error::NotFound] if the import does not exist or belongs to another user.
pub fn get_import(id: ImportId, user_id: UserID, connection: &Connection) -> Result<Import, Error> {
    connection
        .prepare(&format!(
            "SELECT {IMPORT_COLUMNS} FROM import WHERE id = ?1 AND user_id = ?2"
        ))?
        .query_row(params![id, user_id], map_import_row)
        .map_err(Error::from)
}

/// List a page of the user's imports.
pub fn list_imports(
    user_id: UserID,
    query: &ListQuery,
    config: &PaginationConfig,
    connection: &Connection,
) -> Result<Page<Import>, Error> {
    let mut filter = SqlFilter::new("user_id = ?", [Value::Integer(user_id.as_i64())]);
    filter.search(&["filename", "notes"], query.search_pattern());

    let (page, page_size) = query.page_and_size(config);
    let order_by = query.order_by(
        &[
            ("created_at", "created_at"),
            ("filename", "filename"),
            ("status", "status"),
        ],
        "-created_at",
    );

    let count: u64 = connection.query_row(
        &format!("SELECT COUNT(*) FROM import {}", filter.where_clause()),
        filter.params(),
        |row| row.get(0),
    )?;

    let imports = connection
        .prepare(&format!(
            "SELECT {IMPORT_COLUMNS} FROM import {} {order_by} {}",
            filter.where_clause(),
            limit_clause(page, page_size)
        ))?
        .query_map(filter.params(), map_import_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(imports, count, page, page_size))
}

/// The pending imports of every user, oldest first.
pub fn get_pending_imports(connection: &Connection) -> Result<Vec<Import>, Error> {
    connection
        .prepare(&format!(
            "SELECT {IMPORT_COLUMNS} FROM import WHERE status = ?1 ORDER BY id"
        ))?
        .query_map([ImportStatus::Pending], map_import_row)?
        .map(|import| import.map_err(Error::from))
        .collect()
}

/// # Errors
/// Returns [Error::DeleteMissingImport] if the import does not belong to the user.
pub fn delete_import(id: ImportId, user_id: UserID, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM import WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingImport);
    }

    Ok(())
}

/// Queue a failed import to be processed again.
///
/// The counts and error log of the failed attempt are cleared.
///
/// # Errors
/// Returns [Error::NotFound] if the import does not belong to the user, or
/// [Error::ImportNotRetryable] if the import has not failed.
pub fn retry_import(id: ImportId, user_id: UserID, connection: &Connection) -> Result<Import, Error> {
    let import = get_import(id, user_id, connection)?;

    if import.status != ImportStatus::Failed {
        return Err(Error::ImportNotRetryable);
    }

    connection.execute(
        "UPDATE import
        SET status = ?1, total_records = 0, processed_records = 0, skipped_records = 0,
            error_records = 0, error_log = '[]', updated_at = ?2
        WHERE id = ?3",
        params![ImportStatus::Pending, OffsetDateTime::now_utc(), id],
    )?;

    get_import(id, user_id, connection)
}

pub(crate) fn mark_import_processing(id: ImportId, connection: &Connection) -> Result<(), Error> {
    connection.execute(
        "UPDATE import SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![ImportStatus::Processing, OffsetDateTime::now_utc(), id],
    )?;

    Ok(())
}

/// Record the outcome of processing an import.
pub(crate) fn finish_import(
    id: ImportId,
    status: ImportStatus,
    counts: &ImportCounts,
    error_log: &[String],
    connection: &Connection,
) -> Result<(), Error> {
    let error_log = serde_json::to_string(error_log)
        .map_err(|error| Error::JSONSerializationError(error.to_string()))?;

    connection.execute(
        "UPDATE import
        SET status = ?1, total_records = ?2, processed_records = ?3, skipped_records = ?4,
            error_records = ?5, error_log = ?6, updated_at = ?7
        WHERE id = ?8",
        params![
            status,
            counts.total_records,
            counts.processed_records,
            counts.skipped_records,
            counts.error_records,
            error_log,
            OffsetDateTime::now_utc(),
            id
        ],
    )?;

    Ok(())
}
