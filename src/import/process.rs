//! Turns pending imports into transactions.

use rusqlite::Connection;

use crate::{
    Error,
    account::get_account,
    import::{
        core::{
            Import, ImportCounts, ImportSource, ImportStatus, finish_import, get_import,
            get_pending_imports, mark_import_processing,
        },
        parse::{ParsedStatement, parse_csv, parse_ofx},
    },
    rule::RuleEngine,
    transaction::{
        fingerprint_exists, insert_transaction, is_validation_error, validate_transaction,
    },
};

fn parse_statement(import: &Import) -> Result<ParsedStatement, Error> {
    match import.source {
        ImportSource::Csv => parse_csv(&import.content),
        ImportSource::Ofx => parse_ofx(&import.content),
    }
}

/// Create the transactions of a parsed statement in a single SQL transaction.
fn import_statement(
    import: &Import,
    statement: ParsedStatement,
    connection: &Connection,
) -> Result<(ImportCounts, Vec<String>), Error> {
    let account = get_account(import.account_id, import.user_id, connection)?;
    let rules = RuleEngine::load(import.user_id, connection)?;

    let mut counts = ImportCounts {
        total_records: (statement.transactions.len() + statement.errors.len()) as u64,
        error_records: statement.errors.len() as u64,
        ..Default::default()
    };
    let mut error_log = statement.errors;

    let sql_transaction = connection.unchecked_transaction()?;

    for (index, imported) in statement.transactions.into_iter().enumerate() {
        let data = imported.into_transaction_data(account.id, Some(account.currency.clone()));

        let transaction = match validate_transaction(import.user_id, data, &sql_transaction) {
            Ok(transaction) => transaction,
            Err(error) if is_validation_error(&error) => {
                counts.error_records += 1;
                error_log.push(format!("record {}: {error}", index + 1));
                continue;
            }
            Err(error) => return Err(error),
        };

        if fingerprint_exists(import.user_id, &transaction.fingerprint, &sql_transaction)? {
            counts.skipped_records += 1;
            continue;
        }

        insert_transaction(
            import.user_id,
            transaction,
            Some(&rules),
            Some(import.id),
            &sql_transaction,
        )?;
        counts.processed_records += 1;
    }

    sql_transaction.commit()?;

    Ok((counts, error_log))
}

/// Parse an import and create its transactions.
///
/// The import finishes as completed even if some records could not be imported, those are
/// counted in `error_records` and described in `error_log`. An import that cannot be read
/// at all finishes as failed with the reason in its log.
///
/// # Errors
/// Returns an error if the import's status cannot be updated.
pub fn process_import(import: &Import, connection: &Connection) -> Result<Import, Error> {
    mark_import_processing(import.id, connection)?;

    let outcome = parse_statement(import)
        .and_then(|statement| import_statement(import, statement, connection));

    match outcome {
        Ok((counts, error_log)) => {
            tracing::info!(
                "Import {} ({}) created {} transactions, skipped {} duplicates and {} invalid records",
                import.id,
                import.filename,
                counts.processed_records,
                counts.skipped_records,
                counts.error_records
            );
            finish_import(
                import.id,
                ImportStatus::Completed,
                &counts,
                &error_log,
                connection,
            )?;
        }
        Err(error) => {
            tracing::warn!("Import {} ({}) failed: {error}", import.id, import.filename);
            finish_import(
                import.id,
                ImportStatus::Failed,
                &ImportCounts::default(),
                &[error.to_string()],
                connection,
            )?;
        }
    }

    get_import(import.id, import.user_id, connection)
}

/// Process every pending import.
///
/// Returns the number of imports processed.
pub fn process_pending_imports(connection: &Connection) -> Result<usize, Error> {
    let pending = get_pending_imports(connection)?;

    for import in &pending {
        process_import(import, connection)?;
    }

    if !pending.is_empty() {
        tracing::info!("Processed {} pending imports", pending.len());
    }

    Ok(pending.len())
}
