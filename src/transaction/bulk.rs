//! Creating many transactions at once with optional duplicate skipping.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    auth::UserID,
    rule::RuleEngine,
    transaction::core::{
        Transaction, TransactionData, fingerprint_exists, insert_transaction,
        validate_transaction,
    },
};

fn default_true() -> bool {
    true
}

/// The body of a bulk create request.
///
/// Items are kept as raw JSON so that one malformed item does not reject the whole batch.
#[derive(Debug, Deserialize)]
pub struct BulkCreateRequest {
    pub transactions: Vec<serde_json::Value>,
    #[serde(default = "default_true")]
    pub skip_duplicates: bool,
    #[serde(default = "default_true")]
    pub apply_rules: bool,
}

/// An item of a bulk create request that could not be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkCreateError {
    /// The position of the item in the request.
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct BulkCreateResult {
    pub created_count: usize,
    /// The number of items skipped as duplicates.
    pub skipped_count: usize,
    pub transactions: Vec<Transaction>,
    pub errors: Vec<BulkCreateError>,
}

/// Whether `error` was caused by the client's input rather than the server.
pub(crate) fn is_validation_error(error: &Error) -> bool {
    matches!(
        error,
        Error::EmptyField(_)
            | Error::InvalidAmount(_)
            | Error::InvalidCurrency(_)
            | Error::InvalidAccount(_)
            | Error::InvalidCategory(_)
            | Error::InvalidChoice { .. }
            | Error::MissingRecurrence
            | Error::InvalidNextOccurrence { .. }
            | Error::DateOutOfRange(_)
    )
}

/// Create each transaction in `request` in a single SQL transaction.
///
/// Items that fail validation are reported in [BulkCreateResult::errors] and do not stop
/// the rest of the batch. With `skip_duplicates`, items whose fingerprint the user already
/// has are skipped, including duplicates within the batch.
///
/// # Errors
/// Returns an error if the database fails, in which case nothing is created.
pub fn bulk_create_transactions(
    user_id: UserID,
    request: BulkCreateRequest,
    connection: &Connection,
) -> Result<BulkCreateResult, Error> {
    let rules = if request.apply_rules {
        Some(RuleEngine::load(user_id, connection)?)
    } else {
        None
    };

    let sql_transaction = connection.unchecked_transaction()?;
    let mut result = BulkCreateResult::default();

    for (index, item) in request.transactions.into_iter().enumerate() {
        let data: TransactionData = match serde_json::from_value(item) {
            Ok(data) => data,
            Err(error) => {
                result.errors.push(BulkCreateError {
                    index,
                    error: error.to_string(),
                });
                continue;
            }
        };

        let transaction = match validate_transaction(user_id, data, &sql_transaction) {
            Ok(transaction) => transaction,
            Err(error) if is_validation_error(&error) => {
                result.errors.push(BulkCreateError {
                    index,
                    error: error.to_string(),
                });
                continue;
            }
            Err(error) => return Err(error),
        };

        if request.skip_duplicates
            && fingerprint_exists(user_id, &transaction.fingerprint, &sql_transaction)?
        {
            result.skipped_count += 1;
            continue;
        }

        let transaction =
            insert_transaction(user_id, transaction, rules.as_ref(), None, &sql_transaction)?;
        result.transactions.push(transaction);
    }

    sql_transaction.commit()?;
    result.created_count = result.transactions.len();

    tracing::info!(
        "Bulk created {} transactions for user {user_id}, skipped {} duplicates and {} invalid items",
        result.created_count,
        result.skipped_count,
        result.errors.len()
    );

    Ok(result)
}
