//! Defines the core data models and database queries for transactions.

use rusqlite::{Connection, OptionalExtension, Row, params, types::Type, types::Value};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    account::{AccountId, ensure_account_owned},
    auth::UserID,
    category::{CategoryId, ensure_category_visible},
    choice::text_enum,
    database_id::DatabaseId,
    db::SqlFilter,
    money::{
        DEFAULT_CURRENCY, from_cents, round_money, to_cents, validate_currency,
        validate_positive_amount,
    },
    pagination::{ListQuery, Page, PaginationConfig, limit_clause},
    recurrence::Frequency,
    rule::{RuleEngine, RuleInput},
};

pub type TransactionId = DatabaseId;

text_enum! {
    /// Whether money left, entered or moved between the user's accounts.
    pub enum TransactionType ("transaction type") {
        Expense => "expense",
        Income => "income",
        Transfer => "transfer",
    }
}

// ============================================================================
// MODELS
// ============================================================================

/// A single movement of money recorded against one of the user's accounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserID,
    pub transaction_type: TransactionType,
    /// Always positive, the direction comes from `transaction_type`.
    pub amount: Decimal,
    pub currency: String,
    pub date: Date,
    pub description: String,
    pub notes: String,
    pub category_id: Option<CategoryId>,
    pub account_id: AccountId,
    pub merchant: String,
    pub location: String,
    pub tags: Vec<String>,
    pub is_recurring: bool,
    pub recurrence: Option<Frequency>,
    /// The date the next copy of a recurring transaction is due.
    pub next_occurrence: Option<Date>,
    /// The ID the bank gave the transaction, if it was imported.
    pub external_id: Option<String>,
    pub import_id: Option<DatabaseId>,
    pub fingerprint: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The fields clients send to create or replace a transaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionData {
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub date: Date,
    pub description: String,
    #[serde(default)]
    pub notes: String,
    pub category_id: Option<CategoryId>,
    pub account_id: AccountId,
    #[serde(default)]
    pub merchant: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence: Option<Frequency>,
    pub next_occurrence: Option<Date>,
    pub external_id: Option<String>,
}

impl TransactionData {
    /// The minimal data for a transaction, everything else left at its default.
    pub fn new(
        transaction_type: TransactionType,
        amount: Decimal,
        date: Date,
        description: &str,
        account_id: AccountId,
    ) -> Self {
        Self {
            transaction_type,
            amount,
            currency: None,
            date,
            description: description.to_owned(),
            notes: String::new(),
            category_id: None,
            account_id,
            merchant: String::new(),
            location: String::new(),
            tags: Vec::new(),
            is_recurring: false,
            recurrence: None,
            next_occurrence: None,
            external_id: None,
        }
    }
}

/// Transaction data that has passed validation and is ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub data: TransactionData,
    pub fingerprint: String,
}

impl NewTransaction {
    /// The fields that categorization rules match against.
    pub fn rule_input(&self) -> RuleInput {
        RuleInput {
            description: self.data.description.clone(),
            merchant: self.data.merchant.clone(),
            amount: self.data.amount,
        }
    }
}

/// The filters accepted by the transaction list and export endpoints.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TransactionQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub account_id: Option<AccountId>,
    pub category_id: Option<CategoryId>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
}

impl TransactionQuery {
    pub(crate) fn list_query(&self) -> ListQuery {
        ListQuery {
            page: self.page,
            page_size: self.page_size,
            search: self.search.clone(),
            ordering: self.ordering.clone(),
        }
    }
}

/// An optional date range for aggregates.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct DateRangeQuery {
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
}

/// Totals per transaction type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub total_income: Decimal,
    pub total_expenses: Decimal,
    pub total_transfers: Decimal,
    pub net_income: Decimal,
    pub transaction_count: u64,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            transaction_type TEXT NOT NULL,
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            currency TEXT NOT NULL,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            category_id INTEGER,
            account_id INTEGER NOT NULL,
            merchant TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '[]',
            is_recurring INTEGER NOT NULL DEFAULT 0,
            recurrence TEXT,
            next_occurrence TEXT,
            external_id TEXT,
            import_id INTEGER,
            fingerprint TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE,
            FOREIGN KEY(category_id) REFERENCES category(id) ON DELETE SET NULL,
            FOREIGN KEY(account_id) REFERENCES account(id) ON DELETE CASCADE,
            FOREIGN KEY(import_id) REFERENCES import(id) ON DELETE SET NULL
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_user_date ON \"transaction\"(user_id, date)",
        (),
    )?;
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_fingerprint ON \"transaction\"(user_id, fingerprint)",
        (),
    )?;

    Ok(())
}

pub(crate) const TRANSACTION_COLUMNS: &str = "id, user_id, transaction_type, amount_cents, currency, date, \
    description, notes, category_id, account_id, merchant, location, tags, is_recurring, \
    recurrence, next_occurrence, external_id, import_id, fingerprint, created_at, updated_at";

pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let tags: String = row.get(12)?;
    let tags = serde_json::from_str(&tags)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(12, Type::Text, Box::new(error)))?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        transaction_type: row.get(2)?,
        amount: from_cents(row.get(3)?),
        currency: row.get(4)?,
        date: row.get(5)?,
        description: row.get(6)?,
        notes: row.get(7)?,
        category_id: row.get(8)?,
        account_id: row.get(9)?,
        merchant: row.get(10)?,
        location: row.get(11)?,
        tags,
        is_recurring: row.get(13)?,
        recurrence: row.get(14)?,
        next_occurrence: row.get(15)?,
        external_id: row.get(16)?,
        import_id: row.get(17)?,
        fingerprint: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}

/// The duplicate-detection hash of a transaction.
///
/// Lowercase hex SHA-256 of `user_id|date|amount|merchant|account_id|external_id`,
/// with the amount written with two decimal places.
pub fn fingerprint(
    user_id: UserID,
    date: Date,
    amount: Decimal,
    merchant: &str,
    account_id: AccountId,
    external_id: Option<&str>,
) -> String {
    let input = format!(
        "{user_id}|{date}|{}|{merchant}|{account_id}|{}",
        round_money(amount),
        external_id.unwrap_or_default()
    );

    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// Check and normalise `data` for `user_id`.
///
/// # Errors
/// Returns:
/// - [Error::InvalidAmount] if the amount is not positive,
/// - [Error::EmptyField] if the description is blank,
/// - [Error::InvalidCurrency] if the currency code is malformed,
/// - [Error::InvalidAccount] or [Error::InvalidCategory] if they do not belong to the user,
/// - [Error::MissingRecurrence] if a recurring transaction has no frequency,
/// - [Error::InvalidNextOccurrence] if the next occurrence is not after the date,
/// - [Error::DateOutOfRange] if the next occurrence would be past the last representable date.
pub fn validate_transaction(
    user_id: UserID,
    mut data: TransactionData,
    connection: &Connection,
) -> Result<NewTransaction, Error> {
    data.amount = validate_positive_amount(data.amount)?;

    data.description = data.description.trim().to_owned();
    if data.description.is_empty() {
        return Err(Error::EmptyField("description"));
    }

    data.currency = Some(validate_currency(
        data.currency.as_deref().unwrap_or(DEFAULT_CURRENCY),
    )?);
    data.merchant = data.merchant.trim().to_owned();
    data.location = data.location.trim().to_owned();
    data.external_id = data
        .external_id
        .map(|id| id.trim().to_owned())
        .filter(|id| !id.is_empty());
    data.tags = data
        .tags
        .into_iter()
        .map(|tag| tag.trim().to_owned())
        .filter(|tag| !tag.is_empty())
        .collect();

    if data.is_recurring {
        let Some(frequency) = data.recurrence else {
            return Err(Error::MissingRecurrence);
        };
        let next_occurrence = match data.next_occurrence {
            Some(next_occurrence) => next_occurrence,
            None => frequency.advance(data.date)?,
        };
        if next_occurrence <= data.date {
            return Err(Error::InvalidNextOccurrence {
                date: data.date,
                next_occurrence,
            });
        }
        data.next_occurrence = Some(next_occurrence);
    } else {
        data.recurrence = None;
        data.next_occurrence = None;
    }

    ensure_account_owned(data.account_id, user_id, connection)?;
    if let Some(category_id) = data.category_id {
        ensure_category_visible(category_id, user_id, connection)?;
    }

    let fingerprint = fingerprint(
        user_id,
        data.date,
        data.amount,
        &data.merchant,
        data.account_id,
        data.external_id.as_deref(),
    );

    Ok(NewTransaction { data, fingerprint })
}

/// Whether the user already has a transaction with `fingerprint`.
///
/// Deleted transactions count so that re-importing a file does not bring them back.
pub fn fingerprint_exists(
    user_id: UserID,
    fingerprint: &str,
    connection: &Connection,
) -> Result<bool, Error> {
    let found = connection
        .query_row(
            "SELECT 1 FROM \"transaction\" WHERE user_id = ?1 AND fingerprint = ?2 LIMIT 1",
            params![user_id, fingerprint],
            |_| Ok(()),
        )
        .optional()?;

    Ok(found.is_some())
}

/// Insert a validated transaction.
///
/// When `rules` is given, the first matching rule sets the category, replacing the one in
/// `transaction`.
pub fn insert_transaction(
    user_id: UserID,
    transaction: NewTransaction,
    rules: Option<&RuleEngine>,
    import_id: Option<DatabaseId>,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let matched_category = rules.and_then(|rules| rules.find_matching_category(&transaction.rule_input()));
    let NewTransaction { data, fingerprint } = transaction;
    let category_id = matched_category.or(data.category_id);
    let tags = serde_json::to_string(&data.tags)
        .map_err(|error| Error::JSONSerializationError(error.to_string()))?;
    let now = OffsetDateTime::now_utc();

    let transaction = connection
        .prepare(&format!(
            "INSERT INTO \"transaction\"
                (user_id, transaction_type, amount_cents, currency, date, description, notes,
                 category_id, account_id, merchant, location, tags, is_recurring, recurrence,
                 next_occurrence, external_id, import_id, fingerprint, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?19)
            RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            params![
                user_id,
                data.transaction_type,
                to_cents(data.amount),
                data.currency,
                data.date,
                data.description,
                data.notes,
                category_id,
                data.account_id,
                data.merchant,
                data.location,
                tags,
                data.is_recurring,
                data.recurrence,
                data.next_occurrence,
                data.external_id,
                import_id,
                fingerprint,
                now
            ],
            map_transaction_row,
        )?;

    if let Some(category_id) = matched_category {
        tracing::debug!(
            "transaction {} categorized as {category_id} by a rule",
            transaction.id
        );
    }

    Ok(transaction)
}

/// Validate `data` and create a transaction, applying the user's active rules.
///
/// # Errors
/// Returns a validation error as described in [validate_transaction].
pub fn create_transaction(
    user_id: UserID,
    data: TransactionData,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = validate_transaction(user_id, data, connection)?;
    let rules = RuleEngine::load(user_id, connection)?;

    insert_transaction(user_id, transaction, Some(&rules), None, connection)
}

/// Get one of the user's transactions that has not been deleted.
///
/// # Errors
/// Returns [Error::NotFound] if the transaction does not exist, was deleted or
/// belongs to another user.
pub fn get_transaction(
    id: TransactionId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
            WHERE id = ?1 AND user_id = ?2 AND is_deleted = 0"
        ))?
        .query_row(params![id, user_id], map_transaction_row)
        .map_err(Error::from)
}

fn check_date_range(start_date: Option<Date>, end_date: Option<Date>) -> Result<(), Error> {
    match (start_date, end_date) {
        (Some(start), Some(end)) if end < start => Err(Error::InvalidDateRange { start, end }),
        _ => Ok(()),
    }
}

/// The `WHERE` conditions for the user's non-deleted transactions that match `query`.
pub(crate) fn transaction_filter(
    user_id: UserID,
    query: &TransactionQuery,
) -> Result<SqlFilter, Error> {
    check_date_range(query.start_date, query.end_date)?;

    let mut filter = SqlFilter::new(
        "t.user_id = ? AND t.is_deleted = 0",
        [Value::Integer(user_id.as_i64())],
    );
    filter.search(
        &["t.description", "t.notes", "t.merchant"],
        query.list_query().search_pattern(),
    );

    if let Some(transaction_type) = query.transaction_type {
        filter.and(
            "t.transaction_type = ?",
            [Value::Text(transaction_type.to_string())],
        );
    }
    if let Some(account_id) = query.account_id {
        filter.and("t.account_id = ?", [Value::Integer(account_id)]);
    }
    if let Some(category_id) = query.category_id {
        filter.and("t.category_id = ?", [Value::Integer(category_id)]);
    }
    if let Some(start_date) = query.start_date {
        filter.and("t.date >= ?", [Value::Text(start_date.to_string())]);
    }
    if let Some(end_date) = query.end_date {
        filter.and("t.date <= ?", [Value::Text(end_date.to_string())]);
    }

    Ok(filter)
}

/// List a page of the user's transactions.
///
/// # Errors
/// Returns [Error::InvalidDateRange] if `end_date` is before `start_date`.
pub fn list_transactions(
    user_id: UserID,
    query: &TransactionQuery,
    config: &PaginationConfig,
    connection: &Connection,
) -> Result<Page<Transaction>, Error> {
    let filter = transaction_filter(user_id, query)?;
    let list_query = query.list_query();

    let (page, page_size) = list_query.page_and_size(config);
    let order_by = list_query.order_by(
        &[
            ("date", "t.date"),
            ("amount", "t.amount_cents"),
            ("created_at", "t.created_at"),
        ],
        "-date",
    );

    let count: u64 = connection.query_row(
        &format!(
            "SELECT COUNT(*) FROM \"transaction\" t {}",
            filter.where_clause()
        ),
        filter.params(),
        |row| row.get(0),
    )?;

    let transactions = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" t {} {order_by} {}",
            filter.where_clause(),
            limit_clause(page, page_size)
        ))?
        .query_map(filter.params(), map_transaction_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(transactions, count, page, page_size))
}

/// The `count` most recent of the user's transactions.
pub fn get_recent_transactions(
    user_id: UserID,
    count: u64,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
            WHERE user_id = ?1 AND is_deleted = 0
            ORDER BY date DESC, created_at DESC, id DESC
            LIMIT ?2"
        ))?
        .query_map(params![user_id, count], map_transaction_row)?
        .map(|transaction| transaction.map_err(Error::from))
        .collect()
}

/// Replace the editable fields of a transaction and recompute its fingerprint.
///
/// Rules are not applied, the category is taken as given.
///
/// # Errors
/// Returns [Error::UpdateMissingTransaction] if the transaction does not exist, was
/// deleted or belongs to another user, or a validation error as for [create_transaction].
pub fn update_transaction(
    id: TransactionId,
    user_id: UserID,
    data: TransactionData,
    connection: &Connection,
) -> Result<Transaction, Error> {
    match get_transaction(id, user_id, connection) {
        Ok(_) => {}
        Err(Error::NotFound) => return Err(Error::UpdateMissingTransaction),
        Err(error) => return Err(error),
    }

    let NewTransaction { data, fingerprint } = validate_transaction(user_id, data, connection)?;
    let tags = serde_json::to_string(&data.tags)
        .map_err(|error| Error::JSONSerializationError(error.to_string()))?;

    connection
        .prepare(&format!(
            "UPDATE \"transaction\"
            SET transaction_type = ?1, amount_cents = ?2, currency = ?3, date = ?4,
                description = ?5, notes = ?6, category_id = ?7, account_id = ?8, merchant = ?9,
                location = ?10, tags = ?11, is_recurring = ?12, recurrence = ?13,
                next_occurrence = ?14, external_id = ?15, fingerprint = ?16, updated_at = ?17
            WHERE id = ?18 AND user_id = ?19 AND is_deleted = 0
            RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            params![
                data.transaction_type,
                to_cents(data.amount),
                data.currency,
                data.date,
                data.description,
                data.notes,
                data.category_id,
                data.account_id,
                data.merchant,
                data.location,
                tags,
                data.is_recurring,
                data.recurrence,
                data.next_occurrence,
                data.external_id,
                fingerprint,
                OffsetDateTime::now_utc(),
                id,
                user_id
            ],
            map_transaction_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::UpdateMissingTransaction,
            error => error.into(),
        })
}

/// Mark one of the user's transactions as deleted.
///
/// # Errors
/// Returns [Error::DeleteMissingTransaction] if the transaction does not exist, was
/// already deleted or belongs to another user.
pub fn delete_transaction(
    id: TransactionId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE \"transaction\" SET is_deleted = 1, updated_at = ?1
        WHERE id = ?2 AND user_id = ?3 AND is_deleted = 0",
        params![OffsetDateTime::now_utc(), id, user_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingTransaction);
    }

    Ok(())
}

/// Total the user's transactions by type, optionally within a date range.
///
/// # Errors
/// Returns [Error::InvalidDateRange] if `end_date` is before `start_date`.
pub fn get_transaction_summary(
    user_id: UserID,
    range: DateRangeQuery,
    connection: &Connection,
) -> Result<TransactionSummary, Error> {
    let query = TransactionQuery {
        start_date: range.start_date,
        end_date: range.end_date,
        ..Default::default()
    };
    let filter = transaction_filter(user_id, &query)?;

    let totals = connection
        .prepare(&format!(
            "SELECT t.transaction_type, COALESCE(SUM(t.amount_cents), 0), COUNT(*)
            FROM \"transaction\" t {}
            GROUP BY t.transaction_type",
            filter.where_clause()
        ))?
        .query_map(filter.params(), |row| {
            Ok((
                row.get::<_, TransactionType>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, u64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut summary = TransactionSummary {
        total_income: from_cents(0),
        total_expenses: from_cents(0),
        total_transfers: from_cents(0),
        net_income: from_cents(0),
        transaction_count: 0,
    };

    for (transaction_type, cents, count) in totals {
        let total = from_cents(cents);
        match transaction_type {
            TransactionType::Expense => summary.total_expenses = total,
            TransactionType::Income => summary.total_income = total,
            TransactionType::Transfer => summary.total_transfers = total,
        }
        summary.transaction_count += count;
    }
    summary.net_income = summary.total_income - summary.total_expenses;

    Ok(summary)
}

#[cfg(test)]
pub(crate) mod test_utils {
    use rusqlite::Connection;
    use rust_decimal::Decimal;
    use time::Date;

    use crate::{
        account::{AccountData, AccountId, AccountType, create_account},
        auth::{PasswordHash, UserID, create_user},
        db::initialize,
    };

    use super::{Transaction, TransactionData, TransactionType, create_transaction};

    /// An initialized in-memory database with one user and one account.
    pub(crate) fn get_test_connection() -> (Connection, UserID, AccountId) {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let user = create_user(
            "alice",
            "alice@example.com",
            PasswordHash::new_unchecked("hunter2"),
            &connection,
        )
        .unwrap();
        let account = create_account(
            user.id,
            AccountData {
                name: "Everyday".to_owned(),
                account_type: AccountType::Checking,
                balance: Decimal::ZERO,
                currency: None,
                institution: String::new(),
                notes: String::new(),
                is_active: None,
            },
            &connection,
        )
        .unwrap();

        (connection, user.id, account.id)
    }

    pub(crate) fn expense(amount: i64, date: Date, description: &str, account_id: AccountId) -> TransactionData {
        TransactionData::new(
            TransactionType::Expense,
            Decimal::from(amount),
            date,
            description,
            account_id,
        )
    }

    pub(crate) fn create_test_transaction(
        user_id: UserID,
        data: TransactionData,
        connection: &Connection,
    ) -> Transaction {
        create_transaction(user_id, data, connection).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;
    use time::macros::date;

    use crate::{
        Error,
        auth::UserID,
        category::{CategoryData, create_category},
        pagination::PaginationConfig,
        recurrence::Frequency,
        rule::{RuleType, create_rule, test_utils::rule_data},
    };

    use super::{
        DateRangeQuery, TransactionData, TransactionQuery, TransactionType, create_transaction,
        delete_transaction, fingerprint, fingerprint_exists, get_transaction,
        get_transaction_summary, list_transactions, update_transaction,
        test_utils::{create_test_transaction, expense, get_test_connection},
    };

    #[test]
    fn fingerprint_is_stable_hex_sha256() {
        let a = fingerprint(
            UserID::new(1),
            date!(2024 - 03 - 01),
            Decimal::from_str("12.5").unwrap(),
            "Cafe",
            2,
            None,
        );
        let b = fingerprint(
            UserID::new(1),
            date!(2024 - 03 - 01),
            Decimal::from_str("12.50").unwrap(),
            "Cafe",
            2,
            Some(""),
        );

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn fingerprint_changes_with_fields() {
        let base = fingerprint(UserID::new(1), date!(2024 - 03 - 01), Decimal::ONE, "", 2, None);

        assert_ne!(
            base,
            fingerprint(UserID::new(1), date!(2024 - 03 - 01), Decimal::ONE, "", 2, Some("abc"))
        );
        assert_ne!(
            base,
            fingerprint(UserID::new(2), date!(2024 - 03 - 01), Decimal::ONE, "", 2, None)
        );
    }

    #[test]
    fn create_transaction_succeeds() {
        let (connection, user_id, account_id) = get_test_connection();

        let transaction = create_transaction(
            user_id,
            expense(12, date!(2024 - 03 - 01), "  Lunch ", account_id),
            &connection,
        )
        .unwrap();

        assert_eq!(transaction.description, "Lunch");
        assert_eq!(transaction.amount.to_string(), "12.00");
        assert_eq!(transaction.currency, "USD");
        assert!(fingerprint_exists(user_id, &transaction.fingerprint, &connection).unwrap());
        assert_eq!(get_transaction(transaction.id, user_id, &connection), Ok(transaction));
    }

    #[test]
    fn create_rejects_invalid_fields() {
        let (connection, user_id, account_id) = get_test_connection();

        assert_eq!(
            create_transaction(user_id, expense(0, date!(2024 - 03 - 01), "x", account_id), &connection),
            Err(Error::InvalidAmount(Decimal::ZERO))
        );
        assert_eq!(
            create_transaction(user_id, expense(1, date!(2024 - 03 - 01), " ", account_id), &connection),
            Err(Error::EmptyField("description"))
        );
        assert_eq!(
            create_transaction(user_id, expense(1, date!(2024 - 03 - 01), "x", 999), &connection),
            Err(Error::InvalidAccount(999))
        );

        let mut data = expense(1, date!(2024 - 03 - 01), "x", account_id);
        data.category_id = Some(999);
        assert_eq!(
            create_transaction(user_id, data, &connection),
            Err(Error::InvalidCategory(999))
        );
    }

    #[test]
    fn recurring_needs_frequency_and_gets_next_occurrence() {
        let (connection, user_id, account_id) = get_test_connection();
        let mut data = expense(20, date!(2024 - 01 - 31), "Gym", account_id);
        data.is_recurring = true;

        assert_eq!(
            create_transaction(user_id, data.clone(), &connection),
            Err(Error::MissingRecurrence)
        );

        data.recurrence = Some(Frequency::Monthly);
        let transaction = create_transaction(user_id, data, &connection).unwrap();

        assert_eq!(transaction.next_occurrence, Some(date!(2024 - 02 - 29)));
    }

    #[test]
    fn next_occurrence_must_come_after_the_date() {
        let (connection, user_id, account_id) = get_test_connection();
        let mut data = expense(20, date!(2024 - 01 - 31), "Gym", account_id);
        data.is_recurring = true;
        data.recurrence = Some(Frequency::Daily);

        for next_occurrence in [date!(0001 - 01 - 01), date!(2024 - 01 - 31)] {
            data.next_occurrence = Some(next_occurrence);

            assert_eq!(
                create_transaction(user_id, data.clone(), &connection),
                Err(Error::InvalidNextOccurrence {
                    date: date!(2024 - 01 - 31),
                    next_occurrence
                })
            );
        }

        data.next_occurrence = Some(date!(2024 - 02 - 05));
        let transaction = create_transaction(user_id, data, &connection).unwrap();
        assert_eq!(transaction.next_occurrence, Some(date!(2024 - 02 - 05)));
    }

    #[test]
    fn recurring_on_the_last_date_is_rejected() {
        let (connection, user_id, account_id) = get_test_connection();
        let mut data = expense(20, date!(9999 - 12 - 31), "Gym", account_id);
        data.is_recurring = true;
        data.recurrence = Some(Frequency::Daily);

        let result = create_transaction(user_id, data, &connection);

        assert_eq!(result, Err(Error::DateOutOfRange(date!(9999 - 12 - 31))));
        let page = list_transactions(
            user_id,
            &TransactionQuery::default(),
            &PaginationConfig::default(),
            &connection,
        )
        .unwrap();
        assert_eq!(page.count, 0);
    }

    #[test]
    fn matching_rule_sets_category() {
        let (connection, user_id, account_id) = get_test_connection();
        let coffee = create_category(
            user_id,
            CategoryData {
                name: "Coffee".to_owned(),
                description: String::new(),
                color: None,
                is_active: None,
            },
            &connection,
        )
        .unwrap();
        create_rule(
            user_id,
            rule_data(RuleType::Contains, "coffee", coffee.id, 0),
            &connection,
        )
        .unwrap();

        let transaction = create_test_transaction(
            user_id,
            expense(4, date!(2024 - 03 - 01), "Coffee with Bob", account_id),
            &connection,
        );

        assert_eq!(transaction.category_id, Some(coffee.id));
    }

    #[test]
    fn list_excludes_deleted_and_filters() {
        let (connection, user_id, account_id) = get_test_connection();
        let first = create_test_transaction(
            user_id,
            expense(10, date!(2024 - 01 - 10), "Groceries", account_id),
            &connection,
        );
        let second = create_test_transaction(
            user_id,
            TransactionData::new(
                TransactionType::Income,
                Decimal::from(100),
                date!(2024 - 02 - 10),
                "Salary",
                account_id,
            ),
            &connection,
        );
        let deleted = create_test_transaction(
            user_id,
            expense(5, date!(2024 - 03 - 10), "Snacks", account_id),
            &connection,
        );
        delete_transaction(deleted.id, user_id, &connection).unwrap();

        let all = list_transactions(
            user_id,
            &TransactionQuery::default(),
            &PaginationConfig::default(),
            &connection,
        )
        .unwrap();
        assert_eq!(all.count, 2);
        assert_eq!(all.results, [second.clone(), first.clone()]);

        let expenses = list_transactions(
            user_id,
            &TransactionQuery {
                transaction_type: Some(TransactionType::Expense),
                ..Default::default()
            },
            &PaginationConfig::default(),
            &connection,
        )
        .unwrap();
        assert_eq!(expenses.results, [first.clone()]);

        let searched = list_transactions(
            user_id,
            &TransactionQuery {
                search: Some("SAL".to_owned()),
                ordering: Some("amount".to_owned()),
                ..Default::default()
            },
            &PaginationConfig::default(),
            &connection,
        )
        .unwrap();
        assert_eq!(searched.results, [second]);

        let february = list_transactions(
            user_id,
            &TransactionQuery {
                start_date: Some(date!(2024 - 02 - 01)),
                end_date: Some(date!(2024 - 02 - 29)),
                ..Default::default()
            },
            &PaginationConfig::default(),
            &connection,
        )
        .unwrap();
        assert_eq!(february.count, 1);
    }

    #[test]
    fn list_rejects_reversed_date_range() {
        let (connection, user_id, _) = get_test_connection();

        let result = list_transactions(
            user_id,
            &TransactionQuery {
                start_date: Some(date!(2024 - 02 - 01)),
                end_date: Some(date!(2024 - 01 - 01)),
                ..Default::default()
            },
            &PaginationConfig::default(),
            &connection,
        );

        assert_eq!(
            result,
            Err(Error::InvalidDateRange {
                start: date!(2024 - 02 - 01),
                end: date!(2024 - 01 - 01)
            })
        );
    }

    #[test]
    fn update_recomputes_fingerprint() {
        let (connection, user_id, account_id) = get_test_connection();
        let transaction = create_test_transaction(
            user_id,
            expense(10, date!(2024 - 01 - 10), "Groceries", account_id),
            &connection,
        );

        let updated = update_transaction(
            transaction.id,
            user_id,
            expense(15, date!(2024 - 01 - 10), "Groceries", account_id),
            &connection,
        )
        .unwrap();

        assert_eq!(updated.amount.to_string(), "15.00");
        assert_ne!(updated.fingerprint, transaction.fingerprint);
    }

    #[test]
    fn deleted_transaction_cannot_be_updated_or_deleted() {
        let (connection, user_id, account_id) = get_test_connection();
        let transaction = create_test_transaction(
            user_id,
            expense(10, date!(2024 - 01 - 10), "Groceries", account_id),
            &connection,
        );
        delete_transaction(transaction.id, user_id, &connection).unwrap();

        assert_eq!(
            get_transaction(transaction.id, user_id, &connection),
            Err(Error::NotFound)
        );
        assert_eq!(
            delete_transaction(transaction.id, user_id, &connection),
            Err(Error::DeleteMissingTransaction)
        );
        assert_eq!(
            update_transaction(
                transaction.id,
                user_id,
                expense(1, date!(2024 - 01 - 10), "x", account_id),
                &connection
            ),
            Err(Error::UpdateMissingTransaction)
        );
    }

    #[test]
    fn summary_totals_by_type() {
        let (connection, user_id, account_id) = get_test_connection();
        create_test_transaction(
            user_id,
            expense(10, date!(2024 - 01 - 10), "Groceries", account_id),
            &connection,
        );
        create_test_transaction(
            user_id,
            expense(15, date!(2024 - 02 - 10), "Fuel", account_id),
            &connection,
        );
        create_test_transaction(
            user_id,
            TransactionData::new(
                TransactionType::Income,
                Decimal::from(100),
                date!(2024 - 01 - 15),
                "Salary",
                account_id,
            ),
            &connection,
        );

        let january = get_transaction_summary(
            user_id,
            DateRangeQuery {
                start_date: Some(date!(2024 - 01 - 01)),
                end_date: Some(date!(2024 - 01 - 31)),
            },
            &connection,
        )
        .unwrap();

        assert_eq!(january.total_expenses, Decimal::from(10));
        assert_eq!(january.total_income, Decimal::from(100));
        assert_eq!(january.total_transfers, Decimal::ZERO);
        assert_eq!(january.net_income, Decimal::from(90));
        assert_eq!(january.transaction_count, 2);
    }

    #[test]
    fn summary_with_no_transactions_is_zero() {
        let (connection, user_id, _) = get_test_connection();

        let summary =
            get_transaction_summary(user_id, DateRangeQuery::default(), &connection).unwrap();

        assert_eq!(summary.total_expenses, Decimal::ZERO);
        assert_eq!(summary.transaction_count, 0);
    }
}
