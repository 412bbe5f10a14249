use std::collections::BTreeMap;

use rusqlite::{Connection, Row, params, types::Value};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    auth::UserID,
    choice::text_enum,
    database_id::DatabaseId,
    db::SqlFilter,
    error::is_unique_violation,
    money::{DEFAULT_CURRENCY, from_cents, round_money, to_cents, validate_currency},
    pagination::{ListQuery, Page, PaginationConfig, limit_clause},
};

pub type AccountId = DatabaseId;

text_enum! {
    /// The kind of place money is held.
    pub enum AccountType ("account type") {
        Cash => "cash",
        Checking => "checking",
        Savings => "savings",
        Credit => "credit",
        Investment => "investment",
        Other => "other",
    }
}

/// The accounts every new user starts with.
pub const DEFAULT_ACCOUNTS: [(&str, AccountType); 4] = [
    ("Cash", AccountType::Cash),
    ("Checking Account", AccountType::Checking),
    ("Savings Account", AccountType::Savings),
    ("Credit Card", AccountType::Credit),
];

/// A place where a user holds money, e.g. a bank account or credit card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserID,
    pub name: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub currency: String,
    pub institution: String,
    pub notes: String,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The editable fields of an account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountData {
    pub name: String,
    pub account_type: AccountType,
    #[serde(default)]
    pub balance: Decimal,
    pub currency: Option<String>,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub notes: String,
    pub is_active: Option<bool>,
}

/// Balances across a user's active accounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub total_balance: Decimal,
    pub account_count: u64,
    pub balance_by_type: BTreeMap<AccountType, Decimal>,
}

pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            account_type TEXT NOT NULL,
            balance_cents INTEGER NOT NULL DEFAULT 0,
            currency TEXT NOT NULL,
            institution TEXT NOT NULL DEFAULT '',
            notes TEXT NOT NULL DEFAULT '',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(user_id, name),
            FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

const ACCOUNT_COLUMNS: &str = "id, user_id, name, account_type, balance_cents, currency, \
    institution, notes, is_active, created_at, updated_at";

pub fn map_account_row(row: &Row) -> Result<Account, rusqlite::Error> {
    Ok(Account {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        name: row.get(2)?,
        account_type: row.get(3)?,
        balance: from_cents(row.get(4)?),
        currency: row.get(5)?,
        institution: row.get(6)?,
        notes: row.get(7)?,
        is_active: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn map_duplicate_name(error: rusqlite::Error, name: &str) -> Error {
    if is_unique_violation(&error, "account") {
        Error::DuplicateAccountName(name.to_owned())
    } else {
        error.into()
    }
}

/// Create an account for `user_id`.
///
/// # Errors
/// Returns:
/// - [Error::EmptyField] if the name is blank,
/// - [Error::InvalidCurrency] if the currency code is malformed,
/// - [Error::DuplicateAccountName] if the user already has an account with the name.
pub fn create_account(
    user_id: UserID,
    data: AccountData,
    connection: &Connection,
) -> Result<Account, Error> {
    let name = data.name.trim().to_owned();
    if name.is_empty() {
        return Err(Error::EmptyField("name"));
    }

    let currency = validate_currency(data.currency.as_deref().unwrap_or(DEFAULT_CURRENCY))?;
    let balance = round_money(data.balance);
    let is_active = data.is_active.unwrap_or(true);
    let now = OffsetDateTime::now_utc();

    connection
        .execute(
            "INSERT INTO account
                (user_id, name, account_type, balance_cents, currency, institution, notes,
                 is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                user_id,
                name,
                data.account_type,
                to_cents(balance),
                currency,
                data.institution.trim(),
                data.notes,
                is_active,
                now
            ],
        )
        .map_err(|error| map_duplicate_name(error, &name))?;

    Ok(Account {
        id: connection.last_insert_rowid(),
        user_id,
        name,
        account_type: data.account_type,
        balance,
        currency,
        institution: data.institution.trim().to_owned(),
        notes: data.notes,
        is_active,
        created_at: now,
        updated_at: now,
    })
}

/// Create the [DEFAULT_ACCOUNTS] that `user_id` does not have yet.
///
/// Returns the number of accounts created.
pub fn create_default_accounts(user_id: UserID, connection: &Connection) -> Result<usize, Error> {
    let now = OffsetDateTime::now_utc();
    let mut created = 0;

    for (name, account_type) in DEFAULT_ACCOUNTS {
        created += connection.execute(
            "INSERT INTO account
                (user_id, name, account_type, balance_cents, currency, created_at, updated_at)
            SELECT ?1, ?2, ?3, 0, ?4, ?5, ?5
            WHERE NOT EXISTS (SELECT 1 FROM account WHERE user_id = ?1 AND name = ?2)",
            params![user_id, name, account_type, DEFAULT_CURRENCY, now],
        )?;
    }

    Ok(created)
}

/// Get one of the user's accounts.
///
/// # Errors
/// Returns [Error::NotFound] if the account does not exist or belongs to another user.
pub fn get_account(
    id: AccountId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Account, Error> {
    connection
        .prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = ?1 AND user_id = ?2"
        ))?
        .query_row(params![id, user_id], map_account_row)
        .map_err(Error::from)
}

/// Check that `account_id` is one of the user's accounts.
///
/// # Errors
/// Returns [Error::InvalidAccount] otherwise.
pub fn ensure_account_owned(
    account_id: AccountId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    match get_account(account_id, user_id, connection) {
        Ok(_) => Ok(()),
        Err(Error::NotFound) => Err(Error::InvalidAccount(account_id)),
        Err(error) => Err(error),
    }
}

/// List a page of the user's accounts.
pub fn list_accounts(
    user_id: UserID,
    query: &ListQuery,
    config: &PaginationConfig,
    connection: &Connection,
) -> Result<Page<Account>, Error> {
    let mut filter = SqlFilter::new("user_id = ?", [Value::Integer(user_id.as_i64())]);
    filter.search(&["name", "institution"], query.search_pattern());

    let (page, page_size) = query.page_and_size(config);
    let order_by = query.order_by(
        &[
            ("name", "name"),
            ("balance", "balance_cents"),
            ("created_at", "created_at"),
        ],
        "name",
    );

    let count: u64 = connection.query_row(
        &format!("SELECT COUNT(*) FROM account {}", filter.where_clause()),
        filter.params(),
        |row| row.get(0),
    )?;

    let accounts = connection
        .prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account {} {order_by} {}",
            filter.where_clause(),
            limit_clause(page, page_size)
        ))?
        .query_map(filter.params(), map_account_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(accounts, count, page, page_size))
}

/// All of the user's active accounts by name, for select inputs.
pub fn get_active_accounts(user_id: UserID, connection: &Connection) -> Result<Vec<Account>, Error> {
    connection
        .prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account
            WHERE user_id = ?1 AND is_active = 1 ORDER BY name, id"
        ))?
        .query_map([user_id], map_account_row)?
        .map(|account| account.map_err(Error::from))
        .collect()
}

/// Replace the editable fields of an account.
///
/// # Errors
/// Returns [Error::UpdateMissingAccount] if the account does not belong to the user.
pub fn update_account(
    id: AccountId,
    user_id: UserID,
    data: AccountData,
    connection: &Connection,
) -> Result<Account, Error> {
    let existing = match get_account(id, user_id, connection) {
        Ok(account) => account,
        Err(Error::NotFound) => return Err(Error::UpdateMissingAccount),
        Err(error) => return Err(error),
    };

    let name = data.name.trim().to_owned();
    if name.is_empty() {
        return Err(Error::EmptyField("name"));
    }

    let currency = match data.currency.as_deref() {
        Some(currency) => validate_currency(currency)?,
        None => existing.currency.clone(),
    };
    let balance = round_money(data.balance);
    let is_active = data.is_active.unwrap_or(existing.is_active);
    let updated_at = OffsetDateTime::now_utc();

    connection
        .execute(
            "UPDATE account
            SET name = ?1, account_type = ?2, balance_cents = ?3, currency = ?4,
                institution = ?5, notes = ?6, is_active = ?7, updated_at = ?8
            WHERE id = ?9 AND user_id = ?10",
            params![
                name,
                data.account_type,
                to_cents(balance),
                currency,
                data.institution.trim(),
                data.notes,
                is_active,
                updated_at,
                id,
                user_id
            ],
        )
        .map_err(|error| map_duplicate_name(error, &name))?;

    Ok(Account {
        name,
        account_type: data.account_type,
        balance,
        currency,
        institution: data.institution.trim().to_owned(),
        notes: data.notes,
        is_active,
        updated_at,
        ..existing
    })
}

/// Set the balance of an account.
///
/// # Errors
/// Returns [Error::UpdateMissingAccount] if the account does not belong to the user.
pub fn update_balance(
    id: AccountId,
    user_id: UserID,
    balance: Decimal,
    connection: &Connection,
) -> Result<Account, Error> {
    let rows_affected = connection.execute(
        "UPDATE account SET balance_cents = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
        params![
            to_cents(balance),
            OffsetDateTime::now_utc(),
            id,
            user_id
        ],
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingAccount);
    }

    get_account(id, user_id, connection)
}

/// Delete an account along with its transactions.
///
/// # Errors
/// Returns [Error::DeleteMissingAccount] if the account does not belong to the user.
pub fn delete_account(id: AccountId, user_id: UserID, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM account WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingAccount);
    }

    Ok(())
}

/// Total the balances of the user's active accounts.
pub fn get_account_summary(user_id: UserID, connection: &Connection) -> Result<AccountSummary, Error> {
    let mut statement = connection.prepare(
        "SELECT account_type, COUNT(*), COALESCE(SUM(balance_cents), 0)
        FROM account WHERE user_id = ?1 AND is_active = 1
        GROUP BY account_type",
    )?;
    let rows = statement
        .query_map([user_id], |row| {
            Ok((
                row.get::<_, AccountType>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut summary = AccountSummary {
        total_balance: from_cents(0),
        account_count: 0,
        balance_by_type: BTreeMap::new(),
    };

    for (account_type, count, balance_cents) in rows {
        summary.total_balance += from_cents(balance_cents);
        summary.account_count += count;
        summary
            .balance_by_type
            .insert(account_type, from_cents(balance_cents));
    }

    Ok(summary)
}
