use rusqlite::{Connection, Row, params, types::Value};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime};

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
    recurrence::add_months,
};

pub type BudgetId = DatabaseId;

text_enum! {
    /// How long each period of a budget lasts.
    pub enum Period ("budget period") {
        Weekly => "weekly",
        Monthly => "monthly",
        Quarterly => "quarterly",
        Yearly => "yearly",
        /// A one-off budget with user chosen dates that is never rolled over.
        Custom => "custom",
    }
}

impl Period {
    /// The last day of the period starting on `start`, or `None` for custom budgets.
    ///
    /// # Errors
    /// Returns [Error::DateOutOfRange] if the period would end past the last representable date.
    pub fn end_date(&self, start: Date) -> Result<Option<Date>, Error> {
        let next_start = match self {
            Period::Weekly => start.checked_add(Duration::weeks(1)),
            Period::Monthly => add_months(start, 1),
            Period::Quarterly => add_months(start, 3),
            Period::Yearly => add_months(start, 12),
            Period::Custom => return Ok(None),
        };

        next_start
            .and_then(Date::previous_day)
            .map(Some)
            .ok_or(Error::DateOutOfRange(start))
    }
}

/// A spending limit for a date range, optionally for one category or a set of accounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Budget {
    pub id: BudgetId,
    pub user_id: UserID,
    pub name: String,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    pub period: Period,
    pub start_date: Date,
    pub end_date: Date,
    pub category_id: Option<CategoryId>,
    /// Only expenses from these accounts count. Empty means every account.
    pub account_ids: Vec<AccountId>,
    pub is_active: bool,
    /// Whether the unspent amount carries over when the period is closed.
    pub rollover: bool,
    /// The amount carried over from the previous period.
    pub rollover_amount: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Budget {
    /// The amount that can be spent this period, including any rollover.
    pub fn effective_amount(&self) -> Decimal {
        self.amount + self.rollover_amount
    }
}

/// A budget together with how much of it has been spent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetUsage {
    #[serde(flatten)]
    pub budget: Budget,
    pub spent_amount: Decimal,
    /// Negative when the budget has been overspent.
    pub remaining_amount: Decimal,
    /// Spent as a percentage of the effective amount, between 0 and 100.
    pub usage_percentage: Decimal,
}

impl BudgetUsage {
    pub fn new(budget: Budget, spent_amount: Decimal) -> Self {
        let effective_amount = budget.effective_amount();
        let usage_percentage = if effective_amount <= Decimal::ZERO {
            Decimal::ZERO
        } else {
            (spent_amount / effective_amount * Decimal::ONE_HUNDRED)
                .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
        };

        Self {
            remaining_amount: effective_amount - spent_amount,
            usage_percentage: round_money(usage_percentage),
            spent_amount,
            budget,
        }
    }
}

/// The usage of a budget and the days left until it ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetProgress {
    pub budget: BudgetUsage,
    pub spent_amount: Decimal,
    pub remaining_amount: Decimal,
    pub usage_percentage: Decimal,
    /// Negative once the budget has ended.
    pub days_remaining: i64,
}

/// The editable fields of a budget.
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetData {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub period: Period,
    pub start_date: Date,
    /// Defaults to the end of the first period. Required for custom budgets.
    pub end_date: Option<Date>,
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub account_ids: Vec<AccountId>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub rollover: bool,
    pub rollover_amount: Option<Decimal>,
}

pub fn create_budget_tables(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS budget (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            currency TEXT NOT NULL,
            period TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            category_id INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            rollover INTEGER NOT NULL DEFAULT 0,
            rollover_amount_cents INTEGER NOT NULL DEFAULT 0 CHECK (rollover_amount_cents >= 0),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE,
            FOREIGN KEY(category_id) REFERENCES category(id) ON DELETE SET NULL,
            CHECK (end_date >= start_date)
        )",
        (),
    )?;

    connection.execute(
        "CREATE TABLE IF NOT EXISTS budget_account (
            budget_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            PRIMARY KEY(budget_id, account_id),
            FOREIGN KEY(budget_id) REFERENCES budget(id) ON DELETE CASCADE,
            FOREIGN KEY(account_id) REFERENCES account(id) ON DELETE CASCADE
        )",
        (),
    )?;

    connection.execute(
        "CREATE TABLE IF NOT EXISTS budget_period (
            id INTEGER PRIMARY KEY,
            budget_id INTEGER NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            spent_amount_cents INTEGER NOT NULL,
            rollover_amount_cents INTEGER NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            FOREIGN KEY(budget_id) REFERENCES budget(id) ON DELETE CASCADE
        )",
        (),
    )?;

    // Alerts are sent at most once per level for each period of a budget.
    connection.execute(
        "CREATE TABLE IF NOT EXISTS budget_alert (
            budget_id INTEGER NOT NULL,
            period_start TEXT NOT NULL,
            level TEXT NOT NULL,
            sent_at TEXT NOT NULL,
            PRIMARY KEY(budget_id, period_start, level),
            FOREIGN KEY(budget_id) REFERENCES budget(id) ON DELETE CASCADE
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_budget_user_dates ON budget(user_id, start_date, end_date)",
        (),
    )?;

    Ok(())
}

const BUDGET_COLUMNS: &str = "id, user_id, name, description, amount_cents, currency, period, \
    start_date, end_date, category_id, is_active, rollover, rollover_amount_cents, created_at, \
    updated_at";

/// Map a row of [BUDGET_COLUMNS] to a budget without its accounts.
fn map_budget_row(row: &Row) -> Result<Budget, rusqlite::Error> {
    Ok(Budget {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        amount: from_cents(row.get(4)?),
        currency: row.get(5)?,
        period: row.get(6)?,
        start_date: row.get(7)?,
        end_date: row.get(8)?,
        category_id: row.get(9)?,
        account_ids: Vec::new(),
        is_active: row.get(10)?,
        rollover: row.get(11)?,
        rollover_amount: from_cents(row.get(12)?),
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn get_budget_accounts(budget_id: BudgetId, connection: &Connection) -> Result<Vec<AccountId>, Error> {
    connection
        .prepare("SELECT account_id FROM budget_account WHERE budget_id = ?1 ORDER BY account_id")?
        .query_map([budget_id], |row| row.get(0))?
        .map(|account_id| account_id.map_err(Error::from))
        .collect()
}

fn set_budget_accounts(
    budget_id: BudgetId,
    account_ids: &[AccountId],
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute("DELETE FROM budget_account WHERE budget_id = ?1", [budget_id])?;

    let mut statement =
        connection.prepare("INSERT INTO budget_account (budget_id, account_id) VALUES (?1, ?2)")?;
    for account_id in account_ids {
        statement.execute(params![budget_id, account_id])?;
    }

    Ok(())
}

fn with_accounts(mut budgets: Vec<Budget>, connection: &Connection) -> Result<Vec<Budget>, Error> {
    for budget in &mut budgets {
        budget.account_ids = get_budget_accounts(budget.id, connection)?;
    }

    Ok(budgets)
}

/// The checked fields of a budget, ready to be stored.
struct ValidBudget {
    name: String,
    description: String,
    amount: Decimal,
    currency: String,
    period: Period,
    start_date: Date,
    end_date: Date,
    category_id: Option<CategoryId>,
    account_ids: Vec<AccountId>,
    rollover: bool,
    rollover_amount: Decimal,
}

fn validate_budget(
    user_id: UserID,
    data: BudgetData,
    connection: &Connection,
) -> Result<ValidBudget, Error> {
    let name = data.name.trim();
    if name.is_empty() {
        return Err(Error::EmptyField("name"));
    }

    let amount = validate_positive_amount(data.amount)?;
    let currency = match data.currency.as_deref() {
        Some(currency) => validate_currency(currency)?,
        None => DEFAULT_CURRENCY.to_owned(),
    };

    let end_date = match data.end_date {
        Some(end_date) => end_date,
        None => data
            .period
            .end_date(data.start_date)?
            .ok_or(Error::EmptyField("end_date"))?,
    };
    if end_date < data.start_date {
        return Err(Error::InvalidDateRange {
            start: data.start_date,
            end: end_date,
        });
    }

    let rollover_amount = round_money(data.rollover_amount.unwrap_or(Decimal::ZERO));
    if rollover_amount < Decimal::ZERO {
        return Err(Error::InvalidAmount(rollover_amount));
    }

    if let Some(category_id) = data.category_id {
        ensure_category_visible(category_id, user_id, connection)?;
    }

    let mut account_ids = data.account_ids;
    account_ids.sort_unstable();
    account_ids.dedup();
    for &account_id in &account_ids {
        ensure_account_owned(account_id, user_id, connection)?;
    }

    Ok(ValidBudget {
        name: name.to_owned(),
        description: data.description.trim().to_owned(),
        amount,
        currency,
        period: data.period,
        start_date: data.start_date,
        end_date,
        category_id: data.category_id,
        account_ids,
        rollover: data.rollover,
        rollover_amount,
    })
}

/// Create a budget for `user_id`.
///
/// The end date defaults to the end of the first period starting on the start date.
///
/// # Errors
/// Returns a validation error if:
/// - the name is blank or the amount is not positive,
/// - a custom budget has no end date, or the end date is before the start date,
/// - the category is not visible to the user or an account is not theirs.
pub fn create_budget(
    user_id: UserID,
    data: BudgetData,
    connection: &Connection,
) -> Result<Budget, Error> {
    let is_active = data.is_active.unwrap_or(true);
    let budget = validate_budget(user_id, data, connection)?;
    let now = OffsetDateTime::now_utc();
    let sql_transaction = connection.unchecked_transaction()?;

    let id = sql_transaction.query_row(
        "INSERT INTO budget
            (user_id, name, description, amount_cents, currency, period, start_date, end_date,
             category_id, is_active, rollover, rollover_amount_cents, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
        RETURNING id",
        params![
            user_id,
            budget.name,
            budget.description,
            to_cents(budget.amount),
            budget.currency,
            budget.period,
            budget.start_date,
            budget.end_date,
            budget.category_id,
            is_active,
            budget.rollover,
            to_cents(budget.rollover_amount),
            now
        ],
        |row| row.get(0),
    )?;
    set_budget_accounts(id, &budget.account_ids, &sql_transaction)?;
    sql_transaction.commit()?;

    Ok(Budget {
        id,
        user_id,
        name: budget.name,
        description: budget.description,
        amount: budget.amount,
        currency: budget.currency,
        period: budget.period,
        start_date: budget.start_date,
        end_date: budget.end_date,
        category_id: budget.category_id,
        account_ids: budget.account_ids,
        is_active,
        rollover: budget.rollover,
        rollover_amount: budget.rollover_amount,
        created_at: now,
        updated_at: now,
    })
}

/// Get one of the user's budgets.
///
/// # Errors
/// Returns [Error::NotFound] if the budget does not exist or belongs to another user.
pub fn get_budget(id: BudgetId, user_id: UserID, connection: &Connection) -> Result<Budget, Error> {
    let mut budget = connection
        .prepare(&format!(
            "SELECT {BUDGET_COLUMNS} FROM budget WHERE id = ?1 AND user_id = ?2"
        ))?
        .query_row(params![id, user_id], map_budget_row)?;
    budget.account_ids = get_budget_accounts(id, connection)?;

    Ok(budget)
}

/// List a page of the user's budgets.
pub fn list_budgets(
    user_id: UserID,
    query: &ListQuery,
    config: &PaginationConfig,
    connection: &Connection,
) -> Result<Page<Budget>, Error> {
    let mut filter = SqlFilter::new("user_id = ?", [Value::Integer(user_id.as_i64())]);
    filter.search(&["name", "description"], query.search_pattern());

    let (page, page_size) = query.page_and_size(config);
    let order_by = query.order_by(
        &[
            ("name", "name"),
            ("amount", "amount_cents"),
            ("created_at", "created_at"),
        ],
        "name",
    );

    let count: u64 = connection.query_row(
        &format!("SELECT COUNT(*) FROM budget {}", filter.where_clause()),
        filter.params(),
        |row| row.get(0),
    )?;

    let budgets = connection
        .prepare(&format!(
            "SELECT {BUDGET_COLUMNS} FROM budget {} {order_by} {}",
            filter.where_clause(),
            limit_clause(page, page_size)
        ))?
        .query_map(filter.params(), map_budget_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(
        with_accounts(budgets, connection)?,
        count,
        page,
        page_size,
    ))
}

/// Up to `limit` of the user's active budgets whose dates include `today`, ending soonest first.
pub fn get_current_budgets(
    user_id: UserID,
    today: Date,
    limit: u64,
    connection: &Connection,
) -> Result<Vec<Budget>, Error> {
    let budgets = connection
        .prepare(&format!(
            "SELECT {BUDGET_COLUMNS} FROM budget
            WHERE user_id = ?1 AND is_active = 1 AND start_date <= ?2 AND end_date >= ?2
            ORDER BY end_date ASC, id ASC
            LIMIT ?3"
        ))?
        .query_map(params![user_id, today, limit], map_budget_row)?
        .collect::<Result<Vec<_>, _>>()?;

    with_accounts(budgets, connection)
}

/// The active budgets of every user whose dates include `today`.
pub fn get_all_current_budgets(today: Date, connection: &Connection) -> Result<Vec<Budget>, Error> {
    let budgets = connection
        .prepare(&format!(
            "SELECT {BUDGET_COLUMNS} FROM budget
            WHERE is_active = 1 AND start_date <= ?1 AND end_date >= ?1
            ORDER BY id"
        ))?
        .query_map([today], map_budget_row)?
        .collect::<Result<Vec<_>, _>>()?;

    with_accounts(budgets, connection)
}

/// The active, non-custom budgets of every user that ended before `today`.
pub fn get_ended_budgets(today: Date, connection: &Connection) -> Result<Vec<Budget>, Error> {
    let budgets = connection
        .prepare(&format!(
            "SELECT {BUDGET_COLUMNS} FROM budget
            WHERE is_active = 1 AND period != ?1 AND end_date < ?2
            ORDER BY id"
        ))?
        .query_map(params![Period::Custom, today], map_budget_row)?
        .collect::<Result<Vec<_>, _>>()?;

    with_accounts(budgets, connection)
}

/// Replace the editable fields of a budget.
///
/// # Errors
/// Returns [Error::UpdateMissingBudget] if the budget does not belong to the user, or a
/// validation error as for [create_budget].
pub fn update_budget(
    id: BudgetId,
    user_id: UserID,
    data: BudgetData,
    connection: &Connection,
) -> Result<Budget, Error> {
    let existing = match get_budget(id, user_id, connection) {
        Ok(budget) => budget,
        Err(Error::NotFound) => return Err(Error::UpdateMissingBudget),
        Err(error) => return Err(error),
    };

    let is_active = data.is_active.unwrap_or(existing.is_active);
    let budget = validate_budget(user_id, data, connection)?;
    let sql_transaction = connection.unchecked_transaction()?;

    sql_transaction.execute(
        "UPDATE budget
        SET name = ?1, description = ?2, amount_cents = ?3, currency = ?4, period = ?5,
            start_date = ?6, end_date = ?7, category_id = ?8, is_active = ?9, rollover = ?10,
            rollover_amount_cents = ?11, updated_at = ?12
        WHERE id = ?13 AND user_id = ?14",
        params![
            budget.name,
            budget.description,
            to_cents(budget.amount),
            budget.currency,
            budget.period,
            budget.start_date,
            budget.end_date,
            budget.category_id,
            is_active,
            budget.rollover,
            to_cents(budget.rollover_amount),
            OffsetDateTime::now_utc(),
            id,
            user_id
        ],
    )?;
    set_budget_accounts(id, &budget.account_ids, &sql_transaction)?;
    sql_transaction.commit()?;

    get_budget(id, user_id, connection)
}

/// Delete a budget along with its closed periods.
///
/// # Errors
/// Returns [Error::DeleteMissingBudget] if the budget does not belong to the user.
pub fn delete_budget(id: BudgetId, user_id: UserID, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM budget WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingBudget);
    }

    Ok(())
}

/// The total of the budget owner's expenses that count towards `budget`.
///
/// Expenses count when they are dated within the budget's dates and, if set, are in the
/// budget's category and one of its accounts.
pub fn get_spent_amount(budget: &Budget, connection: &Connection) -> Result<Decimal, Error> {
    let mut filter = SqlFilter::new(
        "user_id = ? AND transaction_type = 'expense' AND is_deleted = 0",
        [Value::Integer(budget.user_id.as_i64())],
    );
    filter.and(
        "date BETWEEN ? AND ?",
        [
            Value::Text(budget.start_date.to_string()),
            Value::Text(budget.end_date.to_string()),
        ],
    );

    if let Some(category_id) = budget.category_id {
        filter.and("category_id = ?", [Value::Integer(category_id)]);
    }

    if !budget.account_ids.is_empty() {
        filter.and(
            "account_id IN (SELECT account_id FROM budget_account WHERE budget_id = ?)",
            [Value::Integer(budget.id)],
        );
    }

    let cents: i64 = connection.query_row(
        &format!(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM \"transaction\" {}",
            filter.where_clause()
        ),
        filter.params(),
        |row| row.get(0),
    )?;

    Ok(from_cents(cents))
}

/// Attach the spent, remaining and usage amounts to `budget`.
pub fn get_budget_usage(budget: Budget, connection: &Connection) -> Result<BudgetUsage, Error> {
    let spent_amount = get_spent_amount(&budget, connection)?;

    Ok(BudgetUsage::new(budget, spent_amount))
}

/// The usage of one of the user's budgets as of `today`.
///
/// # Errors
/// Returns [Error::NotFound] if the budget does not exist or belongs to another user.
pub fn get_budget_progress(
    id: BudgetId,
    user_id: UserID,
    today: Date,
    connection: &Connection,
) -> Result<BudgetProgress, Error> {
    let budget = get_budget(id, user_id, connection)?;
    let days_remaining = (budget.end_date - today).whole_days();
    let usage = get_budget_usage(budget, connection)?;

    Ok(BudgetProgress {
        spent_amount: usage.spent_amount,
        remaining_amount: usage.remaining_amount,
        usage_percentage: usage.usage_percentage,
        days_remaining,
        budget: usage,
    })
}
