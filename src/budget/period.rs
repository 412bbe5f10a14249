//! Snapshots of finished budget periods and moving budgets on to their next period.

use rusqlite::{Connection, Row, params, types::Value};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    auth::UserID,
    budget::core::{Budget, BudgetId, Period, get_budget, get_budget_usage, get_ended_budgets},
    database_id::DatabaseId,
    db::SqlFilter,
    money::{from_cents, to_cents},
    pagination::{ListQuery, Page, PaginationConfig, limit_clause},
};

pub type BudgetPeriodId = DatabaseId;

/// The amounts of a budget for one of its closed periods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetPeriod {
    pub id: BudgetPeriodId,
    pub budget_id: BudgetId,
    pub start_date: Date,
    pub end_date: Date,
    pub amount: Decimal,
    pub spent_amount: Decimal,
    /// The amount carried over into the next period.
    pub rollover_amount: Decimal,
    pub notes: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetPeriodNotes {
    pub notes: String,
}

const BUDGET_PERIOD_COLUMNS: &str = "p.id, p.budget_id, p.start_date, p.end_date, p.amount_cents, \
    p.spent_amount_cents, p.rollover_amount_cents, p.notes, p.created_at";

fn map_budget_period_row(row: &Row) -> Result<BudgetPeriod, rusqlite::Error> {
    Ok(BudgetPeriod {
        id: row.get(0)?,
        budget_id: row.get(1)?,
        start_date: row.get(2)?,
        end_date: row.get(3)?,
        amount: from_cents(row.get(4)?),
        spent_amount: from_cents(row.get(5)?),
        rollover_amount: from_cents(row.get(6)?),
        notes: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Record the current period of `budget` and move the budget on to the next period.
fn advance_budget(budget: Budget, connection: &Connection) -> Result<Budget, Error> {
    let start_date = budget
        .end_date
        .next_day()
        .ok_or(Error::DateOutOfRange(budget.end_date))?;
    let Some(end_date) = budget.period.end_date(start_date)? else {
        return Err(Error::CustomBudgetPeriod);
    };

    let user_id = budget.user_id;
    let budget_id = budget.id;
    let usage = get_budget_usage(budget, connection)?;
    let rollover_amount = if usage.budget.rollover {
        usage.remaining_amount.max(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };
    let now = OffsetDateTime::now_utc();

    let sql_transaction = connection.unchecked_transaction()?;
    sql_transaction.execute(
        "INSERT INTO budget_period
            (budget_id, start_date, end_date, amount_cents, spent_amount_cents,
             rollover_amount_cents, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            budget_id,
            usage.budget.start_date,
            usage.budget.end_date,
            to_cents(usage.budget.effective_amount()),
            to_cents(usage.spent_amount),
            to_cents(rollover_amount),
            now
        ],
    )?;
    sql_transaction.execute(
        "UPDATE budget
        SET start_date = ?1, end_date = ?2, rollover_amount_cents = ?3, updated_at = ?4
        WHERE id = ?5",
        params![start_date, end_date, to_cents(rollover_amount), now, budget_id],
    )?;
    sql_transaction.commit()?;

    get_budget(budget_id, user_id, connection)
}

/// Close the current period of one of the user's budgets and start the next one.
///
/// The unspent amount is carried over to the next period if the budget has rollover
/// enabled, overspending is never carried over.
///
/// # Errors
/// Returns [Error::NotFound] if the budget does not belong to the user, or
/// [Error::CustomBudgetPeriod] for custom budgets.
pub fn close_budget_period(
    id: BudgetId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Budget, Error> {
    let budget = get_budget(id, user_id, connection)?;

    if budget.period == Period::Custom {
        return Err(Error::CustomBudgetPeriod);
    }

    advance_budget(budget, connection)
}

/// Close the period of every active, non-custom budget that ended before `today`.
///
/// A budget that has missed several periods is advanced one period per call.
///
/// A budget that cannot be advanced is logged and skipped so the others still close.
///
/// Returns the number of periods closed.
pub fn close_ended_budget_periods(today: Date, connection: &Connection) -> Result<usize, Error> {
    let budgets = get_ended_budgets(today, connection)?;
    let mut closed_count = 0;

    for budget in budgets {
        let budget_id = budget.id;
        match advance_budget(budget, connection) {
            Ok(budget) => {
                closed_count += 1;
                tracing::debug!(
                    "closed period of budget {budget_id}, next period {} to {}",
                    budget.start_date,
                    budget.end_date
                );
            }
            Err(error) => {
                tracing::error!("could not close the period of budget {budget_id}: {error}");
            }
        }
    }

    Ok(closed_count)
}

fn user_filter(user_id: UserID) -> SqlFilter {
    SqlFilter::new(
        "p.budget_id IN (SELECT id FROM budget WHERE user_id = ?)",
        [Value::Integer(user_id.as_i64())],
    )
}

/// List a page of the closed periods of the user's budgets.
pub fn list_budget_periods(
    user_id: UserID,
    query: &ListQuery,
    config: &PaginationConfig,
    connection: &Connection,
) -> Result<Page<BudgetPeriod>, Error> {
    let mut filter = user_filter(user_id);
    filter.search(&["p.notes"], query.search_pattern());

    let (page, page_size) = query.page_and_size(config);
    let order_by = query.order_by(
        &[
            ("start_date", "p.start_date"),
            ("end_date", "p.end_date"),
            ("created_at", "p.created_at"),
        ],
        "-start_date",
    );

    let count: u64 = connection.query_row(
        &format!(
            "SELECT COUNT(*) FROM budget_period p {}",
            filter.where_clause()
        ),
        filter.params(),
        |row| row.get(0),
    )?;

    let periods = connection
        .prepare(&format!(
            "SELECT {BUDGET_PERIOD_COLUMNS} FROM budget_period p {} {order_by} {}",
            filter.where_clause(),
            limit_clause(page, page_size)
        ))?
        .query_map(filter.params(), map_budget_period_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(periods, count, page, page_size))
}

/// Get a closed period of one of the user's budgets.
///
/// # Errors
/// Returns [Error::NotFound] if the period does not exist or belongs to another user.
pub fn get_budget_period(
    id: BudgetPeriodId,
    user_id: UserID,
    connection: &Connection,
) -> Result<BudgetPeriod, Error> {
    let mut filter = user_filter(user_id);
    filter.and("p.id = ?", [Value::Integer(id)]);

    connection
        .prepare(&format!(
            "SELECT {BUDGET_PERIOD_COLUMNS} FROM budget_period p {}",
            filter.where_clause()
        ))?
        .query_row(filter.params(), map_budget_period_row)
        .map_err(Error::from)
}

/// Replace the notes of a closed budget period.
///
/// # Errors
/// Returns [Error::UpdateMissingBudgetPeriod] if the period does not belong to the user.
pub fn update_budget_period_notes(
    id: BudgetPeriodId,
    user_id: UserID,
    notes: &str,
    connection: &Connection,
) -> Result<BudgetPeriod, Error> {
    let rows_affected = connection.execute(
        "UPDATE budget_period SET notes = ?1
        WHERE id = ?2 AND budget_id IN (SELECT id FROM budget WHERE user_id = ?3)",
        params![notes.trim(), id, user_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingBudgetPeriod);
    }

    get_budget_period(id, user_id, connection)
}

/// # Errors
/// Returns [Error::DeleteMissingBudgetPeriod] if the period does not belong to the user.
pub fn delete_budget_period(
    id: BudgetPeriodId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM budget_period
        WHERE id = ?1 AND budget_id IN (SELECT id FROM budget WHERE user_id = ?2)",
        params![id, user_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingBudgetPeriod);
    }

    Ok(())
}
