//! The figures shown on the dashboard and the JSON endpoint that serves them.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use time::{Date, util::days_in_month};

use crate::{
    AppState, Error,
    api::ApiResult,
    auth::UserID,
    budget::{BudgetUsage, get_budget_usage, get_current_budgets},
    db,
    timezone::local_today,
    transaction::{DateRangeQuery, Transaction, get_recent_transactions, get_transaction_summary},
};

/// How many of the latest transactions the dashboard shows.
const RECENT_TRANSACTION_COUNT: u64 = 5;

/// How many current budgets the dashboard shows.
const ACTIVE_BUDGET_COUNT: u64 = 5;

/// The state needed for the dashboard page and overview endpoint.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    pub local_timezone: String,
}

impl FromRef<AppState> for DashboardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// A summary of the current month, the latest transactions and current budgets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardOverview {
    pub monthly_expenses: Decimal,
    pub monthly_income: Decimal,
    pub net_income: Decimal,
    pub recent_transactions: Vec<Transaction>,
    pub active_budgets: Vec<BudgetUsage>,
}

/// The first and last day of the month containing `date`.
pub fn month_range(date: Date) -> (Date, Date) {
    let start = date.replace_day(1).unwrap_or(date);
    let end = date
        .replace_day(days_in_month(date.month(), date.year()))
        .unwrap_or(date);

    (start, end)
}

pub fn get_dashboard_overview(
    user_id: UserID,
    today: Date,
    connection: &Connection,
) -> Result<DashboardOverview, Error> {
    let (start_date, end_date) = month_range(today);
    let summary = get_transaction_summary(
        user_id,
        DateRangeQuery {
            start_date: Some(start_date),
            end_date: Some(end_date),
        },
        connection,
    )?;

    let recent_transactions = get_recent_transactions(user_id, RECENT_TRANSACTION_COUNT, connection)?;
    let active_budgets = get_current_budgets(user_id, today, ACTIVE_BUDGET_COUNT, connection)?
        .into_iter()
        .map(|budget| get_budget_usage(budget, connection))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DashboardOverview {
        monthly_expenses: summary.total_expenses,
        monthly_income: summary.total_income,
        net_income: summary.net_income,
        recent_transactions,
        active_budgets,
    })
}

pub async fn dashboard_overview_endpoint(
    State(state): State<DashboardState>,
    Extension(user_id): Extension<UserID>,
) -> ApiResult<Json<DashboardOverview>> {
    let today = local_today(&state.local_timezone)?;
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(get_dashboard_overview(user_id, today, &connection)?))
}
