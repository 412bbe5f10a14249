//! Spending limits over a period, their progress and the history of closed periods.

mod api;
mod budgets_page;
mod core;
mod new_budget;
mod period;

pub use api::{
    budget_progress_endpoint, close_budget_period_endpoint, create_budget_endpoint,
    delete_budget_endpoint, delete_budget_period_endpoint, get_budget_endpoint,
    get_budget_period_endpoint, list_budget_periods_endpoint, list_budgets_endpoint,
    update_budget_endpoint, update_budget_period_endpoint,
};
pub use budgets_page::get_budgets_page;
pub use core::{
    BudgetId, BudgetUsage, create_budget, create_budget_tables, get_all_current_budgets,
    get_budget_usage, get_current_budgets,
};
pub use new_budget::{create_budget_form_endpoint, get_new_budget_page};
pub use period::close_ended_budget_periods;

pub(crate) use budgets_page::budgets_table;

#[cfg(test)]
pub(crate) use core::test_utils;
