//! The overview of a user's month: income and expenses, recent transactions and budgets.

mod overview;
mod page;

pub use overview::dashboard_overview_endpoint;
pub use page::get_dashboard_page;
