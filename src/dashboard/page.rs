//! The dashboard page.

use axum::{
    Extension,
    extract::State,
    response::{IntoResponse, Response},
};
use maud::{Markup, html};
use rust_decimal::Decimal;

use crate::{
    Error,
    auth::UserID,
    budget::budgets_table,
    dashboard::overview::{DashboardOverview, DashboardState, get_dashboard_overview},
    db, endpoints,
    html::{LINK_STYLE, PAGE_CONTAINER_STYLE, base, format_currency},
    navigation::NavBar,
    timezone::local_today,
    transaction::{NameLookup, transactions_table},
};

fn summary_card(title: &str, amount: Decimal) -> Markup {
    let colour = if amount.is_sign_negative() {
        "text-red-600 dark:text-red-400"
    } else {
        "text-gray-900 dark:text-white"
    };

    html! {
        div class="p-4 bg-white rounded-lg shadow dark:bg-gray-800"
        {
            h3 class="text-sm text-gray-500 dark:text-gray-400" { (title) }
            p class={ "text-2xl font-semibold " (colour) } { (format_currency(amount)) }
        }
    }
}

fn dashboard_view(overview: &DashboardOverview, names: &NameLookup) -> Markup {
    let nav_bar = NavBar::new(endpoints::DASHBOARD_VIEW).into_html();

    let content = html! {
        (nav_bar)

        div class=(PAGE_CONTAINER_STYLE)
        {
            div class="w-full max-w-screen-lg space-y-8"
            {
                section class="grid grid-cols-1 gap-4 sm:grid-cols-3"
                {
                    (summary_card("Income this month", overview.monthly_income))
                    (summary_card("Expenses this month", overview.monthly_expenses))
                    (summary_card("Net income", overview.net_income))
                }

                section class="overflow-x-auto shadow-md sm:rounded-lg"
                {
                    div class="flex justify-between items-center p-4"
                    {
                        h2 class="text-xl font-bold" { "Recent transactions" }
                        a href=(endpoints::TRANSACTIONS_VIEW) class=(LINK_STYLE) { "View all" }
                    }

                    @if overview.recent_transactions.is_empty() {
                        p class="p-4"
                        {
                            "Nothing here yet, "
                            a href=(endpoints::NEW_EXPENSE_VIEW) class=(LINK_STYLE) { "record an expense" }
                            " to get started."
                        }
                    } @else {
                        (transactions_table(&overview.recent_transactions, names))
                    }
                }

                section class="overflow-x-auto shadow-md sm:rounded-lg"
                {
                    div class="flex justify-between items-center p-4"
                    {
                        h2 class="text-xl font-bold" { "Budgets" }
                        a href=(endpoints::BUDGETS_VIEW) class=(LINK_STYLE) { "View all" }
                    }

                    @if overview.active_budgets.is_empty() {
                        p class="p-4" { "No budgets for this month." }
                    } @else {
                        (budgets_table(&overview.active_budgets))
                    }
                }
            }
        }
    };

    base("Dashboard", &content)
}

/// Display a page with an overview of the user's month.
pub async fn get_dashboard_page(
    State(state): State<DashboardState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Response, Error> {
    let today = local_today(&state.local_timezone)?;
    let connection = db::lock(&state.db_connection)?;

    let overview = get_dashboard_overview(user_id, today, &connection)
        .inspect_err(|error| tracing::error!("could not build dashboard overview: {error}"))?;
    let names = NameLookup::load(user_id, &connection)?;

    Ok(dashboard_view(&overview, &names).into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Extension, extract::State};

    use crate::{
        dashboard::overview::DashboardState,
        test_utils::{assert_status_ok, assert_valid_html, parse_html_document},
        timezone::local_today,
        transaction::test_utils::{create_test_transaction, expense, get_test_connection},
    };

    use super::get_dashboard_page;

    #[tokio::test]
    async fn shows_month_totals_and_recent_transactions() {
        let (connection, user_id, account_id) = get_test_connection();
        let today = local_today("Etc/UTC").unwrap();
        create_test_transaction(user_id, expense(25, today, "Lunch", account_id), &connection);
        let state = DashboardState {
            db_connection: Arc::new(Mutex::new(connection)),
            local_timezone: "Etc/UTC".to_owned(),
        };

        let response = get_dashboard_page(State(state), Extension(user_id))
            .await
            .unwrap();

        assert_status_ok(&response);
        let document = parse_html_document(response).await;
        assert_valid_html(&document);
        let text = document.root_element().text().collect::<String>();
        assert!(text.contains("Expenses this month"));
        assert!(text.contains("$25.00"));
        assert!(text.contains("Lunch"));
        assert!(text.contains("No budgets for this month."));
    }

    #[tokio::test]
    async fn empty_dashboard_prompts_for_expense() {
        let (connection, user_id, _) = get_test_connection();
        let state = DashboardState {
            db_connection: Arc::new(Mutex::new(connection)),
            local_timezone: "Etc/UTC".to_owned(),
        };

        let response = get_dashboard_page(State(state), Extension(user_id))
            .await
            .unwrap();

        let document = parse_html_document(response).await;
        let text = document.root_element().text().collect::<String>();
        assert!(text.contains("record an expense"));
    }
}
