//! The page that lists a user's budgets with how much of each has been spent.

use std::sync::{Arc, Mutex};

use axum::{
    Extension,
    extract::{FromRef, Query, State},
    response::{IntoResponse, Response},
};
use maud::{Markup, html};
use rusqlite::Connection;

use crate::{
    AppState,
    auth::UserID,
    budget::core::{BudgetUsage, get_budget_usage, list_budgets},
    db, endpoints,
    html::{
        LINK_STYLE, PAGE_CONTAINER_STYLE, TABLE_CELL_STYLE, TABLE_HEADER_STYLE, TABLE_ROW_STYLE,
        base, format_currency, progress_bar,
    },
    navigation::NavBar,
    pagination::{ListQuery, PaginationConfig, create_pagination_indicators, pagination_view},
};

/// The state needed for the budgets page.
#[derive(Debug, Clone)]
pub struct BudgetsPageState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for BudgetsPageState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

/// A row for each budget with its spending as a progress bar.
pub(crate) fn budgets_table(budgets: &[BudgetUsage]) -> Markup {
    html! {
        table class="w-full text-sm text-left rtl:text-right text-gray-500 dark:text-gray-400"
        {
            thead class=(TABLE_HEADER_STYLE)
            {
                tr
                {
                    th scope="col" class=(TABLE_CELL_STYLE) { "Budget" }
                    th scope="col" class=(TABLE_CELL_STYLE) { "Dates" }
                    th scope="col" class={ (TABLE_CELL_STYLE) " text-right" } { "Spent" }
                    th scope="col" class={ (TABLE_CELL_STYLE) " text-right" } { "Remaining" }
                    th scope="col" class=(TABLE_CELL_STYLE) { "Progress" }
                }
            }

            tbody
            {
                @for usage in budgets {
                    @let budget = &usage.budget;

                    tr class=(TABLE_ROW_STYLE)
                    {
                        td class=(TABLE_CELL_STYLE)
                        {
                            (budget.name)
                            span class="block text-xs text-gray-400" { (budget.period) }
                        }
                        td class=(TABLE_CELL_STYLE) { (budget.start_date) " to " (budget.end_date) }
                        td class={ (TABLE_CELL_STYLE) " text-right" }
                        {
                            (format_currency(usage.spent_amount))
                            " of "
                            (format_currency(budget.effective_amount()))
                        }
                        td class={ (TABLE_CELL_STYLE) " text-right" }
                        {
                            (format_currency(usage.remaining_amount))
                        }
                        td class={ (TABLE_CELL_STYLE) " min-w-32" }
                        {
                            (progress_bar(usage.usage_percentage))
                            span class="text-xs" { (usage.usage_percentage) "%" }
                        }
                    }
                }
            }
        }
    }
}

/// Render a page of the user's budgets.
pub async fn get_budgets_page(
    State(state): State<BudgetsPageState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<ListQuery>,
) -> Response {
    let page = {
        let connection = match db::lock(&state.db_connection) {
            Ok(connection) => connection,
            Err(error) => return error.into_response(),
        };

        match list_budgets(user_id, &query, &state.pagination_config, &connection)
            .and_then(|page| page.try_map(|budget| get_budget_usage(budget, &connection)))
        {
            Ok(page) => page,
            Err(error) => return error.into_response(),
        }
    };

    let (current_page, page_size) = query.page_and_size(&state.pagination_config);
    let page_count = page.count.div_ceil(page_size);
    let indicators = create_pagination_indicators(
        current_page,
        page_count,
        state.pagination_config.max_pages,
    );

    let nav_bar = NavBar::new(endpoints::BUDGETS_VIEW).into_html();
    let content = html! {
        (nav_bar)

        div class=(PAGE_CONTAINER_STYLE)
        {
            div class="relative w-full max-w-screen-lg overflow-x-auto shadow-md sm:rounded-lg"
            {
                div class="flex justify-between items-center p-4"
                {
                    h1 class="text-xl font-bold" { "Budgets" }

                    a href=(endpoints::NEW_BUDGET_VIEW) class=(LINK_STYLE) { "Create budget" }
                }

                @if page.results.is_empty() {
                    p class="p-4" { "No budgets yet." }
                } @else {
                    (budgets_table(&page.results))
                }
            }

            @if page_count > 1 {
                (pagination_view(endpoints::BUDGETS_VIEW, &indicators))
            }
        }
    };

    base("Budgets", &content).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Extension,
        extract::{Query, State},
    };
    use time::macros::date;

    use crate::{
        budget::core::{create_budget, test_utils::budget_data},
        pagination::{ListQuery, PaginationConfig},
        test_utils::{assert_status_ok, assert_valid_html, parse_html_document},
        transaction::test_utils::{create_test_transaction, expense, get_test_connection},
    };

    use super::{BudgetsPageState, get_budgets_page};

    #[tokio::test]
    async fn shows_budget_spending() {
        let (connection, user_id, account_id) = get_test_connection();
        create_budget(
            user_id,
            budget_data("Food", 200, date!(2024 - 03 - 01)),
            &connection,
        )
        .unwrap();
        create_test_transaction(
            user_id,
            expense(50, date!(2024 - 03 - 02), "Groceries", account_id),
            &connection,
        );
        let state = BudgetsPageState {
            db_connection: Arc::new(Mutex::new(connection)),
            pagination_config: PaginationConfig::default(),
        };

        let response =
            get_budgets_page(State(state), Extension(user_id), Query(ListQuery::default())).await;

        assert_status_ok(&response);
        let document = parse_html_document(response).await;
        assert_valid_html(&document);
        let text = document.root_element().text().collect::<String>();
        assert!(text.contains("Food"));
        assert!(text.contains("$50.00 of $200.00"));
        assert!(text.contains("$150.00"));
        assert!(text.contains("25.00%"));
    }

    #[tokio::test]
    async fn empty_page_shows_message() {
        let (connection, user_id, _) = get_test_connection();
        let state = BudgetsPageState {
            db_connection: Arc::new(Mutex::new(connection)),
            pagination_config: PaginationConfig::default(),
        };

        let response =
            get_budgets_page(State(state), Extension(user_id), Query(ListQuery::default())).await;

        let document = parse_html_document(response).await;
        let text = document.root_element().text().collect::<String>();
        assert!(text.contains("No budgets yet."));
    }
}
