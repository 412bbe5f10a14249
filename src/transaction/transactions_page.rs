//! Defines the route handler for the page that displays transactions as a table.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    Extension,
    extract::{FromRef, Query, State},
    response::{IntoResponse, Response},
};
use maud::{Markup, html};
use rusqlite::{Connection, params};

use crate::{
    AppState, Error,
    auth::UserID,
    db, endpoints,
    html::{
        BADGE_STYLE, LINK_STYLE, PAGE_CONTAINER_STYLE, TABLE_CELL_STYLE, TABLE_HEADER_STYLE,
        TABLE_ROW_STYLE, base, format_currency,
    },
    navigation::NavBar,
    pagination::{PaginationConfig, create_pagination_indicators, pagination_view},
    transaction::core::{Transaction, TransactionQuery, TransactionType, list_transactions},
};

/// The state needed for the transactions page.
#[derive(Debug, Clone)]
pub struct TransactionsPageState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for TransactionsPageState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

/// The names of the categories and accounts a user can see, keyed by ID.
#[derive(Debug, Default)]
pub(crate) struct NameLookup {
    categories: HashMap<i64, String>,
    accounts: HashMap<i64, String>,
}

impl NameLookup {
    pub(crate) fn load(user_id: UserID, connection: &Connection) -> Result<Self, Error> {
        let load_names = |sql: &str| -> Result<HashMap<i64, String>, Error> {
            connection
                .prepare(sql)?
                .query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .map(|pair| pair.map_err(Error::from))
                .collect()
        };

        Ok(Self {
            categories: load_names(
                "SELECT id, name FROM category WHERE user_id = ?1 OR user_id IS NULL",
            )?,
            accounts: load_names("SELECT id, name FROM account WHERE user_id = ?1")?,
        })
    }

    pub(crate) fn category(&self, transaction: &Transaction) -> &str {
        transaction
            .category_id
            .and_then(|id| self.categories.get(&id))
            .map_or("Uncategorized", String::as_str)
    }

    pub(crate) fn account(&self, transaction: &Transaction) -> &str {
        self.accounts
            .get(&transaction.account_id)
            .map_or("", String::as_str)
    }
}

/// The amount with a sign showing the direction of the transaction.
pub(crate) fn signed_amount(transaction: &Transaction) -> String {
    match transaction.transaction_type {
        TransactionType::Expense => format_currency(-transaction.amount),
        TransactionType::Income | TransactionType::Transfer => {
            format_currency(transaction.amount)
        }
    }
}

pub(crate) fn transactions_table(transactions: &[Transaction], names: &NameLookup) -> Markup {
    html! {
        table class="w-full text-sm text-left rtl:text-right text-gray-500 dark:text-gray-400"
        {
            thead class=(TABLE_HEADER_STYLE)
            {
                tr
                {
                    th scope="col" class=(TABLE_CELL_STYLE) { "Date" }
                    th scope="col" class=(TABLE_CELL_STYLE) { "Description" }
                    th scope="col" class=(TABLE_CELL_STYLE) { "Category" }
                    th scope="col" class=(TABLE_CELL_STYLE) { "Account" }
                    th scope="col" class={ (TABLE_CELL_STYLE) " text-right" } { "Amount" }
                }
            }

            tbody
            {
                @for transaction in transactions {
                    tr class=(TABLE_ROW_STYLE)
                    {
                        td class=(TABLE_CELL_STYLE) { (transaction.date) }
                        td class=(TABLE_CELL_STYLE)
                        {
                            (transaction.description)
                            @if !transaction.merchant.is_empty() {
                                span class="block text-xs text-gray-400" { (transaction.merchant) }
                            }
                        }
                        td class=(TABLE_CELL_STYLE)
                        {
                            span class=(BADGE_STYLE) { (names.category(transaction)) }
                        }
                        td class=(TABLE_CELL_STYLE) { (names.account(transaction)) }
                        td class={ (TABLE_CELL_STYLE) " text-right" } { (signed_amount(transaction)) }
                    }
                }
            }
        }
    }
}

/// Render a page of the user's transactions.
pub async fn get_transactions_page(
    State(state): State<TransactionsPageState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<TransactionQuery>,
) -> Response {
    let (page, names) = {
        let connection = match db::lock(&state.db_connection) {
            Ok(connection) => connection,
            Err(error) => return error.into_response(),
        };

        let page = match list_transactions(user_id, &query, &state.pagination_config, &connection)
        {
            Ok(page) => page,
            Err(error) => return error.into_response(),
        };

        match NameLookup::load(user_id, &connection) {
            Ok(names) => (page, names),
            Err(error) => return error.into_response(),
        }
    };

    let (current_page, page_size) = query
        .list_query()
        .page_and_size(&state.pagination_config);
    let page_count = page.count.div_ceil(page_size);
    let indicators = create_pagination_indicators(
        current_page,
        page_count,
        state.pagination_config.max_pages,
    );

    let nav_bar = NavBar::new(endpoints::TRANSACTIONS_VIEW).into_html();
    let content = html! {
        (nav_bar)

        div class=(PAGE_CONTAINER_STYLE)
        {
            div class="relative w-full max-w-screen-lg overflow-x-auto shadow-md sm:rounded-lg"
            {
                div class="flex justify-between items-center p-4"
                {
                    h1 class="text-xl font-bold" { "Transactions" }

                    a href=(endpoints::NEW_EXPENSE_VIEW) class=(LINK_STYLE) { "Record expense" }
                }

                @if page.results.is_empty() {
                    p class="p-4" { "No transactions yet." }
                } @else {
                    (transactions_table(&page.results, &names))
                }
            }

            @if page_count > 1 {
                (pagination_view(endpoints::TRANSACTIONS_VIEW, &indicators))
            }
        }
    };

    base("Transactions", &content).into_response()
}
