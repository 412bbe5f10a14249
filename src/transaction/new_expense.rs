//! The page and form endpoint for recording a new expense.

use std::sync::{Arc, Mutex};

use axum::{
    Extension,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
// Must use axum_extra's Form since that parses an empty string as None instead
// of crashing like axum::Form.
use axum_extra::extract::Form;
use axum_htmx::HxRedirect;
use maud::{Markup, html};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Deserialize;
use time::Date;

use crate::{
    AppState,
    account::{Account, get_active_accounts},
    auth::UserID,
    category::{Category, CategoryId, get_visible_categories},
    db, endpoints,
    html::{
        BUTTON_PRIMARY_STYLE, FORM_CONTAINER_STYLE, FORM_LABEL_STYLE, FORM_TEXT_INPUT_STYLE, base,
        loading_spinner, text_input,
    },
    money::DEFAULT_CURRENCY,
    navigation::NavBar,
    profile::get_or_create_profile,
    timezone::local_today,
    transaction::core::{TransactionData, TransactionType, create_transaction},
};

/// The state needed for the new expense page and endpoint.
#[derive(Debug, Clone)]
pub struct NewExpenseState {
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    pub local_timezone: String,
}

impl FromRef<AppState> for NewExpenseState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

fn select_input<T>(
    label: &str,
    name: &str,
    required: bool,
    placeholder: Option<&str>,
    options: &[T],
    option: impl Fn(&T) -> (i64, &str),
) -> Markup {
    html! {
        div
        {
            label for=(name) class=(FORM_LABEL_STYLE) { (label) }

            select name=(name) id=(name) class=(FORM_TEXT_INPUT_STYLE) required[required]
            {
                @if let Some(placeholder) = placeholder {
                    option value="" { (placeholder) }
                }

                @for item in options {
                    @let (id, text) = option(item);
                    option value=(id) { (text) }
                }
            }
        }
    }
}

fn new_expense_view(
    today: Date,
    currency: &str,
    categories: &[Category],
    accounts: &[Account],
) -> Markup {
    let nav_bar = NavBar::new(endpoints::NEW_EXPENSE_VIEW).into_html();

    let content = html! {
        (nav_bar)

        div class=(FORM_CONTAINER_STYLE)
        {
            form
                hx-post=(endpoints::NEW_EXPENSE_VIEW)
                hx-target-error="#alert-container"
                class="w-full max-w-md space-y-4 md:space-y-6"
            {
                h2 class="text-xl font-bold" { "New Expense" }

                div
                {
                    label for="amount" class=(FORM_LABEL_STYLE) { "Amount" }

                    input
                        name="amount"
                        id="amount"
                        type="number"
                        step="0.01"
                        min="0.01"
                        placeholder="0.00"
                        required
                        autofocus
                        class=(FORM_TEXT_INPUT_STYLE);
                }

                (text_input("Currency", "currency", "text", currency, true, None))

                div
                {
                    label for="date" class=(FORM_LABEL_STYLE) { "Date" }

                    input
                        name="date"
                        id="date"
                        type="date"
                        required
                        value=(today)
                        class=(FORM_TEXT_INPUT_STYLE);
                }

                (text_input("Description", "description", "text", "", true, None))
                (text_input("Merchant", "merchant", "text", "", false, None))

                div
                {
                    label for="notes" class=(FORM_LABEL_STYLE) { "Notes" }

                    textarea name="notes" id="notes" rows="3" class=(FORM_TEXT_INPUT_STYLE) {}
                }

                (select_input(
                    "Category",
                    "category_id",
                    false,
                    Some("Uncategorized"),
                    categories,
                    |category| (category.id, category.name.as_str()),
                ))

                (select_input(
                    "Account",
                    "account_id",
                    true,
                    None,
                    accounts,
                    |account| (account.id, account.name.as_str()),
                ))

                button type="submit" id="submit-button" tabindex="0" class=(BUTTON_PRIMARY_STYLE)
                {
                    span id="indicator" class="inline htmx-indicator" { (loading_spinner()) }
                    " Save Expense"
                }
            }
        }
    };

    base("New Expense", &content)
}

/// Render the form for recording an expense.
pub async fn get_new_expense_page(
    State(state): State<NewExpenseState>,
    Extension(user_id): Extension<UserID>,
) -> Response {
    let today = match local_today(&state.local_timezone) {
        Ok(today) => today,
        Err(error) => return error.into_response(),
    };

    let connection = match db::lock(&state.db_connection) {
        Ok(connection) => connection,
        Err(error) => return error.into_response(),
    };

    let currency = get_or_create_profile(user_id, &connection)
        .map(|profile| profile.currency)
        .unwrap_or_else(|error| {
            tracing::warn!("could not get profile for user {user_id}: {error}");
            DEFAULT_CURRENCY.to_owned()
        });

    let categories = match get_visible_categories(user_id, &connection) {
        Ok(categories) => categories,
        Err(error) => return error.into_response(),
    };

    let accounts = match get_active_accounts(user_id, &connection) {
        Ok(accounts) => accounts,
        Err(error) => return error.into_response(),
    };

    new_expense_view(today, &currency, &categories, &accounts).into_response()
}

/// The form data for recording an expense.
#[derive(Debug, Deserialize)]
pub struct ExpenseForm {
    pub amount: Decimal,
    pub currency: Option<String>,
    pub date: Date,
    pub description: String,
    #[serde(default)]
    pub notes: String,
    pub category_id: Option<CategoryId>,
    pub account_id: i64,
    #[serde(default)]
    pub merchant: String,
}

impl From<ExpenseForm> for TransactionData {
    fn from(form: ExpenseForm) -> Self {
        Self {
            currency: form.currency.filter(|currency| !currency.trim().is_empty()),
            notes: form.notes,
            category_id: form.category_id,
            merchant: form.merchant,
            ..TransactionData::new(
                TransactionType::Expense,
                form.amount,
                form.date,
                &form.description,
                form.account_id,
            )
        }
    }
}

/// A route handler for recording an expense, redirects to the transactions view on success.
pub async fn create_expense_endpoint(
    State(state): State<NewExpenseState>,
    Extension(user_id): Extension<UserID>,
    Form(form): Form<ExpenseForm>,
) -> Response {
    let connection = match db::lock(&state.db_connection) {
        Ok(connection) => connection,
        Err(error) => return error.into_alert_response(),
    };

    if let Err(error) = create_transaction(user_id, form.into(), &connection) {
        tracing::error!("could not create expense: {error}");

        return error.into_alert_response();
    }

    (
        HxRedirect(endpoints::TRANSACTIONS_VIEW.to_owned()),
        StatusCode::SEE_OTHER,
    )
        .into_response()
}
