//! The page and form endpoint for creating a budget.

use std::sync::{Arc, Mutex};

use axum::{
    Extension,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
// Must use axum_extra's Form since that parses an empty string as None and supports
// repeated keys for the account list.
use axum_extra::extract::Form;
use axum_htmx::HxRedirect;
use maud::{Markup, html};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Deserialize;
use time::Date;

use crate::{
    AppState,
    account::{Account, AccountId, get_active_accounts},
    auth::UserID,
    budget::core::{BudgetData, Period, create_budget},
    category::{Category, CategoryId, get_visible_categories},
    db, endpoints,
    html::{
        BUTTON_PRIMARY_STYLE, FORM_CONTAINER_STYLE, FORM_LABEL_STYLE, FORM_TEXT_INPUT_STYLE, base,
        loading_spinner, text_input,
    },
    money::DEFAULT_CURRENCY,
    navigation::NavBar,
    timezone::local_today,
};

/// The state needed for the new budget page and endpoint.
#[derive(Debug, Clone)]
pub struct NewBudgetState {
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    pub local_timezone: String,
}

impl FromRef<AppState> for NewBudgetState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

fn new_budget_view(today: Date, categories: &[Category], accounts: &[Account]) -> Markup {
    let nav_bar = NavBar::new(endpoints::NEW_BUDGET_VIEW).into_html();

    let content = html! {
        (nav_bar)

        div class=(FORM_CONTAINER_STYLE)
        {
            form
                hx-post=(endpoints::NEW_BUDGET_VIEW)
                hx-target-error="#alert-container"
                class="w-full max-w-md space-y-4 md:space-y-6"
            {
                h2 class="text-xl font-bold" { "New Budget" }

                (text_input("Name", "name", "text", "", true, None))

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
                        class=(FORM_TEXT_INPUT_STYLE);
                }

                (text_input("Currency", "currency", "text", DEFAULT_CURRENCY, true, None))

                div
                {
                    label for="period" class=(FORM_LABEL_STYLE) { "Period" }

                    select name="period" id="period" class=(FORM_TEXT_INPUT_STYLE) required
                    {
                        @for period in Period::ALL {
                            option value=(period) selected[*period == Period::Monthly] {
                                (period)
                            }
                        }
                    }
                }

                (text_input("Start date", "start_date", "date", &today.to_string(), true, None))

                div
                {
                    label for="end_date" class=(FORM_LABEL_STYLE) { "End date" }

                    input name="end_date" id="end_date" type="date" class=(FORM_TEXT_INPUT_STYLE);

                    p class="text-xs text-gray-500" { "Leave blank to use the end of the period." }
                }

                div
                {
                    label for="category_id" class=(FORM_LABEL_STYLE) { "Category" }

                    select name="category_id" id="category_id" class=(FORM_TEXT_INPUT_STYLE)
                    {
                        option value="" { "All categories" }

                        @for category in categories {
                            option value=(category.id) { (category.name) }
                        }
                    }
                }

                div
                {
                    label for="account_ids" class=(FORM_LABEL_STYLE) { "Accounts" }

                    select
                        name="account_ids"
                        id="account_ids"
                        multiple
                        class=(FORM_TEXT_INPUT_STYLE)
                    {
                        @for account in accounts {
                            option value=(account.id) { (account.name) }
                        }
                    }

                    p class="text-xs text-gray-500" { "Select none to include every account." }
                }

                button type="submit" id="submit-button" tabindex="0" class=(BUTTON_PRIMARY_STYLE)
                {
                    span id="indicator" class="inline htmx-indicator" { (loading_spinner()) }
                    " Create Budget"
                }
            }
        }
    };

    base("New Budget", &content)
}

/// Render the form for creating a budget.
pub async fn get_new_budget_page(
    State(state): State<NewBudgetState>,
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

    let categories = match get_visible_categories(user_id, &connection) {
        Ok(categories) => categories,
        Err(error) => return error.into_response(),
    };

    let accounts = match get_active_accounts(user_id, &connection) {
        Ok(accounts) => accounts,
        Err(error) => return error.into_response(),
    };

    new_budget_view(today, &categories, &accounts).into_response()
}

/// The form data for creating a budget.
#[derive(Debug, Deserialize)]
pub struct BudgetForm {
    pub name: String,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub period: Period,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub account_ids: Vec<AccountId>,
}

impl From<BudgetForm> for BudgetData {
    fn from(form: BudgetForm) -> Self {
        Self {
            name: form.name,
            description: String::new(),
            amount: form.amount,
            currency: form.currency.filter(|currency| !currency.trim().is_empty()),
            period: form.period,
            start_date: form.start_date,
            end_date: form.end_date,
            category_id: form.category_id,
            account_ids: form.account_ids,
            is_active: None,
            rollover: false,
            rollover_amount: None,
        }
    }
}

/// A route handler for creating a budget, redirects to the budgets view on success.
pub async fn create_budget_form_endpoint(
    State(state): State<NewBudgetState>,
    Extension(user_id): Extension<UserID>,
    Form(form): Form<BudgetForm>,
) -> Response {
    let connection = match db::lock(&state.db_connection) {
        Ok(connection) => connection,
        Err(error) => return error.into_alert_response(),
    };

    if let Err(error) = create_budget(user_id, form.into(), &connection) {
        tracing::error!("could not create budget: {error}");

        return error.into_alert_response();
    }

    (
        HxRedirect(endpoints::BUDGETS_VIEW.to_owned()),
        StatusCode::SEE_OTHER,
    )
        .into_response()
}
