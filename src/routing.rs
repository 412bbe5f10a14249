//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    response::Redirect,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::{
    AppState,
    account::{
        account_summary_endpoint, create_account_endpoint, delete_account_endpoint,
        get_account_endpoint, list_accounts_endpoint, update_account_endpoint,
        update_balance_endpoint,
    },
    attachment::{
        MAX_ATTACHMENT_SIZE, delete_attachment_endpoint, download_attachment_endpoint,
        get_attachment_endpoint, list_attachments_endpoint, upload_attachment_endpoint,
    },
    auth::{
        auth_guard, auth_guard_api, auth_guard_hx, get_log_in_page, get_log_out,
        get_register_page, post_log_in, register_user,
    },
    budget::{
        budget_progress_endpoint, close_budget_period_endpoint, create_budget_endpoint,
        create_budget_form_endpoint, delete_budget_endpoint, delete_budget_period_endpoint,
        get_budget_endpoint, get_budget_period_endpoint, get_budgets_page, get_new_budget_page,
        list_budget_periods_endpoint, list_budgets_endpoint, update_budget_endpoint,
        update_budget_period_endpoint,
    },
    category::{
        create_category_endpoint, delete_category_endpoint, get_category_endpoint,
        list_categories_endpoint, list_custom_categories_endpoint,
        list_system_categories_endpoint, update_category_endpoint,
    },
    dashboard::{dashboard_overview_endpoint, get_dashboard_page},
    endpoints,
    error_page::{get_404_not_found, get_internal_server_error_page},
    health::health_check,
    import::{
        MAX_IMPORT_FILE_SIZE, delete_import_endpoint, get_import_endpoint, list_imports_endpoint,
        retry_import_endpoint, upload_import_endpoint,
    },
    profile::{get_profile_endpoint, patch_profile_endpoint, put_profile_endpoint},
    rule::{
        apply_rules_endpoint, create_rule_endpoint, delete_rule_endpoint, get_rule_endpoint,
        list_rules_endpoint, test_rule_endpoint, update_rule_endpoint,
    },
    transaction::{
        bulk_create_transactions_endpoint, create_expense_endpoint, create_transaction_endpoint,
        delete_transaction_endpoint, export_transactions_endpoint, get_new_expense_page,
        get_transaction_endpoint, get_transactions_page, list_transactions_endpoint,
        transaction_summary_endpoint, update_transaction_endpoint,
    },
};

/// Room for the multipart framing around the largest accepted file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::HEALTH, get(health_check))
        .route(endpoints::LOG_IN_VIEW, get(get_log_in_page))
        .route(endpoints::LOG_IN_API, post(post_log_in))
        .route(endpoints::LOG_OUT, get(get_log_out))
        .route(endpoints::REGISTER_VIEW, get(get_register_page))
        .route(endpoints::USERS, post(register_user))
        .route(
            endpoints::INTERNAL_ERROR_VIEW,
            get(get_internal_server_error_page),
        );

    let page_routes = Router::new()
        .route(endpoints::ROOT, get(get_index_page))
        .route(endpoints::DASHBOARD_VIEW, get(get_dashboard_page))
        .route(endpoints::TRANSACTIONS_VIEW, get(get_transactions_page))
        .route(endpoints::NEW_EXPENSE_VIEW, get(get_new_expense_page))
        .route(endpoints::BUDGETS_VIEW, get(get_budgets_page))
        .route(endpoints::NEW_BUDGET_VIEW, get(get_new_budget_page))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    // These POST routes need to use the HX-REDIRECT header for auth redirects to work properly for HTMX requests.
    let form_routes = Router::new()
        .route(endpoints::NEW_EXPENSE_VIEW, post(create_expense_endpoint))
        .route(endpoints::NEW_BUDGET_VIEW, post(create_budget_form_endpoint))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard_hx));

    let api_routes = Router::new()
        .route(
            endpoints::CATEGORIES,
            get(list_categories_endpoint).post(create_category_endpoint),
        )
        .route(
            endpoints::SYSTEM_CATEGORIES,
            get(list_system_categories_endpoint),
        )
        .route(
            endpoints::CUSTOM_CATEGORIES,
            get(list_custom_categories_endpoint),
        )
        .route(
            endpoints::CATEGORY,
            get(get_category_endpoint)
                .put(update_category_endpoint)
                .delete(delete_category_endpoint),
        )
        .route(
            endpoints::ACCOUNTS,
            get(list_accounts_endpoint).post(create_account_endpoint),
        )
        .route(endpoints::ACCOUNTS_SUMMARY, get(account_summary_endpoint))
        .route(
            endpoints::ACCOUNT,
            get(get_account_endpoint)
                .put(update_account_endpoint)
                .delete(delete_account_endpoint),
        )
        .route(endpoints::ACCOUNT_BALANCE, post(update_balance_endpoint))
        .route(
            endpoints::TRANSACTIONS_API,
            get(list_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route(
            endpoints::TRANSACTIONS_SUMMARY,
            get(transaction_summary_endpoint),
        )
        .route(
            endpoints::TRANSACTIONS_BULK_CREATE,
            post(bulk_create_transactions_endpoint),
        )
        .route(
            endpoints::TRANSACTIONS_EXPORT,
            get(export_transactions_endpoint),
        )
        .route(
            endpoints::TRANSACTION,
            get(get_transaction_endpoint)
                .put(update_transaction_endpoint)
                .delete(delete_transaction_endpoint),
        )
        .route(
            endpoints::BUDGETS,
            get(list_budgets_endpoint).post(create_budget_endpoint),
        )
        .route(
            endpoints::BUDGET,
            get(get_budget_endpoint)
                .put(update_budget_endpoint)
                .delete(delete_budget_endpoint),
        )
        .route(endpoints::BUDGET_PROGRESS, get(budget_progress_endpoint))
        .route(
            endpoints::BUDGET_CLOSE_PERIOD,
            post(close_budget_period_endpoint),
        )
        .route(
            endpoints::BUDGET_PERIODS,
            get(list_budget_periods_endpoint),
        )
        .route(
            endpoints::BUDGET_PERIOD,
            get(get_budget_period_endpoint)
                .patch(update_budget_period_endpoint)
                .delete(delete_budget_period_endpoint),
        )
        .route(
            endpoints::RULES,
            get(list_rules_endpoint).post(create_rule_endpoint),
        )
        .route(endpoints::RULES_APPLY, post(apply_rules_endpoint))
        .route(
            endpoints::RULE,
            get(get_rule_endpoint)
                .put(update_rule_endpoint)
                .delete(delete_rule_endpoint),
        )
        .route(endpoints::RULE_TEST, post(test_rule_endpoint))
        .route(
            endpoints::ATTACHMENTS,
            get(list_attachments_endpoint)
                .post(upload_attachment_endpoint)
                .layer(DefaultBodyLimit::max(MAX_ATTACHMENT_SIZE + MULTIPART_OVERHEAD)),
        )
        .route(
            endpoints::ATTACHMENT,
            get(get_attachment_endpoint).delete(delete_attachment_endpoint),
        )
        .route(
            endpoints::ATTACHMENT_DOWNLOAD,
            get(download_attachment_endpoint),
        )
        .route(
            endpoints::IMPORTS,
            get(list_imports_endpoint)
                .post(upload_import_endpoint)
                .layer(DefaultBodyLimit::max(MAX_IMPORT_FILE_SIZE + MULTIPART_OVERHEAD)),
        )
        .route(
            endpoints::IMPORT,
            get(get_import_endpoint).delete(delete_import_endpoint),
        )
        .route(endpoints::IMPORT_RETRY, post(retry_import_endpoint))
        .route(
            endpoints::PROFILE,
            get(get_profile_endpoint)
                .put(put_profile_endpoint)
                .patch(patch_profile_endpoint),
        )
        .route(
            endpoints::DASHBOARD_OVERVIEW,
            get(dashboard_overview_endpoint),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard_api));

    page_routes
        .merge(form_routes)
        .merge(api_routes)
        .merge(unprotected_routes)
        .nest_service(endpoints::STATIC, ServeDir::new("static/"))
        .fallback(get_404_not_found)
        .with_state(state)
}

/// The root path '/' redirects to the dashboard page.
async fn get_index_page() -> Redirect {
    Redirect::to(endpoints::DASHBOARD_VIEW)
}
