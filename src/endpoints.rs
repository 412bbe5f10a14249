//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/api/budgets/{budget_id}', use [format_endpoint].

/// The root route which redirects to the dashboard or log in page.
pub const ROOT: &str = "/";
/// The landing page for logged in users.
pub const DASHBOARD_VIEW: &str = "/dashboard";
/// The page for displaying a user's transactions.
pub const TRANSACTIONS_VIEW: &str = "/transactions";
/// The page and form endpoint for recording a new expense.
pub const NEW_EXPENSE_VIEW: &str = "/transactions/new";
/// The page for displaying a user's budgets and their progress.
pub const BUDGETS_VIEW: &str = "/budgets";
/// The page and form endpoint for creating a budget.
pub const NEW_BUDGET_VIEW: &str = "/budgets/new";
/// The route for getting the registration page.
pub const REGISTER_VIEW: &str = "/register";
/// The route for getting the log in page.
pub const LOG_IN_VIEW: &str = "/log_in";
/// The page to display when an internal server error occurs.
pub const INTERNAL_ERROR_VIEW: &str = "/error";
/// The route for static files.
pub const STATIC: &str = "/static";
/// The route for checking the server and database are up.
pub const HEALTH: &str = "/health";

/// The route for logging in a user.
pub const LOG_IN_API: &str = "/api/log_in";
/// The route for the client to log out the current user.
pub const LOG_OUT: &str = "/log_out";
/// The route to register users.
pub const USERS: &str = "/api/users";

/// The route to list and create categories.
pub const CATEGORIES: &str = "/api/categories";
/// The route to access a single category.
pub const CATEGORY: &str = "/api/categories/{category_id}";
/// The route to list the built-in categories.
pub const SYSTEM_CATEGORIES: &str = "/api/categories/system";
/// The route to list the user's own categories.
pub const CUSTOM_CATEGORIES: &str = "/api/categories/custom";

/// The route to list and create accounts.
pub const ACCOUNTS: &str = "/api/accounts";
/// The route to access a single account.
pub const ACCOUNT: &str = "/api/accounts/{account_id}";
/// The route to set the balance of an account.
pub const ACCOUNT_BALANCE: &str = "/api/accounts/{account_id}/update_balance";
/// The route for the totals across all accounts.
pub const ACCOUNTS_SUMMARY: &str = "/api/accounts/summary";

/// The route to list and create transactions.
pub const TRANSACTIONS_API: &str = "/api/transactions";
/// The route to access a single transaction.
pub const TRANSACTION: &str = "/api/transactions/{transaction_id}";
/// The route for income, expense and transfer totals.
pub const TRANSACTIONS_SUMMARY: &str = "/api/transactions/summary";
/// The route to create many transactions at once.
pub const TRANSACTIONS_BULK_CREATE: &str = "/api/transactions/bulk_create";
/// The route to download transactions as CSV.
pub const TRANSACTIONS_EXPORT: &str = "/api/transactions/export";

/// The route to list and create budgets.
pub const BUDGETS: &str = "/api/budgets";
/// The route to access a single budget.
pub const BUDGET: &str = "/api/budgets/{budget_id}";
/// The route for the progress of a single budget.
pub const BUDGET_PROGRESS: &str = "/api/budgets/{budget_id}/progress";
/// The route to close the current period of a budget and start the next.
pub const BUDGET_CLOSE_PERIOD: &str = "/api/budgets/{budget_id}/close_period";
/// The route to list closed budget periods.
pub const BUDGET_PERIODS: &str = "/api/budget_periods";
/// The route to access a single closed budget period.
pub const BUDGET_PERIOD: &str = "/api/budget_periods/{period_id}";

/// The route to list and create categorization rules.
pub const RULES: &str = "/api/rules";
/// The route to access a single rule.
pub const RULE: &str = "/api/rules/{rule_id}";
/// The route to test a rule against sample transaction data.
pub const RULE_TEST: &str = "/api/rules/{rule_id}/test";
/// The route to categorize uncategorized transactions with the user's rules.
pub const RULES_APPLY: &str = "/api/rules/apply";

/// The route to list and upload attachments.
pub const ATTACHMENTS: &str = "/api/attachments";
/// The route to access a single attachment's metadata.
pub const ATTACHMENT: &str = "/api/attachments/{attachment_id}";
/// The route to download the attached file.
pub const ATTACHMENT_DOWNLOAD: &str = "/api/attachments/{attachment_id}/download";

/// The route to list and upload transaction imports.
pub const IMPORTS: &str = "/api/imports";
/// The route to access a single import.
pub const IMPORT: &str = "/api/imports/{import_id}";
/// The route to retry a failed import.
pub const IMPORT_RETRY: &str = "/api/imports/{import_id}/retry";

/// The route to view and edit the current user's profile.
pub const PROFILE: &str = "/api/profile/me";
/// The route for the dashboard data as JSON.
pub const DASHBOARD_OVERVIEW: &str = "/api/dashboard/overview";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/users/{user_id}', '{user_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
#[cfg(test)]
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let param_start = match endpoint_path.find('{') {
        Some(start) => start,
        None => return endpoint_path.to_string(),
    };

    let param_end = endpoint_path[param_start..]
        .find('}')
        .map(|end| param_start + end + 1)
        .unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}

// These tests are here so that we know when we call `Uri::from_shared` it will not panic.
#[cfg(test)]
mod endpoints_tests {
    use axum::http::Uri;

    use crate::endpoints;

    use super::format_endpoint;

    #[track_caller]
    fn assert_endpoint_is_valid_uri(uri: &str) {
        assert!(uri.parse::<Uri>().is_ok(), "{uri} is not a valid URI");
    }

    #[test]
    fn endpoints_are_valid_uris() {
        for endpoint in [
            endpoints::ROOT,
            endpoints::DASHBOARD_VIEW,
            endpoints::TRANSACTIONS_VIEW,
            endpoints::NEW_EXPENSE_VIEW,
            endpoints::BUDGETS_VIEW,
            endpoints::NEW_BUDGET_VIEW,
            endpoints::REGISTER_VIEW,
            endpoints::LOG_IN_VIEW,
            endpoints::INTERNAL_ERROR_VIEW,
            endpoints::STATIC,
            endpoints::HEALTH,
            endpoints::LOG_IN_API,
            endpoints::LOG_OUT,
            endpoints::USERS,
            endpoints::CATEGORIES,
            endpoints::SYSTEM_CATEGORIES,
            endpoints::CUSTOM_CATEGORIES,
            endpoints::ACCOUNTS,
            endpoints::ACCOUNTS_SUMMARY,
            endpoints::TRANSACTIONS_API,
            endpoints::TRANSACTIONS_SUMMARY,
            endpoints::TRANSACTIONS_BULK_CREATE,
            endpoints::TRANSACTIONS_EXPORT,
            endpoints::BUDGETS,
            endpoints::BUDGET_PERIODS,
            endpoints::RULES,
            endpoints::RULES_APPLY,
            endpoints::ATTACHMENTS,
            endpoints::IMPORTS,
            endpoints::PROFILE,
            endpoints::DASHBOARD_OVERVIEW,
        ] {
            assert_endpoint_is_valid_uri(endpoint);
        }
    }

    #[test]
    fn parameterised_endpoints_are_valid_once_formatted() {
        for endpoint in [
            endpoints::CATEGORY,
            endpoints::ACCOUNT,
            endpoints::ACCOUNT_BALANCE,
            endpoints::TRANSACTION,
            endpoints::BUDGET,
            endpoints::BUDGET_PROGRESS,
            endpoints::BUDGET_CLOSE_PERIOD,
            endpoints::BUDGET_PERIOD,
            endpoints::RULE,
            endpoints::RULE_TEST,
            endpoints::ATTACHMENT,
            endpoints::ATTACHMENT_DOWNLOAD,
            endpoints::IMPORT,
            endpoints::IMPORT_RETRY,
        ] {
            assert_endpoint_is_valid_uri(&format_endpoint(endpoint, 7));
        }
    }

    #[test]
    fn produces_valid_uri() {
        let formatted_path = format_endpoint("/hello/{world_id}", 1);

        assert_eq!(formatted_path, "/hello/1");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }

    #[test]
    fn returns_original_path_with_no_parameter() {
        let formatted_path = format_endpoint("/hello/world", 1);

        assert_eq!(formatted_path, "/hello/world");
    }

    #[test]
    fn parameter_in_middle() {
        let formatted_path = format_endpoint("/hello/{world}/bye", 1);

        assert_eq!(formatted_path, "/hello/1/bye");
    }
}
