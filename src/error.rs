//! Defines the app level error type and conversions to rendered HTML pages and alerts.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use time::Date;

use crate::{alert::Alert, error_page::ErrorPage};

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The user provided an invalid combination of username and password.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// The auth token cookie is missing from the cookie jar in the request.
    #[error("no cookies in the cookie jar :(")]
    CookieMissing,

    /// There was an error parsing the date in the cookie or creating the new
    /// expiry date time.
    ///
    /// Callers should pass in the original error as a string and the date
    /// string that caused the error.
    #[error("could not format expiry cookie date-time string \"{1}\": {0}")]
    InvalidDateFormat(String, String),

    /// The user provided a password that is too easy to guess.
    #[error("password is too weak: {0}")]
    TooWeak(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    /// When communicating with the application client this error should be
    /// replaced with a general error type indicating an internal server error.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// A required text field was empty.
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    /// An amount was zero, negative or too large.
    #[error("{0} is not a valid amount, amounts must be greater than zero")]
    InvalidAmount(Decimal),

    /// A currency code that is not three letters.
    #[error("\"{0}\" is not a valid currency code")]
    InvalidCurrency(String),

    /// A colour that is not a hex colour string.
    #[error("\"{0}\" is not a valid colour, use the format #RRGGBB")]
    InvalidColor(String),

    /// A date range that ends before it starts.
    #[error("the end date {end} is before the start date {start}")]
    InvalidDateRange {
        /// The first day of the range.
        start: Date,
        /// The last day of the range.
        end: Date,
    },

    /// The next occurrence or period end of a date falls past the last representable date.
    #[error("{0} is too far in the future to schedule from")]
    DateOutOfRange(Date),

    /// A recurring transaction whose next occurrence is not after its own date.
    #[error("the next occurrence {next_occurrence} must be after the transaction date {date}")]
    InvalidNextOccurrence {
        /// The date of the recurring transaction.
        date: Date,
        /// The rejected next occurrence.
        next_occurrence: Date,
    },

    /// The category does not exist or belongs to another user.
    #[error("the category ID {0} does not refer to a valid category")]
    InvalidCategory(i64),

    /// The account does not exist or belongs to another user.
    #[error("the account ID {0} does not refer to a valid account")]
    InvalidAccount(i64),

    /// The transaction does not exist or belongs to another user.
    #[error("the transaction ID {0} does not refer to a valid transaction")]
    InvalidTransaction(i64),

    /// A rule pattern that is not a valid regular expression.
    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),

    /// A rule that can never match.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// A value that could not be parsed as one of the allowed choices.
    #[error("\"{value}\" is not a valid {field}")]
    InvalidChoice {
        /// The name of the field.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A recurring transaction without a frequency, or a frequency without recurrence.
    #[error("recurring transactions need a recurrence frequency")]
    MissingRecurrence,

    /// The multipart form could not be parsed.
    #[error("Could not parse multipart form: {0}")]
    MultipartError(String),

    /// The uploaded file is larger than the limit in bytes.
    #[error("the file is larger than the limit of {0} bytes")]
    FileTooLarge(usize),

    /// The uploaded file is not a supported import format.
    #[error("\"{0}\" is not a supported import file, use a CSV or OFX file")]
    UnsupportedImportFormat(String),

    /// The CSV had issues that prevented it from being parsed.
    #[error("Could not parse the CSV file: {0}")]
    InvalidCSV(String),

    /// The OFX document had issues that prevented it from being parsed.
    #[error("Could not parse the OFX file: {0}")]
    InvalidOFX(String),

    /// Tried to retry an import that has not failed.
    #[error("Can only retry failed imports")]
    ImportNotRetryable,

    /// Tried to close the period of a budget with a custom period.
    #[error("budgets with a custom period cannot be rolled over to a new period")]
    CustomBudgetPeriod,

    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// A query referenced a row that does not exist.
    #[error("a referenced record does not exist")]
    InvalidForeignKey,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// The specified username is already registered.
    #[error("the username \"{0}\" is already taken")]
    DuplicateUsername(String),

    /// The specified account name already exists for the user.
    #[error("the account \"{0}\" already exists")]
    DuplicateAccountName(String),

    /// The specified category name already exists for the user.
    #[error("the category \"{0}\" already exists")]
    DuplicateCategoryName(String),

    /// An error occurred while serializing a struct as JSON
    #[error("could not serialize as JSON: {0}")]
    JSONSerializationError(String),

    /// An email could not be built or delivered.
    #[error("could not send email: {0}")]
    MailError(String),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// Tried to update a transaction that does not exist
    #[error("tried to update a transaction that is not in the database")]
    UpdateMissingTransaction,

    /// Tried to delete a transaction that does not exist
    #[error("tried to delete a transaction that is not in the database")]
    DeleteMissingTransaction,

    /// Tried to update an account that does not exist
    #[error("tried to update an account that is not in the database")]
    UpdateMissingAccount,

    /// Tried to delete an account that does not exist
    #[error("tried to delete an account that is not in the database")]
    DeleteMissingAccount,

    /// Tried to update a category that does not exist
    #[error("tried to update a category that is not in the database")]
    UpdateMissingCategory,

    /// Tried to delete a category that does not exist
    #[error("tried to delete a category that is not in the database")]
    DeleteMissingCategory,

    /// Tried to update a rule that does not exist
    #[error("tried to update a rule that is not in the database")]
    UpdateMissingRule,

    /// Tried to delete a rule that does not exist
    #[error("tried to delete a rule that is not in the database")]
    DeleteMissingRule,

    /// Tried to update a budget that does not exist
    #[error("tried to update a budget that is not in the database")]
    UpdateMissingBudget,

    /// Tried to delete a budget that does not exist
    #[error("tried to delete a budget that is not in the database")]
    DeleteMissingBudget,

    /// Tried to update a budget period that does not exist
    #[error("tried to update a budget period that is not in the database")]
    UpdateMissingBudgetPeriod,

    /// Tried to delete a budget period that does not exist
    #[error("tried to delete a budget period that is not in the database")]
    DeleteMissingBudgetPeriod,

    /// Tried to delete an import that does not exist
    #[error("tried to delete an import that is not in the database")]
    DeleteMissingImport,

    /// Tried to delete an attachment that does not exist
    #[error("tried to delete an attachment that is not in the database")]
    DeleteMissingAttachment,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 787 occurs when a FOREIGN KEY constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(_)) if sql_error.extended_code == 787 => {
                Error::InvalidForeignKey
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

/// Whether `error` is a UNIQUE constraint violation on a column of `table`.
///
/// Code 2067 occurs when a UNIQUE constraint failed.
pub(crate) fn is_unique_violation(error: &rusqlite::Error, table: &str) -> bool {
    match error {
        rusqlite::Error::SqliteFailure(sql_error, Some(desc)) => {
            sql_error.extended_code == 2067 && desc.contains(&format!("{table}."))
        }
        _ => false,
    }
}

impl Error {
    /// The HTTP status code that best describes the error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidCredentials | Error::CookieMissing => StatusCode::UNAUTHORIZED,
            Error::NotFound
            | Error::UpdateMissingTransaction
            | Error::DeleteMissingTransaction
            | Error::UpdateMissingAccount
            | Error::DeleteMissingAccount
            | Error::UpdateMissingCategory
            | Error::DeleteMissingCategory
            | Error::UpdateMissingRule
            | Error::DeleteMissingRule
            | Error::UpdateMissingBudget
            | Error::DeleteMissingBudget
            | Error::UpdateMissingBudgetPeriod
            | Error::DeleteMissingBudgetPeriod
            | Error::DeleteMissingImport
            | Error::DeleteMissingAttachment => StatusCode::NOT_FOUND,
            Error::DuplicateUsername(_)
            | Error::DuplicateAccountName(_)
            | Error::DuplicateCategoryName(_) => StatusCode::CONFLICT,
            Error::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::TooWeak(_)
            | Error::EmptyField(_)
            | Error::InvalidAmount(_)
            | Error::InvalidCurrency(_)
            | Error::InvalidColor(_)
            | Error::InvalidDateRange { .. }
            | Error::DateOutOfRange(_)
            | Error::InvalidNextOccurrence { .. }
            | Error::InvalidCategory(_)
            | Error::InvalidAccount(_)
            | Error::InvalidTransaction(_)
            | Error::InvalidRegex(_)
            | Error::InvalidRule(_)
            | Error::InvalidChoice { .. }
            | Error::MissingRecurrence
            | Error::MultipartError(_)
            | Error::UnsupportedImportFormat(_)
            | Error::InvalidCSV(_)
            | Error::InvalidOFX(_)
            | Error::ImportNotRetryable
            | Error::CustomBudgetPeriod
            | Error::InvalidForeignKey => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::NotFound => ErrorPage::not_found().into_response(),
            Error::InvalidTimezoneError(timezone) => ErrorPage::internal(format!(
                "The server timezone \"{timezone}\" is not recognised. Set it to a canonical \
                name such as \"Pacific/Auckland\"."
            ))
            .into_response(),
            Error::DatabaseLockError => ErrorPage::default().into_response(),
            // Anything else is not meant for the client's eyes.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                ErrorPage::default().into_response()
            }
        }
    }
}

impl Error {
    /// Convert the error into an HTTP response with an HTML alert.
    pub fn into_alert_response(self) -> Response {
        let status_code = self.status_code();

        let alert = match self {
            Error::InvalidTimezoneError(timezone) => Alert::Error {
                message: "Invalid Timezone Settings".to_owned(),
                details: format!(
                    "Could not get local timezone \"{timezone}\". Check your server settings and \
                    ensure the timezone has been set to valid, canonical timezone string"
                ),
            },
            Error::InvalidAmount(amount) => Alert::Error {
                message: "Invalid amount".to_owned(),
                details: format!("{amount} is not a valid amount. Enter an amount above zero."),
            },
            Error::InvalidDateRange { start, end } => Alert::Error {
                message: "Invalid dates".to_owned(),
                details: format!("The end date {end} must not be before the start date {start}."),
            },
            Error::InvalidCategory(_) => Alert::Error {
                message: "Invalid category".to_owned(),
                details: "The selected category could not be found.".to_owned(),
            },
            Error::InvalidAccount(_) => Alert::Error {
                message: "Invalid account".to_owned(),
                details: "The selected account could not be found.".to_owned(),
            },
            Error::DeleteMissingTransaction => Alert::Error {
                message: "Could not delete transaction".to_owned(),
                details: "The transaction could not be found. \
                    Try refreshing the page to see if the transaction has already been deleted."
                    .to_owned(),
            },
            Error::DeleteMissingBudget => Alert::Error {
                message: "Could not delete budget".to_owned(),
                details: "The budget could not be found. \
                    Try refreshing the page to see if the budget has already been deleted."
                    .to_owned(),
            },
            error if error.status_code() == StatusCode::BAD_REQUEST => Alert::ErrorSimple {
                message: error.to_string(),
            },
            error => {
                tracing::error!("An unexpected error occurred: {error}");

                Alert::Error {
                    message: "Something went wrong".to_owned(),
                    details: "An unexpected error occurred, check the server logs for more details."
                        .to_owned(),
                }
            }
        };

        (status_code, alert.into_html()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};
    use rusqlite::Connection;

    use crate::Error;

    use super::is_unique_violation;

    #[test]
    fn no_rows_maps_to_not_found() {
        let error: Error = rusqlite::Error::QueryReturnedNoRows.into();

        assert_eq!(error, Error::NotFound);
    }

    #[test]
    fn detects_unique_violation_by_table() {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute("CREATE TABLE thing (name TEXT UNIQUE)", ())
            .unwrap();
        connection
            .execute("INSERT INTO thing (name) VALUES ('a')", ())
            .unwrap();

        let error = connection
            .execute("INSERT INTO thing (name) VALUES ('a')", ())
            .unwrap_err();

        assert!(is_unique_violation(&error, "thing"));
        assert!(!is_unique_violation(&error, "other"));
    }

    #[test]
    fn not_found_renders_404_page() {
        let response = Error::NotFound.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_errors_are_bad_requests() {
        let response = Error::EmptyField("description").into_alert_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
