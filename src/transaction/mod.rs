//! Income, expenses and transfers recorded against a user's accounts.
//!
//! This module contains:
//! - The `Transaction` model, validation and duplicate fingerprints
//! - Bulk creation, CSV export and the copying of recurring transactions
//! - The JSON API and the HTML pages for listing transactions and recording expenses

mod api;
mod bulk;
mod core;
mod export;
mod new_expense;
mod recurring;
mod transactions_page;

pub use api::{
    bulk_create_transactions_endpoint, create_transaction_endpoint, delete_transaction_endpoint,
    export_transactions_endpoint, get_transaction_endpoint, list_transactions_endpoint,
    transaction_summary_endpoint, update_transaction_endpoint,
};
pub(crate) use bulk::is_validation_error;
pub use core::{
    DateRangeQuery, Transaction, TransactionData, TransactionId, TransactionQuery, TransactionType,
    create_transaction_table, delete_transaction, fingerprint_exists, get_recent_transactions,
    get_transaction, get_transaction_summary, insert_transaction, list_transactions,
    validate_transaction,
};
pub use new_expense::{create_expense_endpoint, get_new_expense_page};
pub use recurring::sync_recurring_transactions;
pub use transactions_page::get_transactions_page;

pub(crate) use transactions_page::{NameLookup, transactions_table};

#[cfg(test)]
pub(crate) use core::test_utils;
