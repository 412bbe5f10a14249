//! Accounts that hold money and the transactions recorded against them.

mod api;
mod core;

pub use api::{
    account_summary_endpoint, create_account_endpoint, delete_account_endpoint,
    get_account_endpoint, list_accounts_endpoint, update_account_endpoint, update_balance_endpoint,
};
pub use core::{
    Account, AccountData, AccountId, AccountType, create_account, create_account_table,
    create_default_accounts, ensure_account_owned, get_account, get_active_accounts,
};
