//! Rules that automatically assign a category to transactions.
//!
//! A rule matches on the description, merchant or amount of a transaction. The user's active
//! rules are tried from highest to lowest priority and the first match sets the category.

mod api;
mod core;
mod engine;

pub use api::{
    apply_rules_endpoint, create_rule_endpoint, delete_rule_endpoint, get_rule_endpoint,
    list_rules_endpoint, test_rule_endpoint, update_rule_endpoint,
};
pub use core::{RuleType, create_rule, create_rule_table};
pub use engine::{RuleEngine, RuleInput};

#[cfg(test)]
pub(crate) use core::test_utils;
