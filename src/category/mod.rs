//! Categories for grouping transactions, budgets and rules.

mod api;
mod core;

pub use api::{
    create_category_endpoint, delete_category_endpoint, get_category_endpoint,
    list_categories_endpoint, list_custom_categories_endpoint, list_system_categories_endpoint,
    update_category_endpoint,
};
pub use core::{
    Category, CategoryData, CategoryId, create_category, create_category_table,
    ensure_category_visible, get_visible_categories, seed_system_categories,
};
