use rusqlite::{Connection, OptionalExtension, Row, params, types::Value};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    auth::UserID,
    database_id::DatabaseId,
    db::SqlFilter,
    error::is_unique_violation,
    pagination::{ListQuery, Page, PaginationConfig, limit_clause},
};

pub type CategoryId = DatabaseId;

/// The colour given to categories created without one.
pub const DEFAULT_CATEGORY_COLOR: &str = "#6B7280";

/// The built-in categories every user can see, as (name, description).
pub const SYSTEM_CATEGORIES: [(&str, &str); 10] = [
    ("Food & Dining", "Restaurants, groceries, etc."),
    ("Transportation", "Gas, public transit, rideshare"),
    ("Shopping", "Clothing, electronics, etc."),
    ("Entertainment", "Movies, games, hobbies"),
    ("Bills & Utilities", "Rent, electricity, internet"),
    ("Healthcare", "Medical expenses, prescriptions"),
    ("Travel", "Vacations, business trips"),
    ("Education", "Courses, books, training"),
    ("Income", "Salary, freelance, investments"),
    ("Other", "Miscellaneous expenses"),
];

/// A label for grouping transactions, budgets and rules.
///
/// System categories have no owner and are shared by all users.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub user_id: Option<UserID>,
    pub name: String,
    pub description: String,
    pub color: String,
    pub is_system: bool,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The editable fields of a category.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryData {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub color: Option<String>,
    pub is_active: Option<bool>,
}

/// Which categories to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryScope {
    /// The user's categories and the system categories.
    Visible,
    /// Only the system categories.
    System,
    /// Only the user's own categories.
    Custom,
}

pub fn create_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS category (
            id INTEGER PRIMARY KEY,
            user_id INTEGER,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            color TEXT NOT NULL,
            is_system INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(user_id, name),
            FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_category_user ON category(user_id)",
        (),
    )?;

    Ok(())
}

const CATEGORY_COLUMNS: &str =
    "id, user_id, name, description, color, is_system, is_active, created_at, updated_at";

pub fn map_category_row(row: &Row) -> Result<Category, rusqlite::Error> {
    Ok(Category {
        id: row.get(0)?,
        user_id: row.get::<_, Option<i64>>(1)?.map(UserID::new),
        name: row.get(2)?,
        description: row.get(3)?,
        color: row.get(4)?,
        is_system: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Check that `color` is a hex colour like "#1A2B3C".
///
/// # Errors
/// Returns [Error::InvalidColor] otherwise.
pub fn validate_color(color: &str) -> Result<String, Error> {
    let color = color.trim();
    let is_hex = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());

    if !is_hex {
        return Err(Error::InvalidColor(color.to_owned()));
    }

    Ok(color.to_ascii_uppercase())
}

/// Insert the system categories that are missing.
///
/// Returns the number of categories created.
pub fn seed_system_categories(connection: &Connection) -> Result<usize, Error> {
    let now = OffsetDateTime::now_utc();
    let mut created = 0;

    for (name, description) in SYSTEM_CATEGORIES {
        created += connection.execute(
            "INSERT INTO category
                (user_id, name, description, color, is_system, is_active, created_at, updated_at)
            SELECT NULL, ?1, ?2, ?3, 1, 1, ?4, ?4
            WHERE NOT EXISTS (SELECT 1 FROM category WHERE user_id IS NULL AND name = ?1)",
            params![name, description, DEFAULT_CATEGORY_COLOR, now],
        )?;
    }

    Ok(created)
}

/// Create a category owned by `user_id`.
///
/// # Errors
/// Returns:
/// - [Error::EmptyField] if the name is blank,
/// - [Error::InvalidColor] if the colour is not a hex colour,
/// - [Error::DuplicateCategoryName] if the user already has a category with the name.
pub fn create_category(
    user_id: UserID,
    data: CategoryData,
    connection: &Connection,
) -> Result<Category, Error> {
    let name = data.name.trim().to_owned();
    if name.is_empty() {
        return Err(Error::EmptyField("name"));
    }

    let color = match data.color.as_deref() {
        Some(color) if !color.trim().is_empty() => validate_color(color)?,
        _ => DEFAULT_CATEGORY_COLOR.to_owned(),
    };
    let is_active = data.is_active.unwrap_or(true);
    let now = OffsetDateTime::now_utc();

    connection
        .execute(
            "INSERT INTO category
                (user_id, name, description, color, is_system, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6)",
            params![user_id, name, data.description.trim(), color, is_active, now],
        )
        .map_err(|error| {
            if is_unique_violation(&error, "category") {
                Error::DuplicateCategoryName(name.clone())
            } else {
                error.into()
            }
        })?;

    Ok(Category {
        id: connection.last_insert_rowid(),
        user_id: Some(user_id),
        name,
        description: data.description.trim().to_owned(),
        color,
        is_system: false,
        is_active,
        created_at: now,
        updated_at: now,
    })
}

/// Get a category that `user_id` can see: one of their own or a system category.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such category.
pub fn get_category(
    id: CategoryId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Category, Error> {
    connection
        .prepare(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM category
            WHERE id = ?1 AND (user_id = ?2 OR user_id IS NULL)"
        ))?
        .query_row(params![id, user_id], map_category_row)
        .map_err(Error::from)
}

/// Check that `category_id` refers to a category `user_id` can use.
///
/// # Errors
/// Returns [Error::InvalidCategory] otherwise.
pub fn ensure_category_visible(
    category_id: CategoryId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let found = connection
        .query_row(
            "SELECT 1 FROM category WHERE id = ?1 AND (user_id = ?2 OR user_id IS NULL)",
            params![category_id, user_id],
            |_| Ok(()),
        )
        .optional()?;

    found.ok_or(Error::InvalidCategory(category_id))
}

fn scope_filter(user_id: UserID, scope: CategoryScope) -> SqlFilter {
    match scope {
        CategoryScope::Visible => SqlFilter::new(
            "user_id = ? OR user_id IS NULL",
            [Value::Integer(user_id.as_i64())],
        ),
        CategoryScope::System => SqlFilter::new("user_id IS NULL", []),
        CategoryScope::Custom => {
            SqlFilter::new("user_id = ?", [Value::Integer(user_id.as_i64())])
        }
    }
}

/// List a page of the categories in `scope`.
pub fn list_categories(
    user_id: UserID,
    scope: CategoryScope,
    query: &ListQuery,
    config: &PaginationConfig,
    connection: &Connection,
) -> Result<Page<Category>, Error> {
    let mut filter = scope_filter(user_id, scope);
    filter.search(&["name", "description"], query.search_pattern());

    let (page, page_size) = query.page_and_size(config);
    let order_by = query.order_by(
        &[("name", "name"), ("created_at", "created_at")],
        "name",
    );

    let count: u64 = connection.query_row(
        &format!("SELECT COUNT(*) FROM category {}", filter.where_clause()),
        filter.params(),
        |row| row.get(0),
    )?;

    let categories = connection
        .prepare(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM category {} {order_by} {}",
            filter.where_clause(),
            limit_clause(page, page_size)
        ))?
        .query_map(filter.params(), map_category_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(categories, count, page, page_size))
}

/// All active categories `user_id` can use, by name, for select inputs.
pub fn get_visible_categories(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Category>, Error> {
    connection
        .prepare(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM category
            WHERE (user_id = ?1 OR user_id IS NULL) AND is_active = 1
            ORDER BY name, id"
        ))?
        .query_map([user_id], map_category_row)?
        .map(|category| category.map_err(Error::from))
        .collect()
}

/// Replace the editable fields of one of the user's own categories.
///
/// # Errors
/// Returns [Error::UpdateMissingCategory] if `id` is not one of the user's own
/// categories, which includes system categories.
pub fn update_category(
    id: CategoryId,
    user_id: UserID,
    data: CategoryData,
    connection: &Connection,
) -> Result<Category, Error> {
    let existing = match get_category(id, user_id, connection) {
        Ok(category) if !category.is_system => category,
        Ok(_) | Err(Error::NotFound) => return Err(Error::UpdateMissingCategory),
        Err(error) => return Err(error),
    };

    let name = data.name.trim().to_owned();
    if name.is_empty() {
        return Err(Error::EmptyField("name"));
    }

    let color = match data.color.as_deref() {
        Some(color) if !color.trim().is_empty() => validate_color(color)?,
        _ => existing.color.clone(),
    };
    let is_active = data.is_active.unwrap_or(existing.is_active);
    let updated_at = OffsetDateTime::now_utc();

    connection
        .execute(
            "UPDATE category
            SET name = ?1, description = ?2, color = ?3, is_active = ?4, updated_at = ?5
            WHERE id = ?6 AND user_id = ?7",
            params![
                name,
                data.description.trim(),
                color,
                is_active,
                updated_at,
                id,
                user_id
            ],
        )
        .map_err(|error| {
            if is_unique_violation(&error, "category") {
                Error::DuplicateCategoryName(name.clone())
            } else {
                error.into()
            }
        })?;

    Ok(Category {
        name,
        description: data.description.trim().to_owned(),
        color,
        is_active,
        updated_at,
        ..existing
    })
}

/// Delete one of the user's own categories.
///
/// Transactions and budgets in the category become uncategorised and rules
/// for it are deleted.
///
/// # Errors
/// Returns [Error::DeleteMissingCategory] if `id` is not one of the user's own categories.
pub fn delete_category(
    id: CategoryId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM category WHERE id = ?1 AND user_id = ?2 AND is_system = 0",
        params![id, user_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingCategory);
    }

    Ok(())
}
