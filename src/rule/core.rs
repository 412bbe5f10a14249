use regex::RegexBuilder;
use rusqlite::{Connection, Row, params, types::Value};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    auth::UserID,
    category::{CategoryId, ensure_category_visible},
    choice::text_enum,
    database_id::DatabaseId,
    db::SqlFilter,
    money::{from_cents, round_money, to_cents},
    pagination::{ListQuery, Page, PaginationConfig, limit_clause},
};

pub type RuleId = DatabaseId;

text_enum! {
    /// How a rule decides whether a transaction matches.
    pub enum RuleType ("rule type") {
        /// The pattern appears in the description or merchant.
        Contains => "contains",
        /// The pattern is a regular expression found in the description or merchant.
        Regex => "regex",
        /// The description or merchant equals the pattern.
        Exact => "exact",
        /// The amount is within the bounds.
        AmountRange => "amount_range",
    }
}

/// A rule that assigns a category to transactions it matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub id: RuleId,
    pub user_id: UserID,
    pub name: String,
    pub description: String,
    pub rule_type: RuleType,
    pub pattern: String,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub category_id: CategoryId,
    /// Rules with a higher priority are tried first.
    pub priority: i64,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The editable fields of a rule.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleData {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub rule_type: RuleType,
    #[serde(default)]
    pub pattern: String,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub category_id: CategoryId,
    #[serde(default)]
    pub priority: i64,
    pub is_active: Option<bool>,
}

pub fn create_rule_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS rule (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            rule_type TEXT NOT NULL,
            pattern TEXT NOT NULL DEFAULT '',
            min_amount_cents INTEGER,
            max_amount_cents INTEGER,
            category_id INTEGER NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE,
            FOREIGN KEY(category_id) REFERENCES category(id) ON DELETE CASCADE
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_rule_user_priority ON rule(user_id, is_active, priority)",
        (),
    )?;

    Ok(())
}

const RULE_COLUMNS: &str = "id, user_id, name, description, rule_type, pattern, \
    min_amount_cents, max_amount_cents, category_id, priority, is_active, created_at, updated_at";

pub fn map_rule_row(row: &Row) -> Result<Rule, rusqlite::Error> {
    Ok(Rule {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        rule_type: row.get(4)?,
        pattern: row.get(5)?,
        min_amount: row.get::<_, Option<i64>>(6)?.map(from_cents),
        max_amount: row.get::<_, Option<i64>>(7)?.map(from_cents),
        category_id: row.get(8)?,
        priority: row.get(9)?,
        is_active: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// The checked fields of a rule, ready to be stored.
struct ValidRule {
    name: String,
    description: String,
    rule_type: RuleType,
    pattern: String,
    min_amount: Option<Decimal>,
    max_amount: Option<Decimal>,
    category_id: CategoryId,
    priority: i64,
}

fn validate_rule(user_id: UserID, data: &RuleData, connection: &Connection) -> Result<ValidRule, Error> {
    let name = data.name.trim();
    if name.is_empty() {
        return Err(Error::EmptyField("name"));
    }

    let pattern = data.pattern.trim();
    let (min_amount, max_amount) = match data.rule_type {
        RuleType::AmountRange => {
            let min_amount = data.min_amount.map(round_money);
            let max_amount = data.max_amount.map(round_money);

            match (min_amount, max_amount) {
                (None, None) => {
                    return Err(Error::InvalidRule(
                        "amount range rules need a minimum or maximum amount".to_owned(),
                    ));
                }
                (Some(min), Some(max)) if min > max => {
                    return Err(Error::InvalidRule(format!(
                        "the minimum amount {min} is greater than the maximum amount {max}"
                    )));
                }
                bounds => bounds,
            }
        }
        RuleType::Contains | RuleType::Exact | RuleType::Regex => {
            if pattern.is_empty() {
                return Err(Error::EmptyField("pattern"));
            }

            (None, None)
        }
    };

    if data.rule_type == RuleType::Regex {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|error| Error::InvalidRegex(error.to_string()))?;
    }

    ensure_category_visible(data.category_id, user_id, connection)?;

    Ok(ValidRule {
        name: name.to_owned(),
        description: data.description.trim().to_owned(),
        rule_type: data.rule_type,
        pattern: pattern.to_owned(),
        min_amount,
        max_amount,
        category_id: data.category_id,
        priority: data.priority,
    })
}

/// Create a categorization rule for `user_id`.
///
/// # Errors
/// Returns a validation error if:
/// - the name is blank,
/// - a text rule has no pattern or a regex rule's pattern does not compile,
/// - an amount range rule has no bounds or its minimum exceeds its maximum,
/// - the category is not visible to the user.
pub fn create_rule(user_id: UserID, data: RuleData, connection: &Connection) -> Result<Rule, Error> {
    let rule = validate_rule(user_id, &data, connection)?;
    let is_active = data.is_active.unwrap_or(true);
    let now = OffsetDateTime::now_utc();

    connection.execute(
        "INSERT INTO rule
            (user_id, name, description, rule_type, pattern, min_amount_cents, max_amount_cents,
             category_id, priority, is_active, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            user_id,
            rule.name,
            rule.description,
            rule.rule_type,
            rule.pattern,
            rule.min_amount.map(to_cents),
            rule.max_amount.map(to_cents),
            rule.category_id,
            rule.priority,
            is_active,
            now
        ],
    )?;

    Ok(Rule {
        id: connection.last_insert_rowid(),
        user_id,
        name: rule.name,
        description: rule.description,
        rule_type: rule.rule_type,
        pattern: rule.pattern,
        min_amount: rule.min_amount,
        max_amount: rule.max_amount,
        category_id: rule.category_id,
        priority: rule.priority,
        is_active,
        created_at: now,
        updated_at: now,
    })
}

/// Get one of the user's rules.
///
/// # Errors
/// Returns [Error::NotFound] if the rule does not exist or belongs to another user.
pub fn get_rule(id: RuleId, user_id: UserID, connection: &Connection) -> Result<Rule, Error> {
    connection
        .prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM rule WHERE id = ?1 AND user_id = ?2"
        ))?
        .query_row(params![id, user_id], map_rule_row)
        .map_err(Error::from)
}

/// The user's active rules, highest priority first with ties broken by ID.
pub fn get_active_rules(user_id: UserID, connection: &Connection) -> Result<Vec<Rule>, Error> {
    connection
        .prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM rule
            WHERE user_id = ?1 AND is_active = 1
            ORDER BY priority DESC, id ASC"
        ))?
        .query_map([user_id], map_rule_row)?
        .map(|rule| rule.map_err(Error::from))
        .collect()
}

/// List a page of the user's rules.
pub fn list_rules(
    user_id: UserID,
    query: &ListQuery,
    config: &PaginationConfig,
    connection: &Connection,
) -> Result<Page<Rule>, Error> {
    let mut filter = SqlFilter::new("user_id = ?", [Value::Integer(user_id.as_i64())]);
    filter.search(&["name", "pattern", "description"], query.search_pattern());

    let (page, page_size) = query.page_and_size(config);
    let order_by = query.order_by(
        &[("priority", "priority"), ("created_at", "created_at")],
        "-priority",
    );

    let count: u64 = connection.query_row(
        &format!("SELECT COUNT(*) FROM rule {}", filter.where_clause()),
        filter.params(),
        |row| row.get(0),
    )?;

    let rules = connection
        .prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM rule {} {order_by} {}",
            filter.where_clause(),
            limit_clause(page, page_size)
        ))?
        .query_map(filter.params(), map_rule_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(rules, count, page, page_size))
}

/// Replace the editable fields of a rule.
///
/// # Errors
/// Returns [Error::UpdateMissingRule] if the rule does not belong to the user, or a
/// validation error as for [create_rule].
pub fn update_rule(
    id: RuleId,
    user_id: UserID,
    data: RuleData,
    connection: &Connection,
) -> Result<Rule, Error> {
    let existing = match get_rule(id, user_id, connection) {
        Ok(rule) => rule,
        Err(Error::NotFound) => return Err(Error::UpdateMissingRule),
        Err(error) => return Err(error),
    };

    let rule = validate_rule(user_id, &data, connection)?;
    let is_active = data.is_active.unwrap_or(existing.is_active);
    let updated_at = OffsetDateTime::now_utc();

    connection.execute(
        "UPDATE rule
        SET name = ?1, description = ?2, rule_type = ?3, pattern = ?4, min_amount_cents = ?5,
            max_amount_cents = ?6, category_id = ?7, priority = ?8, is_active = ?9,
            updated_at = ?10
        WHERE id = ?11 AND user_id = ?12",
        params![
            rule.name,
            rule.description,
            rule.rule_type,
            rule.pattern,
            rule.min_amount.map(to_cents),
            rule.max_amount.map(to_cents),
            rule.category_id,
            rule.priority,
            is_active,
            updated_at,
            id,
            user_id
        ],
    )?;

    Ok(Rule {
        name: rule.name,
        description: rule.description,
        rule_type: rule.rule_type,
        pattern: rule.pattern,
        min_amount: rule.min_amount,
        max_amount: rule.max_amount,
        category_id: rule.category_id,
        priority: rule.priority,
        is_active,
        updated_at,
        ..existing
    })
}

/// Delete one of the user's rules.
///
/// # Errors
/// Returns [Error::DeleteMissingRule] if the rule does not belong to the user.
pub fn delete_rule(id: RuleId, user_id: UserID, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM rule WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingRule);
    }

    Ok(())
}
