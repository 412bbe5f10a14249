//! Matching transactions against a user's categorization rules.

use regex::{Regex, RegexBuilder};
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    auth::UserID,
    category::CategoryId,
    money::from_cents,
    rule::core::{Rule, RuleType, get_active_rules},
};

/// The fields of a transaction that rules look at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleInput {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub merchant: String,
    #[serde(default)]
    pub amount: Decimal,
}

/// A rule with its regex compiled ahead of time.
#[derive(Debug)]
struct CompiledRule {
    rule: Rule,
    regex: Option<Regex>,
}

impl CompiledRule {
    fn new(rule: Rule) -> Self {
        let regex = match rule.rule_type {
            RuleType::Regex => RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .build()
                .inspect_err(|error| {
                    tracing::warn!("rule {} has an invalid regex and will never match: {error}", rule.id)
                })
                .ok(),
            _ => None,
        };

        Self { rule, regex }
    }

    fn matches(&self, input: &RuleInput) -> bool {
        rule_matches(&self.rule, self.regex.as_ref(), input)
    }
}

/// Whether `rule` matches `input`.
///
/// A regex rule whose pattern does not compile never matches.
pub fn matches(rule: &Rule, input: &RuleInput) -> bool {
    CompiledRule::new(rule.clone()).matches(input)
}

fn rule_matches(rule: &Rule, regex: Option<&Regex>, input: &RuleInput) -> bool {
    let texts = [input.description.as_str(), input.merchant.as_str()];

    match rule.rule_type {
        RuleType::Contains => {
            let pattern = rule.pattern.to_lowercase();

            !pattern.is_empty()
                && texts
                    .iter()
                    .any(|text| text.to_lowercase().contains(&pattern))
        }
        RuleType::Exact => {
            let pattern = rule.pattern.trim().to_lowercase();

            !pattern.is_empty()
                && texts
                    .iter()
                    .any(|text| text.trim().to_lowercase() == pattern)
        }
        RuleType::Regex => match regex {
            Some(regex) => texts.iter().any(|text| regex.is_match(text)),
            None => false,
        },
        RuleType::AmountRange => match (rule.min_amount, rule.max_amount) {
            (None, None) => false,
            (min_amount, max_amount) => {
                min_amount.is_none_or(|min| input.amount >= min)
                    && max_amount.is_none_or(|max| input.amount <= max)
            }
        },
    }
}

/// A user's active rules in the order they are tried.
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
}

impl RuleEngine {
    /// Build an engine from `rules`, ignoring inactive ones.
    pub fn new(rules: Vec<Rule>) -> Self {
        let mut rules: Vec<_> = rules
            .into_iter()
            .filter(|rule| rule.is_active)
            .map(CompiledRule::new)
            .collect();
        rules.sort_by(|a, b| {
            b.rule
                .priority
                .cmp(&a.rule.priority)
                .then(a.rule.id.cmp(&b.rule.id))
        });

        Self { rules }
    }

    /// Load the active rules of `user_id`.
    pub fn load(user_id: UserID, connection: &Connection) -> Result<Self, Error> {
        Ok(Self::new(get_active_rules(user_id, connection)?))
    }

    /// The first rule that matches `input`.
    pub fn find_matching_rule(&self, input: &RuleInput) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|compiled| compiled.matches(input))
            .map(|compiled| &compiled.rule)
    }

    /// The category of the first rule that matches `input`.
    pub fn find_matching_category(&self, input: &RuleInput) -> Option<CategoryId> {
        self.find_matching_rule(input).map(|rule| rule.category_id)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Run the user's rules over their uncategorized transactions.
///
/// Returns the number of transactions that were given a category.
pub fn apply_rules_to_uncategorized(user_id: UserID, connection: &Connection) -> Result<usize, Error> {
    let engine = RuleEngine::load(user_id, connection)?;
    if engine.is_empty() {
        return Ok(0);
    }

    let uncategorized = connection
        .prepare(
            "SELECT id, description, COALESCE(merchant, ''), amount_cents FROM \"transaction\"
            WHERE user_id = ?1 AND category_id IS NULL AND is_deleted = 0",
        )?
        .query_map([user_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                RuleInput {
                    description: row.get(1)?,
                    merchant: row.get(2)?,
                    amount: from_cents(row.get(3)?),
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let sql_transaction = connection.unchecked_transaction()?;
    let now = OffsetDateTime::now_utc();
    let mut updated_count = 0;

    for (transaction_id, input) in uncategorized {
        if let Some(category_id) = engine.find_matching_category(&input) {
            updated_count += sql_transaction.execute(
                "UPDATE \"transaction\" SET category_id = ?1, updated_at = ?2
                WHERE id = ?3 AND user_id = ?4",
                params![category_id, now, transaction_id, user_id],
            )?;
        }
    }

    sql_transaction.commit()?;

    tracing::debug!("applied rules to {updated_count} transactions for user {user_id}");

    Ok(updated_count)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;
    use time::OffsetDateTime;

    use crate::{
        auth::UserID,
        rule::core::{Rule, RuleType},
    };

    use super::{RuleEngine, RuleInput, matches};

    fn rule(id: i64, rule_type: RuleType, pattern: &str, priority: i64, category_id: i64) -> Rule {
        Rule {
            id,
            user_id: UserID::new(1),
            name: format!("rule {id}"),
            description: String::new(),
            rule_type,
            pattern: pattern.to_owned(),
            min_amount: None,
            max_amount: None,
            category_id,
            priority,
            is_active: true,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn range_rule(min: Option<&str>, max: Option<&str>) -> Rule {
        Rule {
            min_amount: min.map(|min| Decimal::from_str(min).unwrap()),
            max_amount: max.map(|max| Decimal::from_str(max).unwrap()),
            ..rule(1, RuleType::AmountRange, "", 0, 1)
        }
    }

    fn input(description: &str, merchant: &str, amount: &str) -> RuleInput {
        RuleInput {
            description: description.to_owned(),
            merchant: merchant.to_owned(),
            amount: Decimal::from_str(amount).unwrap(),
        }
    }

    #[test]
    fn contains_ignores_case_and_checks_merchant() {
        let rule = rule(1, RuleType::Contains, "COFFEE", 0, 1);

        assert!(matches(&rule, &input("Morning coffee", "", "4.50")));
        assert!(matches(&rule, &input("Card payment", "Coffee Club", "4.50")));
        assert!(!matches(&rule, &input("Tea", "Tea House", "4.50")));
    }

    #[test]
    fn exact_ignores_surrounding_whitespace() {
        let rule = rule(1, RuleType::Exact, "netflix", 0, 1);

        assert!(matches(&rule, &input("  Netflix ", "", "15")));
        assert!(!matches(&rule, &input("Netflix subscription", "", "15")));
    }

    #[test]
    fn regex_searches_case_insensitively() {
        let rule = rule(1, RuleType::Regex, r"^uber\s*(eats)?", 0, 1);

        assert!(matches(&rule, &input("UBER EATS order", "", "20")));
        assert!(!matches(&rule, &input("Paid Uber", "", "20")));
    }

    #[test]
    fn invalid_regex_never_matches() {
        let rule = rule(1, RuleType::Regex, "caf(e", 0, 1);

        assert!(!matches(&rule, &input("caf(e", "caf(e", "1")));
    }

    #[test]
    fn amount_range_bounds_are_inclusive() {
        let rule = range_rule(Some("10"), Some("20"));

        assert!(matches(&rule, &input("", "", "10")));
        assert!(matches(&rule, &input("", "", "20.00")));
        assert!(!matches(&rule, &input("", "", "20.01")));
        assert!(!matches(&rule, &input("", "", "9.99")));
    }

    #[test]
    fn amount_range_missing_bound_is_open() {
        assert!(matches(&range_rule(Some("100"), None), &input("", "", "5000")));
        assert!(matches(&range_rule(None, Some("5")), &input("", "", "0.01")));
        assert!(!matches(&range_rule(None, None), &input("", "", "1")));
    }

    #[test]
    fn highest_priority_wins_then_lowest_id() {
        let engine = RuleEngine::new(vec![
            rule(1, RuleType::Contains, "coffee", 1, 10),
            rule(3, RuleType::Contains, "coffee", 5, 30),
            rule(2, RuleType::Contains, "coffee", 5, 20),
        ]);

        let category = engine.find_matching_category(&input("coffee", "", "3"));

        assert_eq!(category, Some(20));
    }

    #[test]
    fn inactive_rules_are_ignored() {
        let mut inactive = rule(1, RuleType::Contains, "coffee", 10, 10);
        inactive.is_active = false;
        let engine = RuleEngine::new(vec![inactive, rule(2, RuleType::Contains, "coffee", 0, 20)]);

        assert_eq!(engine.find_matching_category(&input("coffee", "", "3")), Some(20));
    }

    #[test]
    fn no_match_gives_none() {
        let engine = RuleEngine::new(vec![rule(1, RuleType::Contains, "coffee", 0, 10)]);

        assert_eq!(engine.find_matching_category(&input("rent", "", "1000")), None);
    }
}
