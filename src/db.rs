//! Database set up and access to the shared connection.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{
    Connection, ParamsFromIter, Transaction as SqlTransaction, TransactionBehavior,
    params_from_iter, types::Value,
};

use crate::{
    Error,
    account::create_account_table,
    attachment::create_attachment_table,
    auth::create_user_table,
    budget::create_budget_tables,
    category::create_category_table,
    import::create_import_table,
    notification::create_notification_table,
    profile::create_profile_table,
    rule::create_rule_table,
    transaction::create_transaction_table,
};

/// Create all the tables and indexes for the application.
///
/// Safe to call on an existing database, tables that exist are left as is.
///
/// # Errors
/// Returns an error if a table cannot be created.
pub fn initialize(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.pragma_update(None, "foreign_keys", "ON")?;

    let transaction =
        SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_profile_table(&transaction)?;
    create_category_table(&transaction)?;
    create_account_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_rule_table(&transaction)?;
    create_budget_tables(&transaction)?;
    create_import_table(&transaction)?;
    create_attachment_table(&transaction)?;
    create_notification_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

/// Acquire the lock on the shared database connection.
///
/// # Errors
/// Returns [Error::DatabaseLockError] if the lock is poisoned.
pub fn lock(db_connection: &Arc<Mutex<Connection>>) -> Result<MutexGuard<'_, Connection>, Error> {
    db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)
}

/// `WHERE` conditions and their parameters for list queries.
///
/// Conditions use anonymous `?` placeholders, bound in the order they were added.
#[derive(Debug, Default, Clone)]
pub struct SqlFilter {
    conditions: Vec<String>,
    params: Vec<Value>,
}

impl SqlFilter {
    /// Start a filter with `condition`.
    pub fn new(condition: &str, params: impl IntoIterator<Item = Value>) -> Self {
        let mut filter = Self::default();
        filter.and(condition, params);
        filter
    }

    /// Add `condition`, joined to the others with `AND`.
    pub fn and(&mut self, condition: &str, params: impl IntoIterator<Item = Value>) -> &mut Self {
        self.conditions.push(format!("({condition})"));
        self.params.extend(params);
        self
    }

    /// Add a case-insensitive `LIKE` match of `pattern` against any of `columns`.
    pub fn search(&mut self, columns: &[&str], pattern: Option<String>) -> &mut Self {
        if let Some(pattern) = pattern {
            let condition = columns
                .iter()
                .map(|column| format!("LOWER(COALESCE({column}, '')) LIKE ?"))
                .collect::<Vec<_>>()
                .join(" OR ");
            let params = columns.iter().map(|_| Value::Text(pattern.clone()));

            self.and(&condition, params.collect::<Vec<_>>());
        }

        self
    }

    /// The `WHERE` clause, or an empty string if there are no conditions.
    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn params(&self) -> ParamsFromIter<std::slice::Iter<'_, Value>> {
        params_from_iter(self.params.iter())
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::{Connection, types::Value};

    use super::{SqlFilter, initialize};

    #[test]
    fn filter_builds_where_clause() {
        let mut filter = SqlFilter::new("user_id = ?", [Value::Integer(1)]);
        filter.search(&["name", "notes"], Some("%cafe%".to_owned()));

        assert_eq!(
            filter.where_clause(),
            "WHERE (user_id = ?) AND (LOWER(COALESCE(name, '')) LIKE ? OR LOWER(COALESCE(notes, '')) LIKE ?)"
        );
        assert_eq!(filter.params.len(), 3);
    }

    #[test]
    fn filter_without_search_is_unchanged() {
        let mut filter = SqlFilter::new("user_id = ?", [Value::Integer(1)]);
        filter.search(&["name"], None);

        assert_eq!(filter.where_clause(), "WHERE (user_id = ?)");
    }

    #[test]
    fn initialize_is_idempotent() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).unwrap();
        initialize(&connection).unwrap();
    }

    #[test]
    fn enables_foreign_keys() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();

        let enabled: i64 = connection
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();

        assert_eq!(enabled, 1);
    }
}
