//! Creating the due copies of recurring transactions.

use rusqlite::{Connection, params};
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    recurrence::due_occurrences,
    transaction::core::{
        NewTransaction, Transaction, TransactionData, TRANSACTION_COLUMNS, fingerprint,
        insert_transaction, map_transaction_row,
    },
};

/// The recurring transactions of every user that are due on or before `today`.
fn get_due_recurring_transactions(
    today: Date,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
            WHERE is_recurring = 1 AND is_deleted = 0 AND recurrence IS NOT NULL
                AND next_occurrence IS NOT NULL AND next_occurrence <= ?1
            ORDER BY id"
        ))?
        .query_map([today], map_transaction_row)?
        .map(|transaction| transaction.map_err(Error::from))
        .collect()
}

/// A one-off copy of `template` dated `date`.
fn occurrence_of(template: &Transaction, date: Date) -> NewTransaction {
    let data = TransactionData {
        transaction_type: template.transaction_type,
        amount: template.amount,
        currency: Some(template.currency.clone()),
        date,
        description: template.description.clone(),
        notes: template.notes.clone(),
        category_id: template.category_id,
        account_id: template.account_id,
        merchant: template.merchant.clone(),
        location: template.location.clone(),
        tags: template.tags.clone(),
        is_recurring: false,
        recurrence: None,
        next_occurrence: None,
        external_id: None,
    };
    let fingerprint = fingerprint(
        template.user_id,
        date,
        data.amount,
        &data.merchant,
        data.account_id,
        None,
    );

    NewTransaction { data, fingerprint }
}

/// Create a non-recurring copy of each recurring transaction for every date it was due
/// up to and including `today`, then move its next occurrence past `today`.
///
/// A template whose next occurrence cannot be computed is logged and skipped.
///
/// Returns the number of transactions created.
pub fn sync_recurring_transactions(today: Date, connection: &Connection) -> Result<usize, Error> {
    let templates = get_due_recurring_transactions(today, connection)?;
    let sql_transaction = connection.unchecked_transaction()?;
    let mut created_count = 0;

    for template in templates {
        let (Some(frequency), Some(next_occurrence)) =
            (template.recurrence, template.next_occurrence)
        else {
            continue;
        };

        let (due_dates, next_occurrence) =
            match due_occurrences(frequency, next_occurrence, today) {
                Ok(occurrences) => occurrences,
                Err(error) => {
                    tracing::error!(
                        "could not schedule recurring transaction {}: {error}",
                        template.id
                    );
                    continue;
                }
            };

        for date in due_dates {
            insert_transaction(
                template.user_id,
                occurrence_of(&template, date),
                None,
                None,
                &sql_transaction,
            )?;
            created_count += 1;
        }

        sql_transaction.execute(
            "UPDATE \"transaction\" SET next_occurrence = ?1, updated_at = ?2 WHERE id = ?3",
            params![next_occurrence, OffsetDateTime::now_utc(), template.id],
        )?;
    }

    sql_transaction.commit()?;

    Ok(created_count)
}
