//! Exporting transactions as CSV.

use rusqlite::Connection;

use crate::{
    Error,
    auth::UserID,
    money::from_cents,
    transaction::core::{TransactionQuery, transaction_filter},
};

pub const EXPORT_HEADER: [&str; 8] = [
    "Type",
    "Date",
    "Amount",
    "Currency",
    "Description",
    "Category",
    "Account",
    "Merchant",
];

/// Write the user's transactions that match `query` as CSV, newest first.
///
/// Pagination in `query` is ignored.
///
/// # Errors
/// Returns [Error::InvalidDateRange] if `end_date` is before `start_date`.
pub fn export_transactions_csv(
    user_id: UserID,
    query: &TransactionQuery,
    connection: &Connection,
) -> Result<String, Error> {
    let filter = transaction_filter(user_id, query)?;

    let mut statement = connection.prepare(&format!(
        "SELECT t.transaction_type, t.date, t.amount_cents, t.currency, t.description,
            COALESCE(c.name, ''), a.name, t.merchant
        FROM \"transaction\" t
        INNER JOIN account a ON a.id = t.account_id
        LEFT JOIN category c ON c.id = t.category_id
        {}
        ORDER BY t.date DESC, t.id DESC",
        filter.where_clause()
    ))?;
    let mut rows = statement.query(filter.params())?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADER).map_err(csv_error)?;

    while let Some(row) = rows.next()? {
        let record = [
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            from_cents(row.get(2)?).to_string(),
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ];
        writer.write_record(&record).map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|error| Error::InvalidCSV(error.to_string()))?;

    String::from_utf8(bytes).map_err(|error| Error::InvalidCSV(error.to_string()))
}

fn csv_error(error: csv::Error) -> Error {
    tracing::error!("could not write CSV: {error}");
    Error::InvalidCSV(error.to_string())
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use crate::transaction::{
        core::{
            TransactionQuery, delete_transaction,
            test_utils::{create_test_transaction, expense, get_test_connection},
        },
        export::export_transactions_csv,
    };

    #[test]
    fn exports_header_and_rows() {
        let (connection, user_id, account_id) = get_test_connection();
        let mut lunch = expense(12, date!(2024 - 03 - 01), "Lunch, with Bob", account_id);
        lunch.merchant = "Cafe".to_owned();
        create_test_transaction(user_id, lunch, &connection);
        let deleted = create_test_transaction(
            user_id,
            expense(5, date!(2024 - 03 - 02), "Snacks", account_id),
            &connection,
        );
        delete_transaction(deleted.id, user_id, &connection).unwrap();

        let csv = export_transactions_csv(user_id, &TransactionQuery::default(), &connection)
            .unwrap();

        assert_eq!(
            csv,
            "Type,Date,Amount,Currency,Description,Category,Account,Merchant\n\
            expense,2024-03-01,12.00,USD,\"Lunch, with Bob\",,Everyday,Cafe\n"
        );
    }
}
