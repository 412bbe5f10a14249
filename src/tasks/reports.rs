//! Weekly spending summaries emailed to users who asked for them.

use std::{
    fmt::Write,
    sync::{Arc, Mutex},
};

use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use serde::Serialize;
use time::{Date, Duration};

use crate::{
    Error,
    auth::{User, UserID, get_all_users},
    db,
    html::format_currency,
    money::from_cents,
    notification::{Email, Mailer, NotificationKind, send_notification},
    profile::get_or_create_profile,
    transaction::{DateRangeQuery, get_transaction_summary},
};

/// How many expense categories a report lists.
const TOP_CATEGORY_COUNT: u32 = 10;

/// Total spending in one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySpending {
    pub name: String,
    pub amount: Decimal,
}

/// A user's income and spending for one Monday to Sunday week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyReport {
    pub start_date: Date,
    pub end_date: Date,
    pub total_income: Decimal,
    pub total_expenses: Decimal,
    pub net_flow: Decimal,
    pub transaction_count: u64,
    pub top_categories: Vec<CategorySpending>,
}

/// The Monday to Sunday week before the one containing `today`.
pub fn report_week(today: Date) -> (Date, Date) {
    let days_since_monday = i64::from(today.weekday().number_days_from_monday());
    let end_date = today - Duration::days(days_since_monday + 1);
    let start_date = end_date - Duration::days(6);

    (start_date, end_date)
}

fn get_top_expense_categories(
    user_id: UserID,
    start_date: Date,
    end_date: Date,
    connection: &Connection,
) -> Result<Vec<CategorySpending>, Error> {
    connection
        .prepare(
            "SELECT COALESCE(c.name, 'Uncategorized'), SUM(t.amount_cents) AS total
            FROM \"transaction\" t
            LEFT JOIN category c ON c.id = t.category_id
            WHERE t.user_id = ?1 AND t.is_deleted = 0 AND t.transaction_type = 'expense'
                AND t.date BETWEEN ?2 AND ?3
            GROUP BY t.category_id
            ORDER BY total DESC
            LIMIT ?4",
        )?
        .query_map(
            params![user_id, start_date, end_date, TOP_CATEGORY_COUNT],
            |row| {
                Ok(CategorySpending {
                    name: row.get(0)?,
                    amount: from_cents(row.get(1)?),
                })
            },
        )?
        .map(|maybe_spending| maybe_spending.map_err(Error::from))
        .collect()
}

pub fn build_weekly_report(
    user_id: UserID,
    today: Date,
    connection: &Connection,
) -> Result<WeeklyReport, Error> {
    let (start_date, end_date) = report_week(today);
    let summary = get_transaction_summary(
        user_id,
        DateRangeQuery {
            start_date: Some(start_date),
            end_date: Some(end_date),
        },
        connection,
    )?;

    Ok(WeeklyReport {
        start_date,
        end_date,
        total_income: summary.total_income,
        total_expenses: summary.total_expenses,
        net_flow: summary.net_income,
        transaction_count: summary.transaction_count,
        top_categories: get_top_expense_categories(user_id, start_date, end_date, connection)?,
    })
}

fn report_email(user: &User, report: &WeeklyReport) -> Email {
    let mut body = format!(
        "Hi {},\n\nHere is your summary for {} to {}.\n\n\
        Income: {}\nExpenses: {}\nNet flow: {}\nTransactions: {}\n",
        user.username,
        report.start_date,
        report.end_date,
        format_currency(report.total_income),
        format_currency(report.total_expenses),
        format_currency(report.net_flow),
        report.transaction_count,
    );

    if !report.top_categories.is_empty() {
        body.push_str("\nTop spending categories:\n");
        for category in &report.top_categories {
            // Writing to a String cannot fail.
            let _ = writeln!(body, "- {}: {}", category.name, format_currency(category.amount));
        }
    }

    Email {
        to: user.email.clone(),
        subject: format!("Your weekly report for {}", report.start_date),
        body,
    }
}

/// Email last week's report to every user with weekly reports turned on.
///
/// Returns the number of reports sent.
pub async fn send_weekly_reports(
    mailer: &Mailer,
    db_connection: &Arc<Mutex<Connection>>,
    today: Date,
) -> Result<usize, Error> {
    let emails = {
        let connection = db::lock(db_connection)?;
        let mut emails = Vec::new();

        for user in get_all_users(&connection)? {
            if !get_or_create_profile(user.id, &connection)?.weekly_reports {
                continue;
            }

            let report = build_weekly_report(user.id, today, &connection)?;
            emails.push((user.id, report_email(&user, &report)));
        }

        emails
    };

    for (user_id, email) in &emails {
        send_notification(
            mailer,
            db_connection,
            *user_id,
            NotificationKind::WeeklyReport,
            email,
        )
        .await?;
    }

    tracing::info!("Sent {} weekly reports", emails.len());

    Ok(emails.len())
}
