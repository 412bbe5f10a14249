//! Emails that warn users as their budgets are used up.

use std::sync::{Arc, Mutex};

use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use time::{Date, OffsetDateTime, Weekday};

use crate::{
    Error,
    auth::{UserID, get_user_by_id},
    budget::{BudgetId, BudgetUsage, get_all_current_budgets, get_budget_usage},
    choice::text_enum,
    db,
    html::format_currency,
    notification::{Email, Mailer, NotificationKind, send_notification},
    profile::get_or_create_profile,
};

text_enum! {
    /// How close a budget is to being used up.
    pub enum AlertLevel ("alert level") {
        /// Weekly reminder once half the budget is spent.
        Progress => "progress",
        Warning => "warning",
        Exceeded => "exceeded",
    }
}

impl AlertLevel {
    /// The alert for a budget that is `usage_percentage` used on `today`, if any.
    pub fn for_usage(usage_percentage: Decimal, today: Date) -> Option<Self> {
        if usage_percentage >= Decimal::from(100) {
            Some(AlertLevel::Exceeded)
        } else if usage_percentage >= Decimal::from(80) {
            Some(AlertLevel::Warning)
        } else if usage_percentage >= Decimal::from(50) && today.weekday() == Weekday::Monday {
            Some(AlertLevel::Progress)
        } else {
            None
        }
    }

    fn notification_kind(self) -> NotificationKind {
        match self {
            AlertLevel::Progress => NotificationKind::BudgetProgress,
            AlertLevel::Warning => NotificationKind::BudgetWarning,
            AlertLevel::Exceeded => NotificationKind::BudgetExceeded,
        }
    }
}

/// An alert that is due to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetAlert {
    pub user_id: UserID,
    pub level: AlertLevel,
    pub usage: BudgetUsage,
    pub email: Email,
}

fn alert_sent(
    budget_id: BudgetId,
    period_start: Date,
    level: AlertLevel,
    connection: &Connection,
) -> Result<bool, Error> {
    let count: u64 = connection.query_row(
        "SELECT COUNT(*) FROM budget_alert WHERE budget_id = ?1 AND period_start = ?2 AND level = ?3",
        params![budget_id, period_start, level],
        |row| row.get(0),
    )?;

    Ok(count > 0)
}

/// Remember that `level` was sent for the budget period starting on `period_start`.
pub fn record_budget_alert(
    budget_id: BudgetId,
    period_start: Date,
    level: AlertLevel,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "INSERT OR IGNORE INTO budget_alert (budget_id, period_start, level, sent_at)
        VALUES (?1, ?2, ?3, ?4)",
        params![budget_id, period_start, level, OffsetDateTime::now_utc()],
    )?;

    Ok(())
}

fn alert_email(to: &str, level: AlertLevel, usage: &BudgetUsage) -> Email {
    let budget = &usage.budget;
    let subject = match level {
        AlertLevel::Exceeded => format!("Budget exceeded: {}", budget.name),
        AlertLevel::Warning => format!("Budget warning: {}", budget.name),
        AlertLevel::Progress => format!("Budget progress: {}", budget.name),
    };
    let body = format!(
        "You have spent {} of your {} budget \"{}\" ({}%) for {} to {}.\n\
        Remaining: {}",
        format_currency(usage.spent_amount),
        format_currency(budget.effective_amount()),
        budget.name,
        usage.usage_percentage,
        budget.start_date,
        budget.end_date,
        format_currency(usage.remaining_amount),
    );

    Email {
        to: to.to_owned(),
        subject,
        body,
    }
}

/// The alerts for current budgets that have not been sent yet this period.
///
/// Only users with budget alerts turned on in their profile are included.
pub fn get_due_budget_alerts(today: Date, connection: &Connection) -> Result<Vec<BudgetAlert>, Error> {
    let mut alerts = Vec::new();

    for budget in get_all_current_budgets(today, connection)? {
        let user_id = budget.user_id;
        if !get_or_create_profile(user_id, connection)?.budget_alerts {
            continue;
        }

        let usage = get_budget_usage(budget, connection)?;
        let Some(level) = AlertLevel::for_usage(usage.usage_percentage, today) else {
            continue;
        };

        if alert_sent(usage.budget.id, usage.budget.start_date, level, connection)? {
            continue;
        }

        let user = get_user_by_id(user_id, connection)?;
        alerts.push(BudgetAlert {
            user_id,
            level,
            email: alert_email(&user.email, level, &usage),
            usage,
        });
    }

    Ok(alerts)
}

/// Email each due budget alert and record it so it is not sent again this period.
///
/// Returns the number of alerts sent.
pub async fn send_budget_alerts(
    mailer: &Mailer,
    db_connection: &Arc<Mutex<Connection>>,
    today: Date,
) -> Result<usize, Error> {
    let alerts = {
        let connection = db::lock(db_connection)?;
        get_due_budget_alerts(today, &connection)?
    };

    for alert in &alerts {
        send_notification(
            mailer,
            db_connection,
            alert.user_id,
            alert.level.notification_kind(),
            &alert.email,
        )
        .await?;

        let connection = db::lock(db_connection)?;
        record_budget_alert(
            alert.usage.budget.id,
            alert.usage.budget.start_date,
            alert.level,
            &connection,
        )?;
    }

    if !alerts.is_empty() {
        tracing::info!("Sent {} budget alerts", alerts.len());
    }

    Ok(alerts.len())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rust_decimal::Decimal;
    use time::macros::date;

    use crate::{
        budget::{create_budget, test_utils::budget_data},
        notification::Mailer,
        profile::{ProfilePatch, update_profile},
        transaction::test_utils::{create_test_transaction, expense, get_test_connection},
    };

    use super::{AlertLevel, get_due_budget_alerts, send_budget_alerts};

    #[test]
    fn level_depends_on_usage_and_weekday() {
        let monday = date!(2024 - 03 - 04);
        let tuesday = date!(2024 - 03 - 05);

        assert_eq!(
            AlertLevel::for_usage(Decimal::from(100), tuesday),
            Some(AlertLevel::Exceeded)
        );
        assert_eq!(
            AlertLevel::for_usage(Decimal::from(80), tuesday),
            Some(AlertLevel::Warning)
        );
        assert_eq!(AlertLevel::for_usage(Decimal::from(60), tuesday), None);
        assert_eq!(
            AlertLevel::for_usage(Decimal::from(60), monday),
            Some(AlertLevel::Progress)
        );
        assert_eq!(AlertLevel::for_usage(Decimal::from(49), monday), None);
    }

    #[tokio::test]
    async fn alert_is_sent_once_per_period() {
        let (connection, user_id, account_id) = get_test_connection();
        create_budget(
            user_id,
            budget_data("Food", 100, date!(2024 - 03 - 01)),
            &connection,
        )
        .unwrap();
        create_test_transaction(
            user_id,
            expense(85, date!(2024 - 03 - 02), "Groceries", account_id),
            &connection,
        );
        let db_connection = Arc::new(Mutex::new(connection));
        let mailer = Mailer::memory();
        let today = date!(2024 - 03 - 05);

        assert_eq!(send_budget_alerts(&mailer, &db_connection, today).await, Ok(1));
        assert_eq!(send_budget_alerts(&mailer, &db_connection, today).await, Ok(0));

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@example.com");
        assert_eq!(sent[0].subject, "Budget warning: Food");
        assert!(sent[0].body.contains("$85.00 of your $100.00"));

        create_test_transaction(
            user_id,
            expense(20, date!(2024 - 03 - 04), "Takeaways", account_id),
            &db_connection.lock().unwrap(),
        );
        assert_eq!(send_budget_alerts(&mailer, &db_connection, today).await, Ok(1));
        assert_eq!(mailer.sent()[1].subject, "Budget exceeded: Food");
    }

    #[test]
    fn users_can_turn_alerts_off() {
        let (connection, user_id, account_id) = get_test_connection();
        create_budget(
            user_id,
            budget_data("Food", 100, date!(2024 - 03 - 01)),
            &connection,
        )
        .unwrap();
        create_test_transaction(
            user_id,
            expense(150, date!(2024 - 03 - 02), "Feast", account_id),
            &connection,
        );
        update_profile(
            user_id,
            ProfilePatch {
                budget_alerts: Some(false),
                ..Default::default()
            },
            &connection,
        )
        .unwrap();

        let alerts = get_due_budget_alerts(date!(2024 - 03 - 05), &connection).unwrap();

        assert!(alerts.is_empty());
    }
}
