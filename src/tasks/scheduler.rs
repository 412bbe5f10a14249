//! Runs the background jobs on a fixed schedule.

use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use rusqlite::Connection;
use time::OffsetDateTime;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{
    AppState, Error,
    attachment::cleanup_old_attachments,
    budget::close_ended_budget_periods,
    db,
    import::process_pending_imports,
    notification::Mailer,
    tasks::{alerts::send_budget_alerts, reports::send_weekly_reports},
    timezone::local_today,
    transaction::sync_recurring_transactions,
};

/// How many times a failed job run is retried before waiting for the next run.
pub const MAX_RETRIES: usize = 3;

/// What the background jobs need from the application.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub db_connection: Arc<Mutex<Connection>>,
    pub mailer: Mailer,
    /// The local timezone as a canonical timezone name, used to decide what "today" is.
    pub local_timezone: String,
}

impl From<&AppState> for TaskContext {
    fn from(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            mailer: state.mailer.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    ProcessImports,
    SendBudgetAlerts,
    SendWeeklyReports,
    CleanupAttachments,
    SyncRecurringTransactions,
    CloseBudgetPeriods,
}

impl Job {
    pub const ALL: [Job; 6] = [
        Job::ProcessImports,
        Job::SendBudgetAlerts,
        Job::SendWeeklyReports,
        Job::CleanupAttachments,
        Job::SyncRecurringTransactions,
        Job::CloseBudgetPeriods,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Job::ProcessImports => "process_pending_imports",
            Job::SendBudgetAlerts => "send_budget_alerts",
            Job::SendWeeklyReports => "generate_weekly_reports",
            Job::CleanupAttachments => "cleanup_old_attachments",
            Job::SyncRecurringTransactions => "sync_recurring_transactions",
            Job::CloseBudgetPeriods => "close_ended_budget_periods",
        }
    }

    /// How often the job runs.
    pub fn interval(self) -> Duration {
        let seconds = match self {
            Job::ProcessImports => 300,
            Job::SendBudgetAlerts => 3600,
            Job::SendWeeklyReports => 604_800,
            Job::CleanupAttachments
            | Job::SyncRecurringTransactions
            | Job::CloseBudgetPeriods => 86_400,
        };

        Duration::from_secs(seconds)
    }

    /// How long to wait before retrying a failed run.
    pub fn retry_delay(self) -> Duration {
        let seconds = match self {
            Job::ProcessImports => 60,
            Job::SendBudgetAlerts => 300,
            Job::SendWeeklyReports
            | Job::CleanupAttachments
            | Job::SyncRecurringTransactions
            | Job::CloseBudgetPeriods => 3600,
        };

        Duration::from_secs(seconds)
    }

    /// Run the job once, returning how many items it handled.
    pub async fn run(self, context: &TaskContext) -> Result<usize, Error> {
        let today = local_today(&context.local_timezone)?;

        match self {
            Job::ProcessImports => {
                let connection = db::lock(&context.db_connection)?;
                process_pending_imports(&connection)
            }
            Job::SendBudgetAlerts => {
                send_budget_alerts(&context.mailer, &context.db_connection, today).await
            }
            Job::SendWeeklyReports => {
                send_weekly_reports(&context.mailer, &context.db_connection, today).await
            }
            Job::CleanupAttachments => {
                let connection = db::lock(&context.db_connection)?;
                cleanup_old_attachments(OffsetDateTime::now_utc(), &connection)
            }
            Job::SyncRecurringTransactions => {
                let connection = db::lock(&context.db_connection)?;
                sync_recurring_transactions(today, &connection)
            }
            Job::CloseBudgetPeriods => {
                let connection = db::lock(&context.db_connection)?;
                close_ended_budget_periods(today, &connection)
            }
        }
    }
}

/// Call `attempt` until it succeeds, retrying up to `max_retries` times and waiting
/// `retry_delay` before each retry.
///
/// Returns the last error once the retries are used up.
pub async fn run_with_retries<F, Fut>(
    name: &str,
    max_retries: usize,
    retry_delay: Duration,
    mut attempt: F,
) -> Result<usize, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<usize, Error>>,
{
    let mut retries = 0;

    loop {
        match attempt().await {
            Ok(count) => return Ok(count),
            Err(error) if retries < max_retries => {
                retries += 1;
                tracing::warn!(
                    "job {name} failed, retry {retries} of {max_retries} in {retry_delay:?}: {error}"
                );
                tokio::time::sleep(retry_delay).await;
            }
            Err(error) => {
                tracing::error!("job {name} failed, giving up until the next run: {error}");
                return Err(error);
            }
        }
    }
}

/// Start every [Job] on its own interval, the first run happening immediately.
pub fn spawn_scheduler(context: TaskContext) -> Vec<JoinHandle<()>> {
    Job::ALL
        .into_iter()
        .map(|job| {
            let context = context.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(job.interval());
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    interval.tick().await;

                    let result = run_with_retries(
                        job.name(),
                        MAX_RETRIES,
                        job.retry_delay(),
                        || job.run(&context),
                    )
                    .await;

                    if let Ok(count) = result {
                        tracing::debug!("job {} handled {count} items", job.name());
                    }
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use time::macros::date;

    use crate::{
        Error,
        budget::{create_budget, test_utils::budget_data},
        import::{ImportStatus, create_import, get_import},
        notification::Mailer,
        transaction::test_utils::get_test_connection,
    };

    use super::{Job, MAX_RETRIES, TaskContext, run_with_retries};

    #[test]
    fn intervals_match_schedule() {
        assert_eq!(Job::ProcessImports.interval(), Duration::from_secs(300));
        assert_eq!(Job::SendBudgetAlerts.interval(), Duration::from_secs(3600));
        assert_eq!(Job::SendWeeklyReports.interval(), Duration::from_secs(604_800));
        assert_eq!(Job::CloseBudgetPeriods.interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn each_job_has_its_own_retry_delay() {
        assert_eq!(Job::ProcessImports.retry_delay(), Duration::from_secs(60));
        assert_eq!(Job::SendBudgetAlerts.retry_delay(), Duration::from_secs(300));
        for job in [
            Job::SendWeeklyReports,
            Job::CleanupAttachments,
            Job::SyncRecurringTransactions,
            Job::CloseBudgetPeriods,
        ] {
            assert_eq!(job.retry_delay(), Duration::from_secs(3600), "{}", job.name());
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = AtomicUsize::new(0);

        let result = run_with_retries("flaky", MAX_RETRIES, Duration::ZERO, || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::DatabaseLockError)
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_last_retry() {
        let attempts = AtomicUsize::new(0);

        let result = run_with_retries("broken", MAX_RETRIES, Duration::ZERO, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::DatabaseLockError)
        })
        .await;

        assert_eq!(result, Err(Error::DatabaseLockError));
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_the_retry_delay_between_attempts() {
        let attempts = AtomicUsize::new(0);
        let start = tokio::time::Instant::now();

        let result = run_with_retries("slow", 2, Duration::from_secs(60), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::DatabaseLockError)
        })
        .await;

        assert_eq!(result, Err(Error::DatabaseLockError));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test]
    async fn process_imports_job_completes_pending_imports() {
        let (connection, user_id, account_id) = get_test_connection();
        let import = create_import(
            user_id,
            account_id,
            "bank.csv",
            "",
            "date,amount,description\n2024-03-01,-12.50,Coffee\n".to_owned(),
            &connection,
        )
        .unwrap();
        let context = TaskContext {
            db_connection: Arc::new(Mutex::new(connection)),
            mailer: Mailer::memory(),
            local_timezone: "Etc/UTC".to_owned(),
        };

        assert_eq!(Job::ProcessImports.run(&context).await, Ok(1));

        let connection = context.db_connection.lock().unwrap();
        let import = get_import(import.id, user_id, &connection).unwrap();
        assert_eq!(import.status, ImportStatus::Completed);
        assert_eq!(import.processed_records, 1);
    }

    #[tokio::test]
    async fn close_periods_job_closes_ended_budgets() {
        let (connection, user_id, _) = get_test_connection();
        create_budget(
            user_id,
            budget_data("Food", 100, date!(2020 - 01 - 01)),
            &connection,
        )
        .unwrap();
        let context = TaskContext {
            db_connection: Arc::new(Mutex::new(connection)),
            mailer: Mailer::memory(),
            local_timezone: "Etc/UTC".to_owned(),
        };

        assert_eq!(Job::CloseBudgetPeriods.run(&context).await, Ok(1));
    }
}
