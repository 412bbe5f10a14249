//! Outgoing email and the record of what has been sent to whom.

use std::{
    fmt::Debug,
    sync::{Arc, Mutex},
};

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use rusqlite::{Connection, params};
use time::OffsetDateTime;

use crate::{Error, auth::UserID, db};

/// A plain text email.
#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Why a notification was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    BudgetExceeded,
    BudgetWarning,
    BudgetProgress,
    WeeklyReport,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BudgetExceeded => "budget_exceeded",
            NotificationKind::BudgetWarning => "budget_warning",
            NotificationKind::BudgetProgress => "budget_progress",
            NotificationKind::WeeklyReport => "weekly_report",
        }
    }
}

#[derive(Clone)]
enum Transport {
    Log,
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    Memory(Arc<Mutex<Vec<Email>>>),
}

/// Delivers [Email]s.
///
/// Without an SMTP relay configured, mail is written to the log instead.
#[derive(Clone)]
pub struct Mailer {
    from_email: String,
    transport: Transport,
}

impl Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let transport = match self.transport {
            Transport::Log => "log",
            Transport::Smtp(_) => "smtp",
            Transport::Memory(_) => "memory",
        };

        f.debug_struct("Mailer")
            .field("from_email", &self.from_email)
            .field("transport", &transport)
            .finish()
    }
}

impl Mailer {
    /// A mailer that logs each email at info level.
    pub fn log(from_email: &str) -> Self {
        Self {
            from_email: from_email.to_owned(),
            transport: Transport::Log,
        }
    }

    /// A mailer that sends through the SMTP relay at `host` using TLS.
    ///
    /// # Errors
    ///
    /// Returns [Error::MailError] if the relay cannot be configured.
    pub fn smtp(
        host: &str,
        credentials: Option<(String, String)>,
        from_email: &str,
    ) -> Result<Self, Error> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|error| Error::MailError(error.to_string()))?;

        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            from_email: from_email.to_owned(),
            transport: Transport::Smtp(builder.build()),
        })
    }

    /// A mailer that keeps every email in memory.
    pub fn memory() -> Self {
        Self {
            from_email: "test@expense-tracker.local".to_owned(),
            transport: Transport::Memory(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// The emails collected by a [Mailer::memory] mailer.
    pub fn sent(&self) -> Vec<Email> {
        match &self.transport {
            Transport::Memory(outbox) => outbox
                .lock()
                .map(|outbox| outbox.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Deliver `email`.
    ///
    /// # Errors
    ///
    /// Returns [Error::MailError] if an address is invalid or the relay rejects the message.
    pub async fn send(&self, email: &Email) -> Result<(), Error> {
        match &self.transport {
            Transport::Log => {
                tracing::info!(
                    "Email to {}: {}\n{}",
                    email.to,
                    email.subject,
                    email.body
                );
                Ok(())
            }
            Transport::Memory(outbox) => {
                outbox
                    .lock()
                    .map_err(|_| Error::MailError("outbox lock poisoned".to_owned()))?
                    .push(email.clone());
                Ok(())
            }
            Transport::Smtp(transport) => {
                let message = self.build_message(email)?;

                transport
                    .send(message)
                    .await
                    .map(|_| ())
                    .map_err(|error| Error::MailError(error.to_string()))
            }
        }
    }

    fn build_message(&self, email: &Email) -> Result<Message, Error> {
        let from: Mailbox = self
            .from_email
            .parse()
            .map_err(|error: lettre::address::AddressError| Error::MailError(error.to_string()))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|error: lettre::address::AddressError| Error::MailError(error.to_string()))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|error| Error::MailError(error.to_string()))
    }
}

/// Create the table that records sent notifications.
pub fn create_notification_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS notification (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            subject TEXT NOT NULL,
            sent_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

/// Record that `subject` was sent to `user_id`.
pub fn record_notification(
    user_id: UserID,
    kind: NotificationKind,
    subject: &str,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "INSERT INTO notification (user_id, kind, subject, sent_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, kind.as_str(), subject, OffsetDateTime::now_utc()],
    )?;

    Ok(())
}

/// Send `email` and then record it against `user_id`.
///
/// The database lock is not held while the email is sent.
pub async fn send_notification(
    mailer: &Mailer,
    db_connection: &Arc<Mutex<Connection>>,
    user_id: UserID,
    kind: NotificationKind,
    email: &Email,
) -> Result<(), Error> {
    mailer.send(email).await?;

    let connection = db::lock(db_connection)?;
    record_notification(user_id, kind, &email.subject, &connection)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rusqlite::{Connection, params};

    use crate::{
        auth::{PasswordHash, UserID, create_user},
        db::initialize,
    };

    use super::{Email, Mailer, NotificationKind, send_notification};

    fn count_notifications(user_id: UserID, kind: NotificationKind, connection: &Connection) -> u64 {
        connection
            .query_row(
                "SELECT COUNT(*) FROM notification WHERE user_id = ?1 AND kind = ?2",
                params![user_id, kind.as_str()],
                |row| row.get(0),
            )
            .unwrap()
    }

    fn email() -> Email {
        Email {
            to: "alice@example.com".to_owned(),
            subject: "Budget exceeded".to_owned(),
            body: "You have spent it all.".to_owned(),
        }
    }

    #[tokio::test]
    async fn memory_mailer_collects_email() {
        let mailer = Mailer::memory();

        mailer.send(&email()).await.unwrap();

        assert_eq!(mailer.sent(), vec![email()]);
    }

    #[tokio::test]
    async fn log_mailer_accepts_email() {
        assert!(Mailer::log("noreply@example.com").send(&email()).await.is_ok());
    }

    #[test]
    fn smtp_message_needs_valid_addresses() {
        let mailer = Mailer::log("not an address");

        assert!(mailer.build_message(&email()).is_err());
    }

    #[tokio::test]
    async fn sent_notifications_are_recorded() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let user = create_user(
            "alice",
            "alice@example.com",
            PasswordHash::new_unchecked("hunter2"),
            &connection,
        )
        .unwrap();
        let db_connection = Arc::new(Mutex::new(connection));
        let mailer = Mailer::memory();

        send_notification(
            &mailer,
            &db_connection,
            user.id,
            NotificationKind::BudgetExceeded,
            &email(),
        )
        .await
        .unwrap();

        let connection = db_connection.lock().unwrap();
        assert_eq!(
            count_notifications(user.id, NotificationKind::BudgetExceeded, &connection),
            1
        );
        assert_eq!(
            count_notifications(user.id, NotificationKind::WeeklyReport, &connection),
            0
        );
    }
}
