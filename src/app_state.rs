//! Everything a request handler or background job needs to reach: the database, the mailer and
//! the server's settings.

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use rusqlite::Connection;
use sha2::{Digest, Sha512};
use time::Duration;

use crate::{
    Error, auth::DEFAULT_COOKIE_DURATION, db::initialize, notification::Mailer,
    pagination::PaginationConfig, timezone::get_local_offset,
};

/// Shared server state.
///
/// Handlers take the slice of this they need through a per-feature state struct implementing
/// [FromRef], so most of the app never sees the whole thing.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Signs and encrypts the session cookie.
    pub cookie_key: Key,
    /// How long a session lasts without activity.
    pub cookie_duration: Duration,
    /// Canonical timezone name used to decide what "today" is, e.g. "Pacific/Auckland".
    pub local_timezone: String,
    pub pagination_config: PaginationConfig,
    pub db_connection: Arc<Mutex<Connection>>,
    /// Delivers budget alerts and weekly reports.
    pub mailer: Mailer,
}

impl AppState {
    /// Set up the server state, creating any missing tables in `db_connection`.
    ///
    /// # Errors
    /// - [Error::InvalidTimezoneError] if `local_timezone` is not a canonical timezone name.
    /// - [Error::SqlError] if the tables cannot be created.
    pub fn new(
        db_connection: Connection,
        cookie_secret: &str,
        local_timezone: &str,
        pagination_config: PaginationConfig,
        mailer: Mailer,
    ) -> Result<Self, Error> {
        if get_local_offset(local_timezone).is_none() {
            return Err(Error::InvalidTimezoneError(local_timezone.to_owned()));
        }

        initialize(&db_connection)?;

        Ok(Self {
            cookie_key: create_cookie_key(cookie_secret),
            cookie_duration: DEFAULT_COOKIE_DURATION,
            local_timezone: local_timezone.to_owned(),
            pagination_config,
            db_connection: Arc::new(Mutex::new(db_connection)),
            mailer,
        })
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Derive the cookie key from `secret`.
///
/// The same secret always gives the same key, so sessions survive a restart.
pub fn create_cookie_key(secret: &str) -> Key {
    Key::from(&Sha512::digest(secret))
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use crate::{Error, notification::Mailer, pagination::PaginationConfig};

    use super::{AppState, create_cookie_key};

    #[test]
    fn rejects_unknown_timezone() {
        let result = AppState::new(
            Connection::open_in_memory().unwrap(),
            "secret",
            "Middle/Earth",
            PaginationConfig::default(),
            Mailer::memory(),
        );

        assert!(matches!(result, Err(Error::InvalidTimezoneError(name)) if name == "Middle/Earth"));
    }

    #[test]
    fn creates_tables() {
        let state = AppState::new(
            Connection::open_in_memory().unwrap(),
            "secret",
            "Pacific/Auckland",
            PaginationConfig::default(),
            Mailer::memory(),
        )
        .unwrap();

        let connection = state.db_connection.lock().unwrap();
        let user_count: i64 = connection
            .query_row("SELECT COUNT(*) FROM user", [], |row| row.get(0))
            .unwrap();
        assert_eq!(user_count, 0);
    }

    #[test]
    fn cookie_key_is_stable_for_a_secret() {
        assert_eq!(
            create_cookie_key("secret").master(),
            create_cookie_key("secret").master()
        );
        assert_ne!(
            create_cookie_key("secret").master(),
            create_cookie_key("other").master()
        );
    }
}
