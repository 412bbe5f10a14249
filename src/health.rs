//! Reports whether the server can reach its database.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    http::StatusCode,
};
use rusqlite::Connection;
use serde::Serialize;

use crate::{AppState, db};

#[derive(Debug, Clone)]
pub struct HealthState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for HealthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: String,
}

fn check_database(db_connection: &Arc<Mutex<Connection>>) -> Result<(), String> {
    let connection = db::lock(db_connection).map_err(|error| error.to_string())?;

    connection
        .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .map(|_| ())
        .map_err(|error| error.to_string())
}

/// 200 when the database answers a trivial query, 503 otherwise.
pub async fn health_check(State(state): State<HealthState>) -> (StatusCode, Json<HealthStatus>) {
    match check_database(&state.db_connection) {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthStatus {
                status: "healthy",
                database: "ok".to_owned(),
            }),
        ),
        Err(error) => {
            tracing::error!("health check failed: {error}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthStatus {
                    status: "unhealthy",
                    database: error,
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Router, http::StatusCode, routing::get};
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::{Value, json};

    use crate::endpoints;

    use super::{HealthState, health_check};

    fn server(connection: Connection) -> TestServer {
        let state = HealthState {
            db_connection: Arc::new(Mutex::new(connection)),
        };
        let app = Router::new()
            .route(endpoints::HEALTH, get(health_check))
            .with_state(state);

        TestServer::try_new(app).unwrap()
    }

    #[tokio::test]
    async fn healthy_when_database_answers() {
        let server = server(Connection::open_in_memory().unwrap());

        let response = server.get(endpoints::HEALTH).await;

        response.assert_status_ok();
        assert_eq!(
            response.json::<Value>(),
            json!({"status": "healthy", "database": "ok"})
        );
    }

    #[tokio::test]
    async fn unhealthy_when_lock_is_poisoned() {
        let db_connection = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let poisoner = db_connection.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();
        let app = Router::new()
            .route(endpoints::HEALTH, get(health_check))
            .with_state(HealthState { db_connection });
        let server = TestServer::try_new(app).unwrap();

        let response = server.get(endpoints::HEALTH).await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.json::<Value>()["status"], "unhealthy");
    }
}
