//! A web app for tracking expenses, budgets and spending habits.
//!
//! This library provides HTML pages for everyday use, a JSON API for everything else and the
//! background jobs that import statements, send budget alerts and weekly reports.

use std::{net::SocketAddr, time::Duration};

use axum_server::Handle;
use tokio::signal;

mod account;
mod alert;
mod api;
mod app_state;
mod attachment;
mod auth;
mod budget;
mod category;
mod choice;
mod dashboard;
mod database_id;
mod db;
mod endpoints;
mod error;
mod error_page;
mod health;
mod html;
mod import;
mod logging;
mod money;
mod navigation;
mod notification;
mod pagination;
mod profile;
mod recurrence;
mod routing;
mod rule;
mod tasks;
#[cfg(test)]
mod test_utils;
mod timezone;
mod transaction;
mod upload;

pub use account::create_default_accounts;
pub use app_state::AppState;
pub use auth::{
    PasswordHash, User, UserID, ValidatedPassword, get_all_users, get_user_by_username,
    update_password,
};
pub use category::seed_system_categories;
pub use db::initialize as initialize_db;
pub use error::Error;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use notification::Mailer;
pub use pagination::PaginationConfig;
pub use profile::get_or_create_profile;
pub use routing::build_router;
pub use tasks::{TaskContext, spawn_scheduler};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to install terminate signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}
