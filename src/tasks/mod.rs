//! Background jobs: import processing, budget alerts, weekly reports, recurring
//! transactions, closing budget periods and attachment cleanup.

mod alerts;
mod reports;
mod scheduler;

pub use scheduler::{TaskContext, spawn_scheduler};
