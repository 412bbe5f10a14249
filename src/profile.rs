//! Per-user settings: preferred currency, monthly budget and notification switches.

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    api::ApiResult,
    auth::UserID,
    db,
    money::{DEFAULT_CURRENCY, from_cents, to_cents, validate_currency, validate_positive_amount},
};

/// The settings of a single user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub user_id: UserID,
    pub currency: String,
    pub monthly_budget: Option<Decimal>,
    pub weekly_reports: bool,
    pub budget_alerts: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Create the profile table.
pub fn create_profile_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS profile (
            user_id INTEGER PRIMARY KEY,
            currency TEXT NOT NULL,
            monthly_budget_cents INTEGER,
            weekly_reports INTEGER NOT NULL DEFAULT 1,
            budget_alerts INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

fn map_profile_row(row: &Row) -> Result<UserProfile, rusqlite::Error> {
    let monthly_budget_cents: Option<i64> = row.get(2)?;

    Ok(UserProfile {
        user_id: UserID::new(row.get(0)?),
        currency: row.get(1)?,
        monthly_budget: monthly_budget_cents.map(from_cents),
        weekly_reports: row.get(3)?,
        budget_alerts: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Get the profile of `user_id`, creating one with the defaults if it does not exist yet.
///
/// # Errors
/// Returns [Error::InvalidForeignKey] if the user does not exist.
pub fn get_or_create_profile(user_id: UserID, connection: &Connection) -> Result<UserProfile, Error> {
    let existing = connection
        .prepare(
            "SELECT user_id, currency, monthly_budget_cents, weekly_reports, budget_alerts,
                created_at, updated_at
            FROM profile WHERE user_id = ?1",
        )?
        .query_row([user_id], map_profile_row)
        .optional()?;

    if let Some(profile) = existing {
        return Ok(profile);
    }

    let now = OffsetDateTime::now_utc();
    connection.execute(
        "INSERT INTO profile (user_id, currency, weekly_reports, budget_alerts, created_at, updated_at)
        VALUES (?1, ?2, 1, 1, ?3, ?3)",
        params![user_id, DEFAULT_CURRENCY, now],
    )?;

    Ok(UserProfile {
        user_id,
        currency: DEFAULT_CURRENCY.to_owned(),
        monthly_budget: None,
        weekly_reports: true,
        budget_alerts: true,
        created_at: now,
        updated_at: now,
    })
}

/// Changes to a profile. Fields that are `None` are left unchanged.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProfilePatch {
    pub currency: Option<String>,
    /// `Some(None)` clears the monthly budget.
    #[serde(default, deserialize_with = "deserialize_some")]
    pub monthly_budget: Option<Option<Decimal>>,
    pub weekly_reports: Option<bool>,
    pub budget_alerts: Option<bool>,
}

/// The full set of editable profile fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub currency: String,
    pub monthly_budget: Option<Decimal>,
    pub weekly_reports: bool,
    pub budget_alerts: bool,
}

impl From<ProfileUpdate> for ProfilePatch {
    fn from(update: ProfileUpdate) -> Self {
        Self {
            currency: Some(update.currency),
            monthly_budget: Some(update.monthly_budget),
            weekly_reports: Some(update.weekly_reports),
            budget_alerts: Some(update.budget_alerts),
        }
    }
}

// Distinguishes a missing field from an explicit null.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Apply `patch` to the profile of `user_id`.
///
/// # Errors
/// Returns a validation error if the currency or monthly budget is invalid.
pub fn update_profile(
    user_id: UserID,
    patch: ProfilePatch,
    connection: &Connection,
) -> Result<UserProfile, Error> {
    let mut profile = get_or_create_profile(user_id, connection)?;

    if let Some(currency) = patch.currency {
        profile.currency = validate_currency(&currency)?;
    }

    if let Some(monthly_budget) = patch.monthly_budget {
        profile.monthly_budget = monthly_budget.map(validate_positive_amount).transpose()?;
    }

    if let Some(weekly_reports) = patch.weekly_reports {
        profile.weekly_reports = weekly_reports;
    }

    if let Some(budget_alerts) = patch.budget_alerts {
        profile.budget_alerts = budget_alerts;
    }

    profile.updated_at = OffsetDateTime::now_utc();

    connection.execute(
        "UPDATE profile
        SET currency = ?1, monthly_budget_cents = ?2, weekly_reports = ?3, budget_alerts = ?4,
            updated_at = ?5
        WHERE user_id = ?6",
        params![
            profile.currency,
            profile.monthly_budget.map(to_cents),
            profile.weekly_reports,
            profile.budget_alerts,
            profile.updated_at,
            user_id
        ],
    )?;

    Ok(profile)
}

/// The state needed for the profile endpoints.
#[derive(Debug, Clone)]
pub struct ProfileState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ProfileState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// `GET /api/profile/me`
pub async fn get_profile_endpoint(
    State(state): State<ProfileState>,
    Extension(user_id): Extension<UserID>,
) -> ApiResult<Json<UserProfile>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(get_or_create_profile(user_id, &connection)?))
}

/// `PUT /api/profile/me`
pub async fn put_profile_endpoint(
    State(state): State<ProfileState>,
    Extension(user_id): Extension<UserID>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<UserProfile>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(update_profile(user_id, update.into(), &connection)?))
}

/// `PATCH /api/profile/me`
pub async fn patch_profile_endpoint(
    State(state): State<ProfileState>,
    Extension(user_id): Extension<UserID>,
    Json(patch): Json<ProfilePatch>,
) -> ApiResult<Json<UserProfile>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(update_profile(user_id, patch, &connection)?))
}
