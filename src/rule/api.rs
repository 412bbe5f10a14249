//! JSON endpoints for categorization rules.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    api::ApiResult,
    auth::UserID,
    db,
    pagination::{ListQuery, Page, PaginationConfig},
    rule::{
        core::{Rule, RuleData, RuleId, create_rule, delete_rule, get_rule, list_rules, update_rule},
        engine::{RuleInput, apply_rules_to_uncategorized, matches},
    },
};

/// The state needed for the rule endpoints.
#[derive(Debug, Clone)]
pub struct RuleState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for RuleState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

pub async fn list_rules_endpoint(
    State(state): State<RuleState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<Rule>>> {
    let connection = db::lock(&state.db_connection)?;
    let page = list_rules(user_id, &query, &state.pagination_config, &connection)?;

    Ok(Json(page))
}

pub async fn get_rule_endpoint(
    State(state): State<RuleState>,
    Extension(user_id): Extension<UserID>,
    Path(rule_id): Path<RuleId>,
) -> ApiResult<Json<Rule>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(get_rule(rule_id, user_id, &connection)?))
}

pub async fn create_rule_endpoint(
    State(state): State<RuleState>,
    Extension(user_id): Extension<UserID>,
    Json(data): Json<RuleData>,
) -> ApiResult<(StatusCode, Json<Rule>)> {
    let connection = db::lock(&state.db_connection)?;
    let rule = create_rule(user_id, data, &connection)?;

    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn update_rule_endpoint(
    State(state): State<RuleState>,
    Extension(user_id): Extension<UserID>,
    Path(rule_id): Path<RuleId>,
    Json(data): Json<RuleData>,
) -> ApiResult<Json<Rule>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(update_rule(rule_id, user_id, data, &connection)?))
}

pub async fn delete_rule_endpoint(
    State(state): State<RuleState>,
    Extension(user_id): Extension<UserID>,
    Path(rule_id): Path<RuleId>,
) -> ApiResult<StatusCode> {
    let connection = db::lock(&state.db_connection)?;
    delete_rule(rule_id, user_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RuleTestRequest {
    #[serde(default)]
    pub transaction_data: RuleInput,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RuleTestResponse {
    pub matches: bool,
    pub rule_pattern: String,
    pub test_data: RuleInput,
}

/// `POST /api/rules/{id}/test`: check a rule against sample transaction fields without saving anything.
pub async fn test_rule_endpoint(
    State(state): State<RuleState>,
    Extension(user_id): Extension<UserID>,
    Path(rule_id): Path<RuleId>,
    Json(request): Json<RuleTestRequest>,
) -> ApiResult<Json<RuleTestResponse>> {
    let rule = {
        let connection = db::lock(&state.db_connection)?;
        get_rule(rule_id, user_id, &connection)?
    };

    Ok(Json(RuleTestResponse {
        matches: matches(&rule, &request.transaction_data),
        rule_pattern: rule.pattern,
        test_data: request.transaction_data,
    }))
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ApplyRulesResponse {
    pub updated_count: usize,
}

/// `POST /api/rules/apply`: categorize the user's uncategorized transactions.
pub async fn apply_rules_endpoint(
    State(state): State<RuleState>,
    Extension(user_id): Extension<UserID>,
) -> ApiResult<Json<ApplyRulesResponse>> {
    let start_time = std::time::Instant::now();
    let connection = db::lock(&state.db_connection)?;
    let updated_count = apply_rules_to_uncategorized(user_id, &connection)?;

    tracing::info!(
        "Applied rules for user {user_id} in {}ms: {updated_count} transactions categorized",
        start_time.elapsed().as_millis()
    );

    Ok(Json(ApplyRulesResponse { updated_count }))
}
