//! JSON endpoints for budgets and their closed periods.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
};
use rusqlite::Connection;

use crate::{
    AppState,
    api::ApiResult,
    auth::UserID,
    budget::{
        core::{
            BudgetData, BudgetId, BudgetProgress, BudgetUsage, create_budget, delete_budget,
            get_budget, get_budget_progress, get_budget_usage, list_budgets, update_budget,
        },
        period::{
            BudgetPeriod, BudgetPeriodId, BudgetPeriodNotes, close_budget_period,
            delete_budget_period, get_budget_period, list_budget_periods,
            update_budget_period_notes,
        },
    },
    db,
    pagination::{ListQuery, Page, PaginationConfig},
    timezone::local_today,
};

/// The state needed for the budget endpoints.
#[derive(Debug, Clone)]
pub struct BudgetState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub pagination_config: PaginationConfig,
    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    pub local_timezone: String,
}

impl FromRef<AppState> for BudgetState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

pub async fn list_budgets_endpoint(
    State(state): State<BudgetState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<BudgetUsage>>> {
    let connection = db::lock(&state.db_connection)?;
    let page = list_budgets(user_id, &query, &state.pagination_config, &connection)?;

    Ok(Json(
        page.try_map(|budget| get_budget_usage(budget, &connection))?,
    ))
}

pub async fn get_budget_endpoint(
    State(state): State<BudgetState>,
    Extension(user_id): Extension<UserID>,
    Path(budget_id): Path<BudgetId>,
) -> ApiResult<Json<BudgetUsage>> {
    let connection = db::lock(&state.db_connection)?;
    let budget = get_budget(budget_id, user_id, &connection)?;

    Ok(Json(get_budget_usage(budget, &connection)?))
}

pub async fn create_budget_endpoint(
    State(state): State<BudgetState>,
    Extension(user_id): Extension<UserID>,
    Json(data): Json<BudgetData>,
) -> ApiResult<(StatusCode, Json<BudgetUsage>)> {
    let connection = db::lock(&state.db_connection)?;
    let budget = create_budget(user_id, data, &connection)?;

    Ok((
        StatusCode::CREATED,
        Json(get_budget_usage(budget, &connection)?),
    ))
}

pub async fn update_budget_endpoint(
    State(state): State<BudgetState>,
    Extension(user_id): Extension<UserID>,
    Path(budget_id): Path<BudgetId>,
    Json(data): Json<BudgetData>,
) -> ApiResult<Json<BudgetUsage>> {
    let connection = db::lock(&state.db_connection)?;
    let budget = update_budget(budget_id, user_id, data, &connection)?;

    Ok(Json(get_budget_usage(budget, &connection)?))
}

pub async fn delete_budget_endpoint(
    State(state): State<BudgetState>,
    Extension(user_id): Extension<UserID>,
    Path(budget_id): Path<BudgetId>,
) -> ApiResult<StatusCode> {
    let connection = db::lock(&state.db_connection)?;
    delete_budget(budget_id, user_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/budgets/{budget_id}/progress`
pub async fn budget_progress_endpoint(
    State(state): State<BudgetState>,
    Extension(user_id): Extension<UserID>,
    Path(budget_id): Path<BudgetId>,
) -> ApiResult<Json<BudgetProgress>> {
    let today = local_today(&state.local_timezone)?;
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(get_budget_progress(
        budget_id,
        user_id,
        today,
        &connection,
    )?))
}

/// `POST /api/budgets/{budget_id}/close_period`
pub async fn close_budget_period_endpoint(
    State(state): State<BudgetState>,
    Extension(user_id): Extension<UserID>,
    Path(budget_id): Path<BudgetId>,
) -> ApiResult<Json<BudgetUsage>> {
    let connection = db::lock(&state.db_connection)?;
    let budget = close_budget_period(budget_id, user_id, &connection)?;
    tracing::info!("user {user_id} closed the current period of budget {budget_id}");

    Ok(Json(get_budget_usage(budget, &connection)?))
}

pub async fn list_budget_periods_endpoint(
    State(state): State<BudgetState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<BudgetPeriod>>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(list_budget_periods(
        user_id,
        &query,
        &state.pagination_config,
        &connection,
    )?))
}

pub async fn get_budget_period_endpoint(
    State(state): State<BudgetState>,
    Extension(user_id): Extension<UserID>,
    Path(period_id): Path<BudgetPeriodId>,
) -> ApiResult<Json<BudgetPeriod>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(get_budget_period(period_id, user_id, &connection)?))
}

/// Only the notes of a closed period can be changed.
pub async fn update_budget_period_endpoint(
    State(state): State<BudgetState>,
    Extension(user_id): Extension<UserID>,
    Path(period_id): Path<BudgetPeriodId>,
    Json(data): Json<BudgetPeriodNotes>,
) -> ApiResult<Json<BudgetPeriod>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(update_budget_period_notes(
        period_id,
        user_id,
        &data.notes,
        &connection,
    )?))
}

pub async fn delete_budget_period_endpoint(
    State(state): State<BudgetState>,
    Extension(user_id): Extension<UserID>,
    Path(period_id): Path<BudgetPeriodId>,
) -> ApiResult<StatusCode> {
    let connection = db::lock(&state.db_connection)?;
    delete_budget_period(period_id, user_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Extension, Router,
        http::StatusCode,
        routing::{get, post},
    };
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::{
        endpoints,
        pagination::PaginationConfig,
        transaction::test_utils::get_test_connection,
    };

    use super::{
        BudgetState, budget_progress_endpoint, close_budget_period_endpoint,
        create_budget_endpoint, delete_budget_endpoint, delete_budget_period_endpoint,
        get_budget_endpoint, get_budget_period_endpoint, list_budget_periods_endpoint,
        list_budgets_endpoint, update_budget_endpoint, update_budget_period_endpoint,
    };

    fn get_test_server() -> TestServer {
        let (connection, user_id, _) = get_test_connection();

        let state = BudgetState {
            db_connection: Arc::new(Mutex::new(connection)),
            pagination_config: PaginationConfig::default(),
            local_timezone: "Etc/UTC".to_owned(),
        };
        let app = Router::new()
            .route(
                endpoints::BUDGETS,
                get(list_budgets_endpoint).post(create_budget_endpoint),
            )
            .route(
                endpoints::BUDGET,
                get(get_budget_endpoint)
                    .put(update_budget_endpoint)
                    .delete(delete_budget_endpoint),
            )
            .route(endpoints::BUDGET_PROGRESS, get(budget_progress_endpoint))
            .route(
                endpoints::BUDGET_CLOSE_PERIOD,
                post(close_budget_period_endpoint),
            )
            .route(endpoints::BUDGET_PERIODS, get(list_budget_periods_endpoint))
            .route(
                endpoints::BUDGET_PERIOD,
                get(get_budget_period_endpoint)
                    .patch(update_budget_period_endpoint)
                    .delete(delete_budget_period_endpoint),
            )
            .layer(Extension(user_id))
            .with_state(state);

        TestServer::try_new(app).unwrap()
    }

    async fn create_food_budget(server: &TestServer, period: &str) -> Value {
        let response = server
            .post(endpoints::BUDGETS)
            .json(&json!({
                "name": "Food",
                "amount": "400",
                "period": period,
                "start_date": "2024-03-01",
                "end_date": "2024-03-31",
            }))
            .await;
        response.assert_status(StatusCode::CREATED);

        response.json::<Value>()
    }

    #[tokio::test]
    async fn created_budget_has_derived_fields() {
        let server = get_test_server();

        let budget = create_food_budget(&server, "monthly").await;

        assert_eq!(budget["name"], "Food");
        assert_eq!(budget["amount"], "400.00");
        assert_eq!(budget["spent_amount"], "0.00");
        assert_eq!(budget["remaining_amount"], "400.00");
        assert_eq!(budget["usage_percentage"], "0.00");

        let response = server.get(endpoints::BUDGETS).await;
        response.assert_status_ok();
        let page = response.json::<Value>();
        assert_eq!(page["count"], 1);
        assert_eq!(page["results"][0]["spent_amount"], "0.00");
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let server = get_test_server();

        let response = server
            .post(endpoints::BUDGETS)
            .json(&json!({
                "name": "Food",
                "amount": "0",
                "period": "monthly",
                "start_date": "2024-03-01",
            }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn progress_reports_days_remaining() {
        let server = get_test_server();
        let budget = create_food_budget(&server, "monthly").await;
        let budget_id = budget["id"].as_i64().unwrap();

        let response = server
            .get(&endpoints::format_endpoint(
                endpoints::BUDGET_PROGRESS,
                budget_id,
            ))
            .await;

        response.assert_status_ok();
        let progress = response.json::<Value>();
        assert_eq!(progress["budget"]["id"], budget_id);
        assert!(progress["days_remaining"].is_i64());
        assert_eq!(progress["usage_percentage"], "0.00");
    }

    #[tokio::test]
    async fn close_period_then_edit_notes() {
        let server = get_test_server();
        let budget = create_food_budget(&server, "monthly").await;
        let budget_id = budget["id"].as_i64().unwrap();

        let response = server
            .post(&endpoints::format_endpoint(
                endpoints::BUDGET_CLOSE_PERIOD,
                budget_id,
            ))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["start_date"], "2024-04-01");

        let periods = server.get(endpoints::BUDGET_PERIODS).await.json::<Value>();
        assert_eq!(periods["count"], 1);
        let url = endpoints::format_endpoint(
            endpoints::BUDGET_PERIOD,
            periods["results"][0]["id"].as_i64().unwrap(),
        );

        let response = server
            .patch(&url)
            .json(&json!({"notes": "Under budget"}))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["notes"], "Under budget");

        server
            .delete(&url)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server.get(&url).await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn custom_budget_close_is_bad_request() {
        let server = get_test_server();
        let budget = create_food_budget(&server, "custom").await;

        let response = server
            .post(&endpoints::format_endpoint(
                endpoints::BUDGET_CLOSE_PERIOD,
                budget["id"].as_i64().unwrap(),
            ))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_and_delete_budget() {
        let server = get_test_server();
        let budget = create_food_budget(&server, "monthly").await;
        let url = endpoints::format_endpoint(endpoints::BUDGET, budget["id"].as_i64().unwrap());

        let response = server
            .put(&url)
            .json(&json!({
                "name": "Groceries",
                "amount": "350",
                "period": "monthly",
                "start_date": "2024-03-01",
            }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["name"], "Groceries");

        server
            .delete(&url)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .delete(&url)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
