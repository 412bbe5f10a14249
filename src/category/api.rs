//! JSON endpoints for categories.

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
    category::core::{
        Category, CategoryData, CategoryId, CategoryScope, create_category, delete_category,
        get_category, list_categories, update_category,
    },
    db,
    pagination::{ListQuery, Page, PaginationConfig},
};

/// The state needed for the category endpoints.
#[derive(Debug, Clone)]
pub struct CategoryState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for CategoryState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

fn list_scope(
    state: &CategoryState,
    user_id: UserID,
    scope: CategoryScope,
    query: &ListQuery,
) -> ApiResult<Json<Page<Category>>> {
    let connection = db::lock(&state.db_connection)?;
    let page = list_categories(user_id, scope, query, &state.pagination_config, &connection)?;

    Ok(Json(page))
}

/// `GET /api/categories`: the user's categories and the system categories.
pub async fn list_categories_endpoint(
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<Category>>> {
    list_scope(&state, user_id, CategoryScope::Visible, &query)
}

/// `GET /api/categories/system`
pub async fn list_system_categories_endpoint(
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<Category>>> {
    list_scope(&state, user_id, CategoryScope::System, &query)
}

/// `GET /api/categories/custom`
pub async fn list_custom_categories_endpoint(
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<Category>>> {
    list_scope(&state, user_id, CategoryScope::Custom, &query)
}

pub async fn get_category_endpoint(
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
    Path(category_id): Path<CategoryId>,
) -> ApiResult<Json<Category>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(get_category(category_id, user_id, &connection)?))
}

pub async fn create_category_endpoint(
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
    Json(data): Json<CategoryData>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let connection = db::lock(&state.db_connection)?;
    let category = create_category(user_id, data, &connection)?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category_endpoint(
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
    Path(category_id): Path<CategoryId>,
    Json(data): Json<CategoryData>,
) -> ApiResult<Json<Category>> {
    let connection = db::lock(&state.db_connection)?;

    Ok(Json(update_category(category_id, user_id, data, &connection)?))
}

pub async fn delete_category_endpoint(
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
    Path(category_id): Path<CategoryId>,
) -> ApiResult<StatusCode> {
    let connection = db::lock(&state.db_connection)?;
    delete_category(category_id, user_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}
