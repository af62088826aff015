use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{CreateUserRequest, Pagination, UpdateUserRequest, User};
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::AppState;
use crate::services::users;

pub async fn create(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    tracing::info!(name = %body.name, email = %body.email, "Creating user");

    let user = users::create(&state.db, body).await?;

    tracing::info!(user_id = %user.id, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/v1/users?limit=20&offset=40
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<Pagination>,
) -> AppResult<Json<Vec<User>>> {
    tracing::info!(limit = ?page.limit, offset = ?page.offset, "Listing users");
    Ok(Json(users::list(&state.db, page).await?))
}

pub async fn get(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<User>> {
    tracing::info!(user_id = %id, "Getting user");
    Ok(Json(users::get(&state.db, id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    tracing::info!(user_id = %id, "Updating user");

    let user = users::update(&state.db, id, body).await?;

    tracing::info!(user_id = %id, "User updated");
    Ok(Json(user))
}

pub async fn delete(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    tracing::info!(user_id = %id, "Deleting user");

    users::delete(&state.db, id).await?;

    tracing::info!(user_id = %id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
