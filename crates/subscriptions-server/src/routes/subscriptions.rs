use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    CreateSubscriptionRequest, Pagination, Subscription, SubscriptionFilter,
    TotalCostResponse, UpdateSubscriptionRequest,
};
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::AppState;
use crate::services::{subscriptions, total_cost};

#[derive(Debug, Deserialize)]
pub struct ListSubscriptionsQuery {
    pub user_id: Option<String>,
    pub service_name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TotalCostQuery {
    pub start_period: Option<String>,
    pub end_period: Option<String>,
    pub user_id: Option<String>,
    pub service_name: Option<String>,
}

/// Empty query values count as "not supplied".
fn parse_filter(
    user_id: Option<String>,
    service_name: Option<String>,
) -> AppResult<SubscriptionFilter> {
    let user_id = match user_id.filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            Uuid::parse_str(&raw)
                .map_err(|_| AppError::Validation("Invalid user_id format".into()))?,
        ),
        None => None,
    };

    Ok(SubscriptionFilter {
        user_id,
        service_name: service_name.filter(|s| !s.is_empty()),
    })
}

pub async fn create(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateSubscriptionRequest>,
) -> AppResult<(StatusCode, Json<Subscription>)> {
    tracing::info!(
        service_name = %body.service_name,
        user_id = %body.user_id,
        price = body.price,
        "Creating subscription"
    );

    let subscription = subscriptions::create(&state.db, body).await?;

    tracing::info!(subscription_id = subscription.id, "Subscription created");
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// GET /api/v1/subscriptions?user_id=...&service_name=flix&limit=10&offset=0
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListSubscriptionsQuery>,
) -> AppResult<Json<Vec<Subscription>>> {
    let filter = parse_filter(query.user_id, query.service_name)?;
    let page = Pagination {
        limit: query.limit,
        offset: query.offset,
    };

    tracing::info!(
        user_id = ?filter.user_id,
        service_name = ?filter.service_name,
        limit = ?page.limit,
        offset = ?page.offset,
        "Listing subscriptions"
    );

    Ok(Json(subscriptions::list(&state.db, filter, page).await?))
}

pub async fn get(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<Subscription>> {
    tracing::info!(subscription_id = id, "Getting subscription");
    Ok(Json(subscriptions::get(&state.db, id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateSubscriptionRequest>,
) -> AppResult<Json<Subscription>> {
    tracing::info!(subscription_id = id, "Updating subscription");

    let subscription = subscriptions::update(&state.db, id, body).await?;

    tracing::info!(subscription_id = id, "Subscription updated");
    Ok(Json(subscription))
}

pub async fn delete(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<StatusCode> {
    tracing::info!(subscription_id = id, "Deleting subscription");

    subscriptions::delete(&state.db, id).await?;

    tracing::info!(subscription_id = id, "Subscription deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/subscriptions/total-cost?start_period=01-2024&end_period=12-2024
pub async fn total_cost(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TotalCostQuery>,
) -> AppResult<Json<TotalCostResponse>> {
    let filter = parse_filter(query.user_id, query.service_name)?;

    tracing::info!(
        start_period = ?query.start_period,
        end_period = ?query.end_period,
        user_id = ?filter.user_id,
        service_name = ?filter.service_name,
        "Calculating total cost"
    );

    let result =
        total_cost::total_cost(&state.db, filter, query.start_period, query.end_period).await?;

    tracing::info!(total_cost = result.total_cost, "Total cost calculated");
    Ok(Json(result))
}
