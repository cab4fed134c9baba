use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use super::LedgerHandlerState;
use crate::errors::ServiceError;
use crate::services::aggregator::PositionSummary;
use crate::services::positions::{PositionPage, PositionQuery};
use crate::ApiResponse;

pub fn positions_router<S>() -> Router<S>
where
    S: LedgerHandlerState,
{
    Router::new()
        .route("/", get(list_positions::<S>))
        .route("/summary", get(position_summary::<S>))
}

/// Lot positions with derived flags, filtered and sorted
#[utoipa::path(
    get,
    path = "/api/v1/positions",
    params(PositionQuery),
    responses(
        (status = 200, description = "Matching positions and store-wide summary", body = PositionPage,
            headers(
                ("X-Request-Id" = String, description = "Unique request id for tracing"),
            )
        ),
        (status = 400, description = "Invalid query", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "positions"
)]
pub async fn list_positions<S>(
    State(state): State<S>,
    Query(query): Query<PositionQuery>,
) -> Result<Json<ApiResponse<PositionPage>>, ServiceError>
where
    S: LedgerHandlerState,
{
    let page = state.position_service().query(&query).await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Store-wide counts and totals
#[utoipa::path(
    get,
    path = "/api/v1/positions/summary",
    responses(
        (status = 200, description = "Aggregates over every lot", body = PositionSummary),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "positions"
)]
pub async fn position_summary<S>(
    State(state): State<S>,
) -> Result<Json<ApiResponse<PositionSummary>>, ServiceError>
where
    S: LedgerHandlerState,
{
    let summary = state.position_service().summary().await?;
    Ok(Json(ApiResponse::success(summary)))
}
