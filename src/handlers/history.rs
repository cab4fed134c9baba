use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use super::LedgerHandlerState;
use crate::errors::ServiceError;
use crate::models::history::{HistoryFilter, MovementHistoryRecord};
use crate::ApiResponse;

pub fn history_router<S>() -> Router<S>
where
    S: LedgerHandlerState,
{
    Router::new().route("/", get(query_history::<S>))
}

/// Confirmed movement lines, newest first
#[utoipa::path(
    get,
    path = "/api/v1/history",
    params(HistoryFilter),
    responses(
        (status = 200, description = "Matching history records", body = [MovementHistoryRecord]),
        (status = 400, description = "Invalid date range", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "history"
)]
pub async fn query_history<S>(
    State(state): State<S>,
    Query(filter): Query<HistoryFilter>,
) -> Result<Json<ApiResponse<Vec<MovementHistoryRecord>>>, ServiceError>
where
    S: LedgerHandlerState,
{
    let records = state.history_service().query(&filter).await?;
    Ok(Json(ApiResponse::success(records)))
}
