use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::LedgerHandlerState;
use crate::errors::ServiceError;
use crate::models::stock_lot::{LotKey, StockLot};
use crate::ApiResponse;

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LotLookup {
    pub product_code: String,
    pub legal_entity: String,
    pub warehouse: String,
    pub lot_code: String,
    pub expiry_date: Option<NaiveDate>,
}

impl From<LotLookup> for LotKey {
    fn from(l: LotLookup) -> Self {
        LotKey::new(l.product_code, l.legal_entity, l.warehouse, l.lot_code, l.expiry_date)
    }
}

pub fn lots_router<S>() -> Router<S>
where
    S: LedgerHandlerState,
{
    Router::new()
        .route("/", post(receive_lot::<S>))
        .route("/lookup", get(lookup_lot::<S>))
}

/// Receive a new lot; an existing key is refused
#[utoipa::path(
    post,
    path = "/api/v1/lots",
    request_body = StockLot,
    responses(
        (status = 201, description = "Lot stored", body = StockLot),
        (status = 400, description = "Lot breaks a field or quantity rule, or already exists", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "lots"
)]
pub async fn receive_lot<S>(
    State(state): State<S>,
    Json(lot): Json<StockLot>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: LedgerHandlerState,
{
    let stored = state.lot_service().receive(lot).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(stored))))
}

/// Fetch one lot by its full key
#[utoipa::path(
    get,
    path = "/api/v1/lots/lookup",
    params(LotLookup),
    responses(
        (status = 200, description = "Lot found", body = StockLot),
        (status = 404, description = "No lot at that key", body = crate::errors::ErrorResponse)
    ),
    tag = "lots"
)]
pub async fn lookup_lot<S>(
    State(state): State<S>,
    Query(lookup): Query<LotLookup>,
) -> Result<Json<ApiResponse<StockLot>>, ServiceError>
where
    S: LedgerHandlerState,
{
    let lot = state.lot_service().get(&lookup.into()).await?;
    Ok(Json(ApiResponse::success(lot)))
}
