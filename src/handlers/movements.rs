use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use uuid::Uuid;

use super::LedgerHandlerState;
use crate::errors::ServiceError;
use crate::models::movement::{DraftPatch, ItemPatch, MovementRequest, NewItem, ValidationReport};
use crate::services::movements::{Confirmability, Confirmation};
use crate::ApiResponse;

pub fn movements_router<S>() -> Router<S>
where
    S: LedgerHandlerState,
{
    Router::new()
        .route("/", get(list_movements::<S>).post(open_movement::<S>))
        .route(
            "/:id",
            get(get_movement::<S>)
                .patch(edit_movement::<S>)
                .delete(abandon_movement::<S>),
        )
        .route("/:id/items", post(add_item::<S>))
        .route(
            "/:id/items/:index",
            patch(edit_item::<S>).delete(remove_item::<S>),
        )
        .route("/:id/refresh", post(refresh_snapshots::<S>))
        .route("/:id/validate", post(validate_movement::<S>))
        .route("/:id/confirmable", get(confirmable::<S>))
        .route("/:id/matrix-invoice", post(generate_matrix_invoice::<S>))
        .route("/:id/confirm", post(confirm_movement::<S>))
}

/// Open a movement draft, optionally filling the header
#[utoipa::path(
    post,
    path = "/api/v1/movements",
    request_body = DraftPatch,
    responses(
        (status = 201, description = "Draft opened", body = MovementRequest),
        (status = 400, description = "Invalid header", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn open_movement<S>(
    State(state): State<S>,
    Json(header): Json<DraftPatch>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: LedgerHandlerState,
{
    let service = state.movement_service();
    let draft = service.open_draft().await;
    let draft = match service.edit_draft(draft.id, header).await {
        Ok(draft) => draft,
        Err(e) => {
            // Leave nothing half-built behind.
            service.abandon_draft(draft.id).await?;
            return Err(e);
        }
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(draft))))
}

/// Every movement request, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/movements",
    responses(
        (status = 200, description = "Movement requests", body = [MovementRequest])
    ),
    tag = "movements"
)]
pub async fn list_movements<S>(State(state): State<S>) -> Json<ApiResponse<Vec<MovementRequest>>>
where
    S: LedgerHandlerState,
{
    Json(ApiResponse::success(state.movement_service().list().await))
}

#[utoipa::path(
    get,
    path = "/api/v1/movements/{id}",
    params(("id" = Uuid, Path, description = "Movement id")),
    responses(
        (status = 200, description = "Movement request", body = MovementRequest),
        (status = 404, description = "Unknown movement", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn get_movement<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MovementRequest>>, ServiceError>
where
    S: LedgerHandlerState,
{
    let movement = state.movement_service().get(id).await?;
    Ok(Json(ApiResponse::success(movement)))
}

/// Change header fields; resets the status to draft
#[utoipa::path(
    patch,
    path = "/api/v1/movements/{id}",
    params(("id" = Uuid, Path, description = "Movement id")),
    request_body = DraftPatch,
    responses(
        (status = 200, description = "Updated draft", body = MovementRequest),
        (status = 400, description = "Invalid patch or confirmed movement", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown movement", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn edit_movement<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
    Json(patch): Json<DraftPatch>,
) -> Result<Json<ApiResponse<MovementRequest>>, ServiceError>
where
    S: LedgerHandlerState,
{
    let movement = state.movement_service().edit_draft(id, patch).await?;
    Ok(Json(ApiResponse::success(movement)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/movements/{id}",
    params(("id" = Uuid, Path, description = "Movement id")),
    responses(
        (status = 204, description = "Draft abandoned"),
        (status = 400, description = "Movement already confirmed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown movement", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn abandon_movement<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError>
where
    S: LedgerHandlerState,
{
    state.movement_service().abandon_draft(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Add a line drawn from an origin lot, snapshotting its availability
#[utoipa::path(
    post,
    path = "/api/v1/movements/{id}/items",
    params(("id" = Uuid, Path, description = "Movement id")),
    request_body = NewItem,
    responses(
        (status = 201, description = "Item added", body = MovementRequest),
        (status = 400, description = "Invalid item or missing origin", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown movement or lot", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn add_item<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
    Json(item): Json<NewItem>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: LedgerHandlerState,
{
    let movement = state.movement_service().add_item(id, item).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(movement))))
}

#[utoipa::path(
    patch,
    path = "/api/v1/movements/{id}/items/{index}",
    params(
        ("id" = Uuid, Path, description = "Movement id"),
        ("index" = usize, Path, description = "Zero-based item position")
    ),
    request_body = ItemPatch,
    responses(
        (status = 200, description = "Item updated", body = MovementRequest),
        (status = 400, description = "Invalid quantity or confirmed movement", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown movement or item", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn edit_item<S>(
    State(state): State<S>,
    Path((id, index)): Path<(Uuid, usize)>,
    Json(patch): Json<ItemPatch>,
) -> Result<Json<ApiResponse<MovementRequest>>, ServiceError>
where
    S: LedgerHandlerState,
{
    let movement = state.movement_service().edit_item(id, index, patch).await?;
    Ok(Json(ApiResponse::success(movement)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/movements/{id}/items/{index}",
    params(
        ("id" = Uuid, Path, description = "Movement id"),
        ("index" = usize, Path, description = "Zero-based item position")
    ),
    responses(
        (status = 200, description = "Item removed", body = MovementRequest),
        (status = 404, description = "Unknown movement or item", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn remove_item<S>(
    State(state): State<S>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<ApiResponse<MovementRequest>>, ServiceError>
where
    S: LedgerHandlerState,
{
    let movement = state.movement_service().remove_item(id, index).await?;
    Ok(Json(ApiResponse::success(movement)))
}

/// Re-read live availability into every item snapshot
#[utoipa::path(
    post,
    path = "/api/v1/movements/{id}/refresh",
    params(("id" = Uuid, Path, description = "Movement id")),
    responses(
        (status = 200, description = "Snapshots refreshed", body = MovementRequest),
        (status = 404, description = "Unknown movement", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn refresh_snapshots<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MovementRequest>>, ServiceError>
where
    S: LedgerHandlerState,
{
    let movement = state.movement_service().refresh_snapshots(id).await?;
    Ok(Json(ApiResponse::success(movement)))
}

/// Check quantities against snapshots; an invalid report is still a 200
#[utoipa::path(
    post,
    path = "/api/v1/movements/{id}/validate",
    params(("id" = Uuid, Path, description = "Movement id")),
    responses(
        (status = 200, description = "Validation report", body = ValidationReport),
        (status = 404, description = "Unknown movement", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn validate_movement<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ValidationReport>>, ServiceError>
where
    S: LedgerHandlerState,
{
    let report = state.movement_service().validate(id).await?;
    Ok(Json(ApiResponse::success(report)))
}

#[utoipa::path(
    get,
    path = "/api/v1/movements/{id}/confirmable",
    params(("id" = Uuid, Path, description = "Movement id")),
    responses(
        (status = 200, description = "Gate state", body = Confirmability),
        (status = 404, description = "Unknown movement", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn confirmable<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Confirmability>>, ServiceError>
where
    S: LedgerHandlerState,
{
    let gate = state.movement_service().is_confirmable(id).await?;
    Ok(Json(ApiResponse::success(gate)))
}

/// Issue an inter-company document for a movement without a linked invoice
#[utoipa::path(
    post,
    path = "/api/v1/movements/{id}/matrix-invoice",
    params(("id" = Uuid, Path, description = "Movement id")),
    responses(
        (status = 200, description = "Matrix invoice recorded on the movement", body = MovementRequest),
        (status = 400, description = "Movement already confirmed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown movement", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn generate_matrix_invoice<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MovementRequest>>, ServiceError>
where
    S: LedgerHandlerState,
{
    let movement = state.movement_service().generate_matrix_invoice(id).await?;
    Ok(Json(ApiResponse::success(movement)))
}

/// Apply the movement to the ledger, all items or none
#[utoipa::path(
    post,
    path = "/api/v1/movements/{id}/confirm",
    params(("id" = Uuid, Path, description = "Movement id")),
    responses(
        (status = 200, description = "Movement confirmed and recorded", body = Confirmation),
        (status = 400, description = "Movement already confirmed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown movement", body = crate::errors::ErrorResponse),
        (status = 409, description = "Live availability dropped below the requested quantity", body = crate::errors::ErrorResponse),
        (status = 422, description = "Gate blocked or quantities invalid", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn confirm_movement<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Confirmation>>, ServiceError>
where
    S: LedgerHandlerState,
{
    let confirmation = state.movement_service().confirm(id).await?;
    Ok(Json(ApiResponse::success(confirmation)))
}
