use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stock Ledger API",
        version = "1.0.0",
        description = r#"
# Stock Ledger API

Lot-level stock positions across legal entities and warehouses, and validated
movements between them.

## Movement lifecycle

1. `POST /movements` opens a draft with an optional header.
2. `POST /movements/{id}/items` adds lines; each line snapshots the origin lot's
   available quantity.
3. `POST /movements/{id}/validate` checks quantities against the snapshots.
4. A movement needs items and either a linked invoice number or a generated
   matrix invoice (`POST /movements/{id}/matrix-invoice`) before it can be confirmed.
5. `POST /movements/{id}/confirm` applies every line to the ledger or none of them,
   and appends one history record per line.

## Error Handling

Errors share one body shape:

```json
{
  "error": "Conflict",
  "message": "Quantity conflict on 1 item(s)",
  "details": [{"index": 0, "product_code": "P1", "lot_code": "L1", "requested": 60, "live_available": 40}],
  "request_id": "5b0d...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080/api/v1", description = "Local development")
    ),
    tags(
        (name = "positions", description = "Lot positions, flags and aggregates"),
        (name = "movements", description = "Movement drafts, validation and confirmation"),
        (name = "history", description = "Confirmed movement history"),
        (name = "lots", description = "Receiving and lot lookup")
    ),
    paths(
        // Positions
        crate::handlers::positions::list_positions,
        crate::handlers::positions::position_summary,

        // Movements
        crate::handlers::movements::open_movement,
        crate::handlers::movements::list_movements,
        crate::handlers::movements::get_movement,
        crate::handlers::movements::edit_movement,
        crate::handlers::movements::abandon_movement,
        crate::handlers::movements::add_item,
        crate::handlers::movements::edit_item,
        crate::handlers::movements::remove_item,
        crate::handlers::movements::refresh_snapshots,
        crate::handlers::movements::validate_movement,
        crate::handlers::movements::confirmable,
        crate::handlers::movements::generate_matrix_invoice,
        crate::handlers::movements::confirm_movement,

        // History
        crate::handlers::history::query_history,

        // Lots
        crate::handlers::lots::receive_lot,
        crate::handlers::lots::lookup_lot,
    ),
    components(
        schemas(
            // Lots and positions
            crate::models::stock_lot::StockLot,
            crate::models::stock_lot::StockClass,
            crate::models::stock_lot::LotKey,
            crate::services::aggregator::LotPosition,
            crate::services::aggregator::LotFlags,
            crate::services::aggregator::ExpiryBucket,
            crate::services::aggregator::PositionSummary,
            crate::services::positions::PositionPage,
            crate::services::positions::QuickFilter,
            crate::services::positions::SortField,
            crate::services::positions::SortDirection,
            crate::services::positions::SortState,

            // Movements
            crate::models::movement::MovementRequest,
            crate::models::movement::MovementItem,
            crate::models::movement::MovementKind,
            crate::models::movement::MovementStatus,
            crate::models::movement::GateBlock,
            crate::models::movement::DraftPatch,
            crate::models::movement::NewItem,
            crate::models::movement::ItemPatch,
            crate::models::movement::ValidationReport,
            crate::models::movement::ItemValidationError,
            crate::models::movement::ConflictItem,
            crate::services::movements::Confirmation,
            crate::services::movements::Confirmability,

            // History
            crate::models::history::MovementHistoryRecord,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
