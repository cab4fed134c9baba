//! Stock Ledger API Library
//!
//! Lot-level stock positions per legal entity and warehouse, and validated
//! inter-entity movements applied atomically to the ledger.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod middleware_helpers;
pub mod models;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use handlers::{AppServices, LedgerHandlerState};
use services::{
    history::HistoryService, lot_store::SharedLotStore, lots::LotService,
    movements::MovementService, positions::PositionService,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub store: SharedLotStore,
    /// Present only with the database backend
    pub db: Option<Arc<DatabaseConnection>>,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        config: config::AppConfig,
        store: SharedLotStore,
        db: Option<Arc<DatabaseConnection>>,
        event_sender: events::EventSender,
    ) -> Self {
        let services = AppServices::new(store.clone(), &config, event_sender.clone());
        Self {
            config,
            store,
            db,
            event_sender,
            services,
        }
    }
}

impl LedgerHandlerState for AppState {
    fn position_service(&self) -> &PositionService {
        &self.services.positions
    }

    fn movement_service(&self) -> &MovementService {
        &self.services.movements
    }

    fn history_service(&self) -> &HistoryService {
        &self.services.history
    }

    fn lot_service(&self) -> &LotService {
        &self.services.lots
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes served under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .nest("/positions", handlers::positions::positions_router::<AppState>())
        .nest("/movements", handlers::movements::movements_router::<AppState>())
        .nest("/history", handlers::history::history_router::<AppState>())
        .nest("/lots", handlers::lots::lots_router::<AppState>())
}

/// Full application router without CORS, which the binary adds from config.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "stock-ledger-api",
        "backend": state.config.backend().to_string(),
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.environment,
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let store_status = match state.store.all().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };
    let db_status = match &state.db {
        Some(db) => match db.ping().await {
            Ok(_) => "healthy",
            Err(_) => "unhealthy",
        },
        None => "not-configured",
    };

    let healthy = store_status == "healthy" && db_status != "unhealthy";
    let health_data = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "checks": {
            "ledger": store_status,
            "database": db_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}

async fn metrics_endpoint() -> Result<String, errors::ServiceError> {
    metrics::metrics_handler()
        .await
        .map_err(|e| errors::ServiceError::InternalError(e.to_string()))
}
