#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use stock_ledger_api::{
    config::AppConfig,
    db::{self, DbConfig},
    events::{self, EventSender},
    models::{
        movement::{DraftPatch, NewItem},
        stock_lot::{StockClass, StockLot},
    },
    services::{
        lot_store::{DatabaseLotStore, InMemoryLotStore, LotStore, SharedLotStore},
        matrix_invoice::SequentialMatrixInvoiceGenerator,
        movements::MovementService,
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;

pub fn expiry() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2030, 1, 1)
}

/// A lot with nothing reserved, expiring 2030-01-01.
pub fn lot(product: &str, entity: &str, warehouse: &str, lot_code: &str, available: i64) -> StockLot {
    StockLot {
        product_code: product.to_string(),
        product_description: format!("{} tablets", product),
        legal_entity: entity.to_string(),
        warehouse: warehouse.to_string(),
        lot_code: lot_code.to_string(),
        expiry_date: expiry(),
        total_quantity: available,
        available_quantity: available,
        reserved_quantity: 0,
        unit_cost: dec!(2.50),
        supplier: "Acme Pharma".to_string(),
        stock_class: StockClass::Domestic,
        source_origin: "purchase".to_string(),
    }
}

pub fn header(origin: (&str, &str), destination: (&str, &str), invoice: Option<&str>) -> DraftPatch {
    DraftPatch {
        origin_entity: Some(origin.0.to_string()),
        origin_warehouse: Some(origin.1.to_string()),
        destination_entity: Some(destination.0.to_string()),
        destination_warehouse: Some(destination.1.to_string()),
        responsible: Some("ana.souza".to_string()),
        linked_invoice_number: invoice.map(str::to_string),
        ..Default::default()
    }
}

pub fn item(product: &str, lot_code: &str, quantity: i64) -> NewItem {
    NewItem {
        product_code: product.to_string(),
        lot_code: lot_code.to_string(),
        expiry_date: expiry(),
        quantity_to_move: quantity,
        item_reason: None,
    }
}

pub async fn memory_store(lots: Vec<StockLot>) -> Arc<InMemoryLotStore> {
    Arc::new(
        InMemoryLotStore::with_lots(lots)
            .await
            .expect("seed in-memory store"),
    )
}

/// In-memory SQLite holds one database per connection, so the pool is pinned to one.
pub async fn sqlite_store(lots: Vec<StockLot>) -> (Arc<DatabaseLotStore>, Arc<DatabaseConnection>) {
    let pool = db::establish_connection_with_config(&DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    })
    .await
    .expect("connect to in-memory sqlite");
    db::ensure_schema(&pool).await.expect("create ledger schema");

    let db = Arc::new(pool);
    let store = Arc::new(DatabaseLotStore::new(db.clone()));
    for l in lots {
        store.upsert(l).await.expect("seed lot");
    }
    (store, db)
}

pub fn movement_service(store: SharedLotStore) -> MovementService {
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(events::process_events(rx));
    MovementService::new(
        store,
        Arc::new(SequentialMatrixInvoiceGenerator::new("MTX")),
        EventSender::new(tx),
    )
}

/// Helper harness for driving the HTTP router with an in-memory ledger.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new(lots: Vec<StockLot>) -> Self {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "development".to_string(),
        );
        let store: SharedLotStore = memory_store(lots).await;

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let state = AppState::new(cfg, store, None, EventSender::new(event_tx));
        let router = stock_ledger_api::app_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Send a request and decode the JSON body (Null when empty).
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

impl TestApp {
    /// Send a bodyless request and return the raw text body.
    pub async fn text(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("failed to build request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}
