mod common;

use axum::http::{Method, StatusCode};
use common::{lot, TestApp};
use serde_json::{json, Value};

fn header_body(invoice: Option<&str>) -> Value {
    json!({
        "origin_entity": "00.1",
        "origin_warehouse": "WH1",
        "destination_entity": "00.2",
        "destination_warehouse": "WH1",
        "responsible": "ana.souza",
        "linked_invoice_number": invoice,
    })
}

fn item_body(quantity: i64) -> Value {
    json!({
        "product_code": "P1",
        "lot_code": "L1",
        "expiry_date": "2030-01-01",
        "quantity_to_move": quantity,
    })
}

async fn open_with_item(app: &TestApp, invoice: Option<&str>, quantity: i64) -> String {
    let (status, body) = app
        .request(Method::POST, "/api/v1/movements", Some(header_body(invoice)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(
            Method::POST,
            &format!("/api/v1/movements/{}/items", id),
            Some(item_body(quantity)),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    id
}

#[tokio::test]
async fn full_movement_flow_over_http() {
    let app = TestApp::new(vec![lot("P1", "00.1", "WH1", "L1", 100)]).await;
    let id = open_with_item(&app, Some("NF123"), 40).await;

    let (status, body) = app
        .request(Method::POST, &format!("/api/v1/movements/{}/validate", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], true);

    let (status, body) = app
        .request(Method::GET, &format!("/api/v1/movements/{}/confirmable", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["confirmable"], true);

    let (status, body) = app
        .request(Method::POST, &format!("/api/v1/movements/{}/confirm", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["movement"]["status"], "confirmed");
    assert_eq!(body["data"]["records"][0]["movement_kind"], "inter-company");

    let (status, body) = app
        .request(Method::GET, "/api/v1/positions?search=p1&sort_by=legal_entity", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let positions = body["data"]["positions"].as_array().unwrap();
    assert_eq!(positions.len(), 2);
    assert_eq!(positions[0]["legal_entity"], "00.1");
    assert_eq!(positions[0]["available_quantity"], 60);
    assert_eq!(positions[1]["legal_entity"], "00.2");
    assert_eq!(positions[1]["available_quantity"], 40);
    assert_eq!(positions[1]["is_multi_entity"], true);

    let (status, body) = app
        .request(
            Method::GET,
            "/api/v1/positions?search=p1&sort_by=legal_entity&sort_order=asc&toggle=legal_entity",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["positions"][0]["legal_entity"], "00.2");
    assert_eq!(body["data"]["sort"]["field"], "legal_entity");
    assert_eq!(body["data"]["sort"]["direction"], "desc");

    let (status, body) = app
        .request(Method::GET, "/api/v1/history?entity=00.2", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let records = body["data"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["document"], "NF123");
    assert_eq!(records[0]["quantity"], 40);

    let (status, _) = app
        .request(Method::PATCH, &format!("/api/v1/movements/{}", id), Some(json!({"reason": "late"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_movement_is_not_found() {
    let app = TestApp::new(vec![]).await;
    let (status, body) = app
        .request(
            Method::GET,
            "/api/v1/movements/6f1c1c7e-8f6a-4a43-9d0e-2d8a8e0c6b11",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");
}

#[tokio::test]
async fn excessive_quantity_is_unprocessable_with_item_details() {
    let app = TestApp::new(vec![lot("P1", "00.1", "WH1", "L1", 100)]).await;
    let id = open_with_item(&app, Some("NF123"), 150).await;

    let (status, body) = app
        .request(Method::POST, &format!("/api/v1/movements/{}/validate", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], false);
    assert_eq!(body["data"]["item_errors"][0]["available_quantity"], 100);

    let (status, body) = app
        .request(Method::POST, &format!("/api/v1/movements/{}/confirm", id), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"]["item_errors"][0]["quantity_to_move"], 150);
}

#[tokio::test]
async fn undocumented_movement_is_blocked_until_matrix_invoice() {
    let app = TestApp::new(vec![lot("P1", "00.1", "WH1", "L1", 100)]).await;
    let id = open_with_item(&app, None, 10).await;

    let (status, body) = app
        .request(Method::POST, &format!("/api/v1/movements/{}/confirm", id), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"]["reason"], "missing-documentation");

    let (status, body) = app
        .request(Method::POST, &format!("/api/v1/movements/{}/matrix-invoice", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["matrix_invoice_generated"], true);
    let number = body["data"]["matrix_invoice_number"].as_str().unwrap().to_string();
    assert!(number.starts_with("MTX"));

    let (status, body) = app
        .request(Method::POST, &format!("/api/v1/movements/{}/confirm", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["records"][0]["document"], number);
}

#[tokio::test]
async fn stale_snapshot_conflict_returns_live_availability() {
    let app = TestApp::new(vec![lot("P1", "00.1", "WH1", "L1", 100)]).await;
    let first = open_with_item(&app, Some("NF1"), 60).await;
    let second = open_with_item(&app, Some("NF2"), 60).await;

    let (status, _) = app
        .request(Method::POST, &format!("/api/v1/movements/{}/confirm", first), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .request(Method::POST, &format!("/api/v1/movements/{}/confirm", second), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");
    assert_eq!(body["details"][0]["live_available"], 40);
    assert_eq!(body["details"][0]["requested"], 60);

    let (status, body) = app
        .request(Method::POST, &format!("/api/v1/movements/{}/refresh", second), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"][0]["available_quantity_snapshot"], 40);
}

#[tokio::test]
async fn removing_an_item_by_index_over_http() {
    let app = TestApp::new(vec![lot("P1", "00.1", "WH1", "L1", 100)]).await;
    let id = open_with_item(&app, Some("NF1"), 5).await;

    let (status, body) = app
        .request(Method::DELETE, &format!("/api/v1/movements/{}/items/0", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 0);

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/v1/movements/{}/items/0", id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .request(Method::GET, &format!("/api/v1/movements/{}/confirmable", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["blocked_by"], "no-items");
}

#[tokio::test]
async fn receiving_and_looking_up_a_lot() {
    let app = TestApp::new(vec![]).await;
    let body = json!({
        "product_code": "P9",
        "product_description": "Saline 0.9%",
        "legal_entity": "00.1",
        "warehouse": "WH1",
        "lot_code": "L7",
        "expiry_date": "2030-01-01",
        "total_quantity": 12,
        "available_quantity": 12,
        "reserved_quantity": 0,
        "unit_cost": "1.25",
        "supplier": "Acme Pharma",
        "stock_class": "domestic",
        "source_origin": "purchase",
    });
    let (status, _) = app.request(Method::POST, "/api/v1/lots", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let mut shrunk = body;
    shrunk["total_quantity"] = json!(1);
    shrunk["available_quantity"] = json!(1);
    let (status, _) = app.request(Method::POST, "/api/v1/lots", Some(shrunk)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(
            Method::GET,
            "/api/v1/lots/lookup?product_code=P9&legal_entity=00.1&warehouse=WH1&lot_code=L7&expiry_date=2030-01-01",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["available_quantity"], 12);

    let (status, _) = app
        .request(
            Method::GET,
            "/api/v1/lots/lookup?product_code=P9&legal_entity=00.2&warehouse=WH1&lot_code=L7",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inverted_history_range_is_a_bad_request() {
    let app = TestApp::new(vec![]).await;
    let (status, _) = app
        .request(Method::GET, "/api/v1/history?from=2024-06-02&to=2024-06-01", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_and_metrics_endpoints_respond() {
    let app = TestApp::new(vec![lot("P1", "00.1", "WH1", "L1", 1)]).await;

    let (status, body) = app.request(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["checks"]["database"], "not-configured");

    app.request(Method::POST, "/api/v1/movements", Some(json!({}))).await;
    let (status, text) = app.text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("stock_ledger_movement_drafts_opened_total"));
}
