//! Scenario: HTTP gateway speaks the backend's wire shapes.
//!
//! GREEN when:
//! - list_products maps backend rows onto slot ids and keeps backend ids
//! - create/update/delete hit the configured paths with the expected bodies
//! - movement rows with unknown actions are skipped, not fatal
//! - non-2xx answers surface as `GatewayError::Status`
//! - skus and ids are percent-encoded as single path segments
//! - updates target the id the backend assigned on create or listing, not
//!   the engine's local `<sku>-<slot>` id

use std::time::Duration;

use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::json;

use rns_core::{InventoryRecord, MovementAction, MovementRecord, SlotId};
use rns_gateway::{GatewayError, HttpPersistenceGateway, PersistenceGateway};

fn gateway(server: &MockServer) -> HttpPersistenceGateway {
    HttpPersistenceGateway::from_parts(
        server.base_url(),
        "/productos".to_string(),
        "/movimientos".to_string(),
        Duration::from_secs(2),
    )
    .unwrap()
}

fn record() -> InventoryRecord {
    InventoryRecord {
        id: "17".to_string(),
        slot_id: SlotId::new("A", 2, 3),
        sku: "SKU-9".to_string(),
        name: "Arandela".to_string(),
        quantity: 40,
    }
}

#[tokio::test]
async fn list_products_maps_rows() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/productos");
            then.status(200).json_body(json!([
                { "id": 17, "sku": "SKU-9", "nombre": "Arandela", "cantidad": 40,
                  "rack": "A", "nivel": 2, "slot": 3, "descripcion": "x" },
                { "sku": "SKU-1", "nombre": "Perno", "cantidad": 2,
                  "rack": "B", "nivel": 1, "slot": 6 }
            ]));
        })
        .await;

    let rows = gateway(&server).list_products().await.unwrap();
    mock.assert_async().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], record());
    assert_eq!(rows[1].id, "SKU-1-B-1-6");
}

#[tokio::test]
async fn create_posts_backend_shape() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/productos").json_body(json!({
                "sku": "SKU-9", "nombre": "Arandela", "cantidad": 40,
                "descripcion": "Agregado desde interfaz RackNova",
                "rack": "A", "nivel": 2, "slot": 3
            }));
            then.status(201);
        })
        .await;

    gateway(&server).create_product(&record()).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn update_puts_by_id_and_delete_by_sku() {
    let server = MockServer::start_async().await;
    let put = server
        .mock_async(|when, then| {
            when.method(PUT).path("/productos/17");
            then.status(200);
        })
        .await;
    let del = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/productos/sku/SKU-9");
            then.status(204);
        })
        .await;

    let gw = gateway(&server);
    gw.update_product(&record()).await.unwrap();
    gw.delete_product_by_sku("SKU-9").await.unwrap();
    put.assert_async().await;
    del.assert_async().await;
}

#[tokio::test]
async fn movements_round_trip_through_backend_fields() {
    let server = MockServer::start_async().await;
    let list = server
        .mock_async(|when, then| {
            when.method(GET).path("/movimientos");
            then.status(200).json_body(json!([
                { "id_mov": 1, "accion": "Ingreso", "sku": "SKU-9", "producto": "Arandela",
                  "cantidad": 40, "ubicacion": "A-2-3", "usuario": "Ana",
                  "fecha": "2025-05-01T08:00:00Z" },
                { "id_mov": 2, "accion": "Traslado", "sku": "SKU-9", "producto": "Arandela",
                  "cantidad": 40, "ubicacion": "A-2-3", "fecha": "2025-05-01T09:00:00Z" }
            ]));
        })
        .await;
    let post = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/movimientos")
                .json_body_partial(r#"{"accion":"Egreso","ubicacion":"A-2-3","usuario":"Admin"}"#);
            then.status(201);
        })
        .await;

    let gw = gateway(&server);
    let history = gw.list_movements().await.unwrap();
    list.assert_async().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user, "Ana");

    let egreso = MovementRecord {
        id: "mov-000001".to_string(),
        action: MovementAction::Egreso,
        sku: "SKU-9".to_string(),
        name: "Arandela".to_string(),
        quantity: 40,
        location: "A-2-3".to_string(),
        user: "Admin".to_string(),
        timestamp: Utc.with_ymd_and_hms(2025, 5, 2, 10, 0, 0).unwrap(),
        previous_quantity: None,
        new_quantity: None,
    };
    gw.append_movement(&egreso).await.unwrap();
    post.assert_async().await;
}

#[tokio::test]
async fn server_errors_surface_status_and_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/productos");
            then.status(500).body("db down");
        })
        .await;

    let err = gateway(&server).create_product(&record()).await.unwrap_err();
    assert_eq!(
        err,
        GatewayError::Status {
            code: 500,
            body: "db down".to_string()
        }
    );
}

fn committed(sku: &str) -> InventoryRecord {
    InventoryRecord {
        id: format!("{sku}-A-2-3"),
        slot_id: SlotId::new("A", 2, 3),
        sku: sku.to_string(),
        name: "Arandela".to_string(),
        quantity: 40,
    }
}

#[tokio::test]
async fn delete_encodes_reserved_characters_in_sku() {
    let server = MockServer::start_async().await;
    let truncated = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/productos/sku/AB");
            then.status(204);
        })
        .await;
    let encoded = server
        .mock_async(|when, then| {
            when.method(DELETE).path_contains("/productos/sku/AB%231");
            then.status(204);
        })
        .await;

    gateway(&server).delete_product_by_sku("AB#1").await.unwrap();
    assert_eq!(truncated.hits_async().await, 0);
    encoded.assert_async().await;
}

#[tokio::test]
async fn update_after_create_targets_backend_id() {
    let server = MockServer::start_async().await;
    let post = server
        .mock_async(|when, then| {
            when.method(POST).path("/productos");
            then.status(201).json_body(json!({
                "id": 77, "sku": "SKU-4", "nombre": "Arandela", "cantidad": 40,
                "rack": "A", "nivel": 2, "slot": 3
            }));
        })
        .await;
    let local = server
        .mock_async(|when, then| {
            when.method(PUT).path("/productos/SKU-4-A-2-3");
            then.status(404);
        })
        .await;
    let put = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/productos/77")
                .json_body_partial(r#"{"sku":"SKU-4","cantidad":12}"#);
            then.status(200);
        })
        .await;

    let gw = gateway(&server);
    let mut record = committed("SKU-4");
    gw.create_product(&record).await.unwrap();
    record.quantity = 12;
    gw.update_product(&record).await.unwrap();

    post.assert_async().await;
    put.assert_async().await;
    assert_eq!(local.hits_async().await, 0);
}

#[tokio::test]
async fn listing_teaches_backend_ids_and_delete_forgets_them() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/productos");
            then.status(200).json_body(json!([
                { "id": "abc", "sku": "SKU-5", "nombre": "Perno", "cantidad": 2,
                  "rack": "A", "nivel": 2, "slot": 3 }
            ]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/productos/sku/SKU-5");
            then.status(204);
        })
        .await;

    let gw = gateway(&server);
    gw.list_products().await.unwrap();
    assert_eq!(gw.backend_id_for(&committed("SKU-5")).await, "abc");

    gw.delete_product_by_sku("SKU-5").await.unwrap();
    assert_eq!(gw.backend_id_for(&committed("SKU-5")).await, "SKU-5-A-2-3");
}
