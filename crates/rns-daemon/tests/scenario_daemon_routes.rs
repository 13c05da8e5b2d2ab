//! In-process scenario tests for rns-daemon HTTP endpoints.
//!
//! The router is driven through `tower::ServiceExt::oneshot`; no socket is
//! bound. The engine actor runs for real against a `RecordingTransport` and
//! an `InMemoryGateway`, so effects land asynchronously and are polled for.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use rns_core::{InboundMessage, InventoryRecord, Layout, SlotEngine, SlotId, Topology};
use rns_daemon::{routes, runtime, state::AppState};
use rns_gateway::{drain_due, InMemoryGateway};
use rns_transport::RecordingTransport;
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Station {
    state: Arc<AppState>,
    transport: Arc<RecordingTransport>,
    gateway: Arc<InMemoryGateway>,
}

fn settings() -> runtime::RuntimeSettings {
    runtime::RuntimeSettings {
        // keep failed writes parked so tests can see them
        drain_interval: Duration::from_secs(3_600),
        ..runtime::RuntimeSettings::default()
    }
}

async fn boot_with(gateway: InMemoryGateway) -> Station {
    let engine = SlotEngine::new(Layout::default(), Topology::racknova_default()).unwrap();
    let transport = Arc::new(RecordingTransport::new());
    let gateway = Arc::new(gateway);
    let state = runtime::start(engine, transport.clone(), gateway.clone(), settings());
    runtime::hydrate_from_gateway(&state, gateway.as_ref())
        .await
        .unwrap();
    Station {
        state,
        transport,
        gateway,
    }
}

async fn boot() -> Station {
    boot_with(InMemoryGateway::new()).await
}

async fn call(st: &Station, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    let resp = routes::build_router(Arc::clone(&st.state))
        .oneshot(req)
        .await
        .expect("oneshot failed");
    let status = resp.status();
    let bytes = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is not valid JSON")
    };
    (status, json)
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn place_body(slot: &str, sku: &str, quantity: u32) -> Value {
    json!({ "slot": slot, "sku": sku, "name": "Tornillo M6", "quantity": quantity })
}

fn status_event(tier: &str, channel: u16, estado: &str) -> Value {
    let mut payload = serde_json::Map::new();
    payload.insert(format!("p{channel}"), json!({ "estado": estado }));
    json!({
        "topic": format!("rack/{tier}/buttons/states"),
        "payload": Value::Object(payload)
    })
}

/// Place on A-1-1 (L3 channel 14) and confirm it.
async fn stock_a11(st: &Station, sku: &str, quantity: u32) {
    let (status, _) = call(st, "POST", "/v1/placements", Some(place_body("A-1-1", sku, quantity))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(
        st,
        "POST",
        "/v1/hardware/events",
        Some(status_event("L3", 14, "ocupado")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Health / status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let st = boot().await;
    let (status, json) = call(&st, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "rns-daemon");
}

#[tokio::test]
async fn status_reports_ready_and_all_slots_free() {
    let st = boot().await;
    let (status, json) = call(&st, "GET", "/v1/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "ready");
    assert!(!json["session_id"].is_null());
    assert_eq!(json["occupancy"]["free"], 90);
    assert_eq!(json["hydration"]["bound"], 0);
    assert!(json["admission"].is_null());
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn placement_publishes_and_marks_slot_placing() {
    let st = boot().await;
    let (status, json) =
        call(&st, "POST", "/v1/placements", Some(place_body("A-1-1", "SKU-1", 12))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["published"][0]["topic"], "Entrada/L3");
    assert_eq!(json["published"][0]["payload"], "p14c");
    assert_eq!(json["changes"][0]["to"], "placing");

    let (_, slot) = call(&st, "GET", "/v1/slots/A-1-1", None).await;
    assert_eq!(slot["slot"]["status"], "placing");
    assert_eq!(slot["pending_placement"]["draft"]["sku"], "SKU-1");

    let transport = st.transport.clone();
    eventually(|| {
        let t = transport.clone();
        async move { t.sent().await.len() == 1 }
    })
    .await;
}

#[tokio::test]
async fn placement_rejections_map_to_http_status() {
    let st = boot().await;
    call(&st, "POST", "/v1/placements", Some(place_body("A-1-1", "SKU-1", 1))).await;

    let (status, json) =
        call(&st, "POST", "/v1/placements", Some(place_body("A-1-1", "SKU-2", 1))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["reason"], "slot_not_free");

    let (status, json) =
        call(&st, "POST", "/v1/placements", Some(place_body("A-1-2", "SKU-1", 1))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["reason"], "duplicate_sku");

    let (status, json) =
        call(&st, "POST", "/v1/placements", Some(place_body("Z-1-1", "SKU-3", 1))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["reason"], "unknown_slot");

    // rack B has no controller in the stock wiring
    let (status, json) =
        call(&st, "POST", "/v1/placements", Some(place_body("B-1-1", "SKU-4", 1))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["reason"], "unwired");

    let (status, json) =
        call(&st, "POST", "/v1/placements", Some(place_body("A-1-3", "  ", 1))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["reason"], "invalid_draft");
}

// ---------------------------------------------------------------------------
// Hardware round trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn confirmation_commits_once_and_persists() {
    let st = boot().await;
    call(&st, "POST", "/v1/placements", Some(place_body("A-1-1", "SKU-1", 12))).await;

    let (status, json) = call(
        &st,
        "POST",
        "/v1/hardware/events",
        Some(status_event("L3", 14, "ocupado")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["observation"]["kind"], "status");
    assert_eq!(json["entries"][0]["kind"], "placement_committed");

    let (_, json) = call(
        &st,
        "POST",
        "/v1/hardware/events",
        Some(status_event("L3", 14, "ocupado")),
    )
    .await;
    assert_eq!(json["entries"][0]["kind"], "duplicate_confirmation");

    let (_, products) = call(&st, "GET", "/v1/products", None).await;
    assert_eq!(products["total"], 1);
    assert_eq!(products["products"][0]["rack"], "A");
    assert_eq!(products["products"][0]["slot_status"], "occupied");

    let (_, movements) = call(&st, "GET", "/v1/movements", None).await;
    assert_eq!(movements["movements"].as_array().unwrap().len(), 1);
    assert_eq!(movements["movements"][0]["action"], "Ingreso");

    let gateway = st.gateway.clone();
    eventually(|| {
        let g = gateway.clone();
        async move { g.products().await.len() == 1 && g.movements().await.len() == 1 }
    })
    .await;
}

#[tokio::test]
async fn removal_round_trip_deletes_and_records_egreso() {
    let st = boot().await;
    stock_a11(&st, "SKU-1", 5).await;

    let (status, json) = call(&st, "POST", "/v1/removals", Some(json!({ "sku": "SKU-1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["published"][0]["payload"], "q14q");

    let (status, json) = call(&st, "POST", "/v1/removals", Some(json!({ "sku": "SKU-1" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["reason"], "removal_pending");

    let (_, json) = call(
        &st,
        "POST",
        "/v1/hardware/events",
        Some(status_event("L3", 14, "libre")),
    )
    .await;
    assert_eq!(json["entries"][0]["kind"], "removal_committed");
    assert_eq!(json["entries"][0]["sku"], "SKU-1");

    let (_, movements) = call(&st, "GET", "/v1/movements", None).await;
    assert_eq!(movements["movements"][0]["action"], "Egreso");

    let gateway = st.gateway.clone();
    eventually(|| {
        let g = gateway.clone();
        async move { g.products().await.is_empty() && g.movements().await.len() == 2 }
    })
    .await;
}

#[tokio::test]
async fn removal_of_unknown_sku_is_404() {
    let st = boot().await;
    let (status, json) = call(&st, "POST", "/v1/removals", Some(json!({ "sku": "NOPE" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["reason"], "record_not_found");
}

#[tokio::test]
async fn system_state_is_observed_only() {
    let st = boot().await;
    let (_, json) = call(
        &st,
        "POST",
        "/v1/hardware/events",
        Some(json!({ "topic": "rack/L2/system/state", "payload": "ok" })),
    )
    .await;
    assert_eq!(json["observation"]["kind"], "system_state");
    assert!(json["changes"].as_array().unwrap().is_empty());

    let (_, status) = call(&st, "GET", "/v1/status", None).await;
    assert_eq!(status["system_states"]["L2"]["payload"], "ok");
}

// ---------------------------------------------------------------------------
// Edit / clear / admission / queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn edit_updates_record_and_appends_edicion() {
    let st = boot().await;
    stock_a11(&st, "SKU-1", 5).await;

    let (status, json) = call(
        &st,
        "POST",
        "/v1/products/SKU-1-A-1-1/edit",
        Some(json!({ "quantity": 8 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["movements"][0]["action"], "Edición");
    assert_eq!(json["movements"][0]["previous_quantity"], 5);
    assert_eq!(json["movements"][0]["new_quantity"], 8);

    let (status, json) = call(
        &st,
        "POST",
        "/v1/products/missing/edit",
        Some(json!({ "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["reason"], "record_not_found");
}

#[tokio::test]
async fn clear_rack_frees_every_slot() {
    let st = boot().await;
    stock_a11(&st, "SKU-1", 5).await;
    call(&st, "POST", "/v1/placements", Some(place_body("A-2-1", "SKU-2", 1))).await;

    let (status, json) = call(&st, "POST", "/v1/racks/A/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["changes"].as_array().unwrap().len(), 2);
    assert_eq!(json["movements"][0]["action"], "Egreso");

    let (_, slots) = call(&st, "GET", "/v1/slots?rack=A", None).await;
    let slots = slots["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 18);
    assert!(slots.iter().all(|s| s["status"] == "free"));

    let (status, json) = call(&st, "POST", "/v1/racks/Q/clear", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["reason"], "unknown_rack");
}

#[tokio::test]
async fn admission_publishes_and_shows_in_status() {
    let st = boot().await;
    let (status, json) = call(&st, "POST", "/v1/admission", Some(json!({ "admit": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["published"][0]["topic"], "Entrada/admision");
    assert_eq!(json["published"][0]["payload"], "8113");

    let (_, status) = call(&st, "GET", "/v1/status", None).await;
    assert_eq!(status["admission"], "admit");
}

#[tokio::test]
async fn low_stock_uses_threshold_query_or_default() {
    let st = boot().await;
    stock_a11(&st, "SKU-1", 10).await;

    let (_, json) = call(&st, "GET", "/v1/products/low-stock", None).await;
    assert_eq!(json["threshold"], 10);
    assert_eq!(json["products"].as_array().unwrap().len(), 1);

    let (_, json) = call(&st, "GET", "/v1/products/low-stock?threshold=3", None).await;
    assert!(json["products"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn bad_slot_id_in_path_is_400() {
    let st = boot().await;
    let (status, json) = call(&st, "GET", "/v1/slots/not-a-slot", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["reason"], "bad_request");
}

// ---------------------------------------------------------------------------
// Boot hydration / persistence failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hydration_binds_persisted_records() {
    let persisted = InventoryRecord {
        id: "41".to_string(),
        slot_id: SlotId::new("A", 2, 3),
        sku: "SKU-9".to_string(),
        name: "Arandela".to_string(),
        quantity: 40,
    };
    let st = boot_with(InMemoryGateway::seeded(vec![persisted], vec![])).await;

    let (_, json) = call(&st, "GET", "/v1/slots/A-2-3", None).await;
    assert_eq!(json["slot"]["status"], "occupied");
    assert_eq!(json["record"]["id"], "41");

    let (_, status) = call(&st, "GET", "/v1/status", None).await;
    assert_eq!(status["hydration"]["bound"], 1);
}

#[tokio::test]
async fn failed_write_is_parked_not_rolled_back() {
    let st = boot().await;
    st.gateway.fail_next(1).await;
    stock_a11(&st, "SKU-1", 5).await;

    // the Ingreso for the same sku waits behind the failed create
    let state = st.state.clone();
    eventually(|| {
        let s = state.clone();
        async move { s.outbox.lock().await.pending() == 2 }
    })
    .await;
    assert!(st.gateway.movements().await.is_empty());

    let (_, status) = call(&st, "GET", "/v1/status", None).await;
    assert_eq!(status["pending_writes"], 2);
    let (_, products) = call(&st, "GET", "/v1/products", None).await;
    assert_eq!(products["total"], 1);
}

#[tokio::test]
async fn retried_delete_does_not_erase_a_recreated_product() {
    let st = boot().await;
    stock_a11(&st, "SKU-1", 5).await;
    let gateway = st.gateway.clone();
    eventually(|| {
        let g = gateway.clone();
        async move { g.products().await.len() == 1 && g.movements().await.len() == 1 }
    })
    .await;

    st.gateway.fail_next(1).await;
    let (status, _) = call(&st, "POST", "/v1/removals", Some(json!({ "sku": "SKU-1" }))).await;
    assert_eq!(status, StatusCode::OK);
    call(&st, "POST", "/v1/hardware/events", Some(status_event("L3", 14, "libre"))).await;
    stock_a11(&st, "SKU-1", 7).await;

    // delete, Egreso, create, Ingreso all wait behind the failed delete
    let state = st.state.clone();
    eventually(|| {
        let s = state.clone();
        async move { s.outbox.lock().await.pending() == 4 }
    })
    .await;
    assert_eq!(st.gateway.products().await[0].quantity, 5);

    let later = tokio::time::Instant::now() + Duration::from_secs(3_600);
    let report = drain_due(&st.state.outbox, st.gateway.as_ref(), later).await;
    assert_eq!((report.attempted, report.succeeded), (4, 4));

    let products = st.gateway.products().await;
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].sku, "SKU-1");
    assert_eq!(products[0].quantity, 7);
    let actions: Vec<_> = st
        .gateway
        .movements()
        .await
        .iter()
        .map(|m| m.action.to_string())
        .collect();
    assert_eq!(actions, vec!["Ingreso", "Egreso", "Ingreso"]);

    let (_, status) = call(&st, "GET", "/v1/status", None).await;
    assert_eq!(status["pending_writes"], 0);
    let (_, products) = call(&st, "GET", "/v1/products", None).await;
    assert_eq!(products["total"], 1);
}

#[tokio::test]
async fn publishes_reach_the_transport_in_issue_order() {
    let st = boot().await;
    call(&st, "POST", "/v1/admission", Some(json!({ "admit": true }))).await;
    stock_a11(&st, "SKU-1", 5).await;
    call(&st, "POST", "/v1/removals", Some(json!({ "sku": "SKU-1" }))).await;
    call(&st, "POST", "/v1/admission", Some(json!({ "admit": false }))).await;

    let transport = st.transport.clone();
    eventually(|| {
        let t = transport.clone();
        async move { t.sent().await.len() == 4 }
    })
    .await;
    let payloads: Vec<_> = st
        .transport
        .sent()
        .await
        .into_iter()
        .map(|c| c.payload)
        .collect();
    assert_eq!(payloads, vec!["8113", "p14c", "q14q", "0"]);
}

#[tokio::test]
async fn subscribed_messages_are_forwarded_to_the_engine() {
    let st = boot().await;
    let (status, _) = call(&st, "POST", "/v1/placements", Some(place_body("A-1-1", "SKU-1", 3))).await;
    assert_eq!(status, StatusCode::OK);

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    runtime::spawn_inbound_forwarder(st.state.engine.clone(), rx);
    tx.send(InboundMessage::new(
        "rack/L3/buttons/states",
        r#"{"p14":{"estado":"ocupado"}}"#,
    ))
    .await
    .unwrap();

    let state = st.state.clone();
    eventually(|| {
        let s = state.clone();
        async move {
            s.engine
                .query(|e| e.record_by_sku("SKU-1").is_some())
                .await
                .unwrap_or(false)
        }
    })
    .await;
    let (_, slot) = call(&st, "GET", "/v1/slots/A-1-1", None).await;
    assert_eq!(slot["slot"]["status"], "occupied");
}
