//! Axum router and all HTTP handlers for rns-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers talk to the engine only through
//! [`EngineHandle`](crate::runtime::EngineHandle).

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use rns_core::{CommandRejected, OccupancyReport, Outcome, RecordEdit, SlotId};
use rns_transport::BridgeEvent;

use crate::{
    api_types::{
        AdmissionRequest, CommandAccepted, ErrorResponse, HardwareEventResponse, HealthResponse,
        LowStockResponse, MovementsResponse, PendingResponse, PlacementRequest, ProductsResponse,
        RemovalRequest, SlotDetailResponse, SlotsResponse,
    },
    runtime::EngineGone,
    state::{uptime_secs, AppState, BusMsg, StatusSnapshot},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/slots", get(list_slots))
        .route("/v1/slots/:slot_id", get(slot_detail))
        .route("/v1/occupancy", get(occupancy))
        .route("/v1/pending", get(pending))
        .route("/v1/products", get(list_products))
        .route("/v1/products/low-stock", get(low_stock))
        .route("/v1/products/:record_id/edit", post(edit_product))
        .route("/v1/movements", get(list_movements))
        .route("/v1/placements", post(place))
        .route("/v1/removals", post(remove))
        .route("/v1/racks/:rack/clear", post(clear_rack))
        .route("/v1/admission", post(set_admission))
        .route("/v1/hardware/events", post(hardware_event))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

pub(crate) enum ApiError {
    Rejected(CommandRejected),
    BadRequest(String),
    EngineGone,
}

impl From<EngineGone> for ApiError {
    fn from(_: EngineGone) -> Self {
        ApiError::EngineGone
    }
}

/// HTTP status for a dispatcher rejection.
pub fn rejection_status(rejected: &CommandRejected) -> StatusCode {
    match rejected {
        CommandRejected::SlotNotFree { .. }
        | CommandRejected::DuplicateSku { .. }
        | CommandRejected::RemovalPending { .. }
        | CommandRejected::Unwired { .. } => StatusCode::CONFLICT,
        CommandRejected::RecordNotFound { .. }
        | CommandRejected::UnknownSlot { .. }
        | CommandRejected::UnknownRack { .. } => StatusCode::NOT_FOUND,
        CommandRejected::InvalidDraft { .. } => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Rejected(r) => (
                rejection_status(&r),
                ErrorResponse {
                    error: r.to_string(),
                    reason: r.reason_code().to_string(),
                },
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: msg,
                    reason: "bad_request".to_string(),
                },
            ),
            ApiError::EngineGone => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse {
                    error: EngineGone.to_string(),
                    reason: "engine_unavailable".to_string(),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

fn accepted(result: Result<Outcome, CommandRejected>) -> Result<Response, ApiError> {
    let outcome = result.map_err(ApiError::Rejected)?;
    Ok((StatusCode::OK, Json(CommandAccepted::from(outcome))).into_response())
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(
    State(st): State<Arc<AppState>>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let mut snap = st.status.read().await.clone();
    snap.daemon_uptime_secs = uptime_secs();

    let (admission, occupancy, system_states) = st
        .engine
        .query(|e| (e.admission(), e.occupancy().overall, e.system_states().clone()))
        .await?;
    snap.admission = admission;
    snap.occupancy = occupancy;
    snap.system_states = system_states;

    {
        let outbox = st.outbox.lock().await;
        snap.pending_writes = outbox.pending();
        snap.dropped_writes = outbox.dropped_total();
    }

    let _ = st.bus.send(BusMsg::Status(snap.clone()));
    Ok(Json(snap))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct SlotFilter {
    rack: Option<String>,
}

pub(crate) async fn list_slots(
    State(st): State<Arc<AppState>>,
    Query(filter): Query<SlotFilter>,
) -> Result<Json<SlotsResponse>, ApiError> {
    let slots = st
        .engine
        .query(move |e| {
            e.slots()
                .into_iter()
                .filter(|s| filter.rack.as_deref().map_or(true, |r| s.rack == r))
                .collect()
        })
        .await?;
    Ok(Json(SlotsResponse { slots }))
}

pub(crate) async fn slot_detail(
    State(st): State<Arc<AppState>>,
    Path(slot_id): Path<String>,
) -> Result<Json<SlotDetailResponse>, ApiError> {
    let id: SlotId = slot_id
        .parse()
        .map_err(|e: rns_core::SlotIdError| ApiError::BadRequest(e.to_string()))?;
    let lookup = id.clone();
    let detail = st
        .engine
        .query(move |e| {
            let slot = e.slot(&lookup)?.clone();
            Some(SlotDetailResponse {
                record: e.record_by_slot(&lookup).cloned(),
                pending_placement: e
                    .pending_placements()
                    .into_iter()
                    .find(|p| p.slot_id == lookup),
                pending_removal: e.pending_removals().contains(&lookup),
                slot,
            })
        })
        .await?;
    detail
        .map(Json)
        .ok_or(ApiError::Rejected(CommandRejected::UnknownSlot { slot: id }))
}

pub(crate) async fn occupancy(
    State(st): State<Arc<AppState>>,
) -> Result<Json<OccupancyReport>, ApiError> {
    Ok(Json(st.engine.query(|e| e.occupancy()).await?))
}

pub(crate) async fn pending(
    State(st): State<Arc<AppState>>,
) -> Result<Json<PendingResponse>, ApiError> {
    let resp = st
        .engine
        .query(|e| PendingResponse {
            placements: e.pending_placements(),
            removals: e.pending_removals(),
        })
        .await?;
    Ok(Json(resp))
}

pub(crate) async fn list_products(
    State(st): State<Arc<AppState>>,
) -> Result<Json<ProductsResponse>, ApiError> {
    let resp = st
        .engine
        .query(|e| ProductsResponse {
            total: e.total_products(),
            products: e.records_with_location(),
        })
        .await?;
    Ok(Json(resp))
}

#[derive(Debug, Deserialize)]
pub(crate) struct LowStockQuery {
    threshold: Option<u32>,
}

pub(crate) async fn low_stock(
    State(st): State<Arc<AppState>>,
    Query(q): Query<LowStockQuery>,
) -> Result<Json<LowStockResponse>, ApiError> {
    let threshold = q.threshold.unwrap_or(st.low_stock_threshold);
    let products = st.engine.query(move |e| e.low_stock(threshold)).await?;
    Ok(Json(LowStockResponse {
        threshold,
        products,
    }))
}

pub(crate) async fn list_movements(
    State(st): State<Arc<AppState>>,
) -> Result<Json<MovementsResponse>, ApiError> {
    let movements = st.engine.query(|e| e.movements()).await?;
    Ok(Json(MovementsResponse { movements }))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub(crate) async fn place(
    State(st): State<Arc<AppState>>,
    Json(req): Json<PlacementRequest>,
) -> Result<Response, ApiError> {
    info!(slot = %req.slot, sku = %req.sku, "placement requested");
    accepted(st.engine.place(req.slot.clone(), req.draft()).await?)
}

pub(crate) async fn remove(
    State(st): State<Arc<AppState>>,
    Json(req): Json<RemovalRequest>,
) -> Result<Response, ApiError> {
    info!(sku = %req.sku, "removal requested");
    accepted(st.engine.remove(req.sku).await?)
}

pub(crate) async fn edit_product(
    State(st): State<Arc<AppState>>,
    Path(record_id): Path<String>,
    Json(edit): Json<RecordEdit>,
) -> Result<Response, ApiError> {
    accepted(st.engine.edit(record_id, edit).await?)
}

pub(crate) async fn clear_rack(
    State(st): State<Arc<AppState>>,
    Path(rack): Path<String>,
) -> Result<Response, ApiError> {
    info!(rack = %rack, "rack clear requested");
    let result = st.engine.clear_rack(rack.clone()).await?;
    if result.is_ok() {
        st.log_line("WARN", format!("rack {rack} cleared"));
    }
    accepted(result)
}

pub(crate) async fn set_admission(
    State(st): State<Arc<AppState>>,
    Json(req): Json<AdmissionRequest>,
) -> Result<Response, ApiError> {
    accepted(Ok(st.engine.set_admission(req.admit).await?))
}

// ---------------------------------------------------------------------------
// POST /v1/hardware/events  (broker bridge webhook)
// ---------------------------------------------------------------------------

pub(crate) async fn hardware_event(
    State(st): State<Arc<AppState>>,
    Json(event): Json<BridgeEvent>,
) -> Result<Json<HardwareEventResponse>, ApiError> {
    let report = st.engine.hardware(event.into_message()).await?;
    Ok(Json(HardwareEventResponse {
        topic: report.topic,
        observation: report.observation,
        entries: report.entries,
        changes: report.outcome.changes,
    }))
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
