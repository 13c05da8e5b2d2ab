//! Shared runtime state for rns-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The engine itself lives
//! in the actor task (see `runtime.rs`); this module only holds handles to it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rns_core::{
    AdmissionMode, MovementRecord, SlotChange, StatusCounts, SystemObservation,
};
use rns_gateway::RetryOutbox;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use uuid::Uuid;

use crate::runtime::EngineHandle;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Status(StatusSnapshot),
    SlotChanged(SlotChange),
    Movement(MovementRecord),
    LogLine { level: String, msg: String },
}

impl BusMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Status(_) => "status",
            BusMsg::SlotChanged(_) => "slot",
            BusMsg::Movement(_) => "movement",
            BusMsg::LogLine { .. } => "log",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HydrationSummary {
    pub bound: usize,
    pub skipped: usize,
    pub movements_loaded: usize,
}

/// Point-in-time snapshot of the daemon, returned by GET /v1/status and
/// carried inside SSE `status` events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub session_id: Uuid,
    /// "booting" | "ready"
    pub state: String,
    pub notes: Option<String>,
    pub hydration: Option<HydrationSummary>,
    /// Last admission command sent; `None` until one is.
    pub admission: Option<AdmissionMode>,
    pub occupancy: StatusCounts,
    pub system_states: BTreeMap<String, SystemObservation>,
    /// Writes queued in the retry outbox or being retried.
    pub pending_writes: usize,
    pub dropped_writes: u64,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    /// Lifecycle part of the status snapshot; live fields are filled per request.
    pub status: Arc<RwLock<StatusSnapshot>>,
    pub engine: EngineHandle,
    pub outbox: Arc<Mutex<RetryOutbox>>,
    pub low_stock_threshold: u32,
}

impl AppState {
    pub fn new(
        bus: broadcast::Sender<BusMsg>,
        engine: EngineHandle,
        outbox: Arc<Mutex<RetryOutbox>>,
        low_stock_threshold: u32,
    ) -> Self {
        let initial_status = StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            session_id: Uuid::new_v4(),
            state: "booting".to_string(),
            notes: Some("waiting for hydration".to_string()),
            hydration: None,
            admission: None,
            occupancy: StatusCounts::default(),
            system_states: BTreeMap::new(),
            pending_writes: 0,
            dropped_writes: 0,
        };

        Self {
            bus,
            build: BuildInfo {
                service: "rns-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            status: Arc::new(RwLock::new(initial_status)),
            engine,
            outbox,
            low_stock_threshold,
        }
    }

    /// Mark the daemon ready, recording what hydration loaded if anything.
    pub async fn mark_ready(&self, hydration: Option<HydrationSummary>, notes: Option<String>) {
        let snap = {
            let mut s = self.status.write().await;
            s.state = "ready".to_string();
            s.hydration = hydration;
            s.notes = notes;
            s.daemon_uptime_secs = uptime_secs();
            s.clone()
        };
        let _ = self.bus.send(BusMsg::Status(snap));
    }

    pub fn log_line(&self, level: &str, msg: impl Into<String>) {
        let _ = self.bus.send(BusMsg::LogLine {
            level: level.to_string(),
            msg: msg.into(),
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
