//! Engine actor and effect execution.
//!
//! One task owns the [`SlotEngine`]. Dispatcher commands and inbound hardware
//! messages share a single `mpsc` inbox, so every mutation is serialized.
//! Commands carry a `oneshot` reply; hardware messages may or may not.
//!
//! The actor never awaits IO. Effects are handed off:
//! - publishes go to a single publisher task, in order
//! - persistence writes go to a single writer task, in order
//! - writes that fail land in the retry outbox, drained on an interval;
//!   later writes for the same sku wait behind them
//!
//! Logging levels per disposition:
//! - commits: `info`
//! - unchanged: `trace`
//! - stale / duplicate / unresolved / unrecognized: `debug`
//! - failed persistence writes: `warn`
//! - dropped writes: `error`

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use rns_config::StationConfig;
use rns_core::{
    CommandRejected, Disposition, Effect, HydrationReport, InboundMessage, InventoryRecord,
    MovementRecord, Observation, OutboundCommand, Outcome, ProductDraft, RecordEdit,
    ReconcileReport, SlotEngine, SlotId,
};
use rns_gateway::{
    drain_due, PersistenceGateway, PersistenceWrite, PersistenceWriteFailure, RetryOutbox,
    RetryPolicy,
};
use rns_transport::Transport;

use crate::state::{AppState, BusMsg, HydrationSummary};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub retry: RetryPolicy,
    pub outbox_capacity: usize,
    pub drain_interval: Duration,
    pub low_stock_threshold: u32,
    /// Bound of the engine inbox; senders wait when it is full.
    pub inbox_capacity: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            outbox_capacity: 1_024,
            drain_interval: Duration::from_secs(1),
            low_stock_threshold: rns_core::DEFAULT_LOW_STOCK_THRESHOLD,
            inbox_capacity: 256,
        }
    }
}

impl RuntimeSettings {
    pub fn from_station(cfg: &StationConfig) -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: cfg.retry.max_attempts,
                initial_delay: Duration::from_millis(cfg.retry.initial_backoff_ms),
                max_delay: Duration::from_millis(cfg.retry.max_backoff_ms),
                multiplier: cfg.retry.backoff_multiplier,
            },
            outbox_capacity: cfg.retry.capacity,
            drain_interval: Duration::from_millis(cfg.retry.drain_interval_ms),
            low_stock_threshold: cfg.station.low_stock_threshold,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Actor protocol
// ---------------------------------------------------------------------------

type Reply<T> = oneshot::Sender<T>;
type QueryJob = Box<dyn FnOnce(&SlotEngine) + Send>;

pub enum EngineMsg {
    Place {
        slot: SlotId,
        draft: ProductDraft,
        reply: Reply<Result<Outcome, CommandRejected>>,
    },
    Remove {
        sku: String,
        reply: Reply<Result<Outcome, CommandRejected>>,
    },
    Edit {
        record_id: String,
        edit: RecordEdit,
        reply: Reply<Result<Outcome, CommandRejected>>,
    },
    ClearRack {
        rack: String,
        reply: Reply<Result<Outcome, CommandRejected>>,
    },
    SetAdmission {
        admit: bool,
        reply: Reply<Outcome>,
    },
    Hardware {
        message: InboundMessage,
        reply: Option<Reply<ReconcileReport>>,
    },
    Hydrate {
        records: Vec<InventoryRecord>,
        history: Vec<MovementRecord>,
        reply: Reply<HydrationReport>,
    },
    Query(QueryJob),
}

/// The actor task is gone; nothing can be applied any more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineGone;

impl fmt::Display for EngineGone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("engine actor stopped")
    }
}

impl std::error::Error for EngineGone {}

pub type CommandResult = Result<Result<Outcome, CommandRejected>, EngineGone>;

#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineMsg>,
}

impl EngineHandle {
    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> EngineMsg) -> Result<T, EngineGone> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(build(tx)).await.map_err(|_| EngineGone)?;
        rx.await.map_err(|_| EngineGone)
    }

    pub async fn place(&self, slot: SlotId, draft: ProductDraft) -> CommandResult {
        self.call(|reply| EngineMsg::Place { slot, draft, reply }).await
    }

    pub async fn remove(&self, sku: String) -> CommandResult {
        self.call(|reply| EngineMsg::Remove { sku, reply }).await
    }

    pub async fn edit(&self, record_id: String, edit: RecordEdit) -> CommandResult {
        self.call(|reply| EngineMsg::Edit {
            record_id,
            edit,
            reply,
        })
        .await
    }

    pub async fn clear_rack(&self, rack: String) -> CommandResult {
        self.call(|reply| EngineMsg::ClearRack { rack, reply }).await
    }

    pub async fn set_admission(&self, admit: bool) -> Result<Outcome, EngineGone> {
        self.call(|reply| EngineMsg::SetAdmission { admit, reply }).await
    }

    /// Deliver a hardware message and wait for its report.
    pub async fn hardware(&self, message: InboundMessage) -> Result<ReconcileReport, EngineGone> {
        self.call(|reply| EngineMsg::Hardware {
            message,
            reply: Some(reply),
        })
        .await
    }

    /// Deliver a hardware message without waiting for it to be handled.
    pub async fn deliver(&self, message: InboundMessage) -> Result<(), EngineGone> {
        self.tx
            .send(EngineMsg::Hardware {
                message,
                reply: None,
            })
            .await
            .map_err(|_| EngineGone)
    }

    pub async fn hydrate(
        &self,
        records: Vec<InventoryRecord>,
        history: Vec<MovementRecord>,
    ) -> Result<HydrationReport, EngineGone> {
        self.call(|reply| EngineMsg::Hydrate {
            records,
            history,
            reply,
        })
        .await
    }

    /// Run a read-only closure against the engine, in inbox order.
    pub async fn query<R, F>(&self, f: F) -> Result<R, EngineGone>
    where
        R: Send + 'static,
        F: FnOnce(&SlotEngine) -> R + Send + 'static,
    {
        self.call(|reply| {
            EngineMsg::Query(Box::new(move |engine: &SlotEngine| {
                let _ = reply.send(f(engine));
            }))
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Hands engine effects to the outside world without blocking the actor.
#[derive(Clone)]
pub struct EffectSink {
    publishes: mpsc::UnboundedSender<OutboundCommand>,
    writes: mpsc::UnboundedSender<PersistenceWrite>,
    bus: broadcast::Sender<BusMsg>,
}

impl EffectSink {
    pub fn dispatch(&self, outcome: &Outcome) {
        for change in &outcome.changes {
            let _ = self.bus.send(BusMsg::SlotChanged(change.clone()));
        }
        for effect in &outcome.effects {
            if let Effect::Publish { command } = effect {
                if self.publishes.send(command.clone()).is_err() {
                    error!(topic = %command.topic, "publisher stopped; command lost");
                }
                continue;
            }
            if let Effect::PersistMovement { movement } = effect {
                let _ = self.bus.send(BusMsg::Movement(movement.clone()));
            }
            if let Some(write) = PersistenceWrite::from_effect(effect) {
                if self.writes.send(write).is_err() {
                    error!("persistence writer stopped; write lost");
                }
            }
        }
    }
}

/// Publish commands one at a time, in the order the engine emitted them.
pub fn spawn_publisher(
    transport: Arc<dyn Transport>,
    mut rx: mpsc::UnboundedReceiver<OutboundCommand>,
) {
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match transport.publish(&command).await {
                Ok(()) => debug!(topic = %command.topic, payload = %command.payload, "published"),
                Err(e) => warn!(
                    topic = %command.topic,
                    payload = %command.payload,
                    error = %e,
                    "publish failed"
                ),
            }
        }
    });
}

/// Apply writes in arrival order; failures go to the outbox. A write whose
/// sku still has something in the outbox is parked behind it untried.
pub fn spawn_persistence_writer(
    gateway: Arc<dyn PersistenceGateway>,
    outbox: Arc<Mutex<RetryOutbox>>,
    bus: broadcast::Sender<BusMsg>,
    mut rx: mpsc::UnboundedReceiver<PersistenceWrite>,
) {
    tokio::spawn(async move {
        while let Some(write) = rx.recv().await {
            {
                let mut ob = outbox.lock().await;
                if ob.blocks(write.sku()) {
                    debug!(kind = write.kind(), sku = write.sku(), "parked behind outbox");
                    if let Some(failure) = ob.park(write, Instant::now()) {
                        report_dropped(&bus, &failure);
                    }
                    continue;
                }
            }
            match write.apply(gateway.as_ref()).await {
                Ok(()) => debug!(kind = write.kind(), sku = write.sku(), "persisted"),
                Err(e) => {
                    warn!(
                        kind = write.kind(),
                        sku = write.sku(),
                        error = %e,
                        "persistence write failed; queued for retry"
                    );
                    let dropped = outbox
                        .lock()
                        .await
                        .enqueue(write, e.to_string(), Instant::now());
                    if let Some(failure) = dropped {
                        report_dropped(&bus, &failure);
                    }
                }
            }
        }
    });
}

/// Retry due outbox entries every `interval`.
pub fn spawn_outbox_drain(
    gateway: Arc<dyn PersistenceGateway>,
    outbox: Arc<Mutex<RetryOutbox>>,
    bus: broadcast::Sender<BusMsg>,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let report = drain_due(&outbox, gateway.as_ref(), Instant::now()).await;
            if report.attempted > 0 {
                info!(
                    attempted = report.attempted,
                    succeeded = report.succeeded,
                    requeued = report.requeued,
                    "outbox drain"
                );
            }
            for failure in &report.dropped {
                report_dropped(&bus, failure);
            }
        }
    });
}

/// Feed messages from a subscribing transport into the engine inbox.
pub fn spawn_inbound_forwarder(engine: EngineHandle, mut rx: mpsc::Receiver<InboundMessage>) {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if engine.deliver(message).await.is_err() {
                warn!("engine stopped; inbound forwarder exiting");
                return;
            }
        }
    });
}

fn report_dropped(bus: &broadcast::Sender<BusMsg>, failure: &PersistenceWriteFailure) {
    error!(
        kind = failure.write.kind(),
        sku = failure.write.sku(),
        attempts = failure.attempts,
        reason = %failure.reason,
        last_error = %failure.last_error,
        "persistence write dropped"
    );
    let _ = bus.send(BusMsg::LogLine {
        level: "ERROR".to_string(),
        msg: format!(
            "{} for sku '{}' dropped ({}) after {} attempt(s)",
            failure.write.kind(),
            failure.write.sku(),
            failure.reason,
            failure.attempts
        ),
    });
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

pub fn spawn_engine(engine: SlotEngine, sink: EffectSink, inbox_capacity: usize) -> EngineHandle {
    let (tx, rx) = mpsc::channel(inbox_capacity.max(1));
    tokio::spawn(run_engine(engine, rx, sink));
    EngineHandle { tx }
}

async fn run_engine(mut engine: SlotEngine, mut rx: mpsc::Receiver<EngineMsg>, sink: EffectSink) {
    while let Some(msg) = rx.recv().await {
        let now = Utc::now();
        match msg {
            EngineMsg::Place { slot, draft, reply } => {
                let result = engine.request_placement(&slot, draft, now);
                settle("place", &result, &sink);
                let _ = reply.send(result);
            }
            EngineMsg::Remove { sku, reply } => {
                let result = engine.request_removal(&sku);
                settle("remove", &result, &sink);
                let _ = reply.send(result);
            }
            EngineMsg::Edit {
                record_id,
                edit,
                reply,
            } => {
                let result = engine.request_edit(&record_id, edit, now);
                settle("edit", &result, &sink);
                let _ = reply.send(result);
            }
            EngineMsg::ClearRack { rack, reply } => {
                let result = engine.clear_rack(&rack, now);
                settle("clear_rack", &result, &sink);
                let _ = reply.send(result);
            }
            EngineMsg::SetAdmission { admit, reply } => {
                let outcome = engine.set_admission(admit);
                info!(admit, "admission command");
                sink.dispatch(&outcome);
                let _ = reply.send(outcome);
            }
            EngineMsg::Hardware { message, reply } => {
                let report = engine.handle_message(&message, now);
                log_report(&report);
                sink.dispatch(&report.outcome);
                if let Some(reply) = reply {
                    let _ = reply.send(report);
                }
            }
            EngineMsg::Hydrate {
                records,
                history,
                reply,
            } => {
                let report = engine.hydrate(records, history);
                for skip in &report.skipped {
                    warn!(
                        record_id = %skip.record_id,
                        sku = %skip.sku,
                        slot = %skip.slot,
                        reason = %skip.reason,
                        "persisted record not bound"
                    );
                }
                for change in &report.changes {
                    let _ = sink.bus.send(BusMsg::SlotChanged(change.clone()));
                }
                let _ = reply.send(report);
            }
            EngineMsg::Query(job) => job(&engine),
        }
    }
    info!("engine actor stopped");
}

fn settle(command: &str, result: &Result<Outcome, CommandRejected>, sink: &EffectSink) {
    match result {
        Ok(outcome) => {
            info!(command, changes = outcome.changes.len(), "command accepted");
            sink.dispatch(outcome);
        }
        Err(rejected) => info!(
            command,
            reason = rejected.reason_code(),
            detail = %rejected,
            "command rejected"
        ),
    }
}

fn log_report(report: &ReconcileReport) {
    match &report.observation {
        Observation::Status { .. } => {}
        Observation::MalformedPayload { tier_id, error } => {
            warn!(topic = %report.topic, tier_id = %tier_id, error = %error, "malformed status payload")
        }
        Observation::SystemState { tier_id, payload } => {
            debug!(tier_id = %tier_id, payload = %payload, "system state")
        }
        Observation::CommandEcho { tier_id, payload } => {
            debug!(tier_id = %tier_id, payload = %payload, "command echo")
        }
        Observation::Unrecognized => debug!(topic = %report.topic, "unrecognized topic"),
    }

    for entry in &report.entries {
        match entry {
            Disposition::PlacementCommitted {
                slot,
                record_id,
                sku,
            } => info!(slot = %slot, record_id = %record_id, sku = %sku, "placement committed"),
            Disposition::RemovalCommitted { slot, sku } => {
                info!(slot = %slot, sku = ?sku, "removal committed")
            }
            Disposition::Unchanged { slot, status } => {
                trace!(slot = %slot, status = %status, "unchanged")
            }
            Disposition::StaleConfirmation {
                slot,
                current,
                reported,
            } => debug!(
                slot = %slot,
                current = %current,
                reported = %reported,
                "stale confirmation dropped"
            ),
            Disposition::DuplicateConfirmation { slot } => {
                debug!(slot = %slot, "duplicate confirmation dropped")
            }
            Disposition::UnresolvedTopology { tier_id, channel } => {
                debug!(tier_id = %tier_id, channel, "unresolved channel")
            }
            Disposition::UnrecognizedStatus { slot, estado } => {
                debug!(slot = %slot, estado = %estado, "unrecognized estado")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Spawn the actor, writer and drain tasks and return the shared state.
/// Must be called inside a Tokio runtime.
pub fn start(
    engine: SlotEngine,
    transport: Arc<dyn Transport>,
    gateway: Arc<dyn PersistenceGateway>,
    settings: RuntimeSettings,
) -> Arc<AppState> {
    let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
    let outbox = Arc::new(Mutex::new(RetryOutbox::new(
        settings.retry.clone(),
        settings.outbox_capacity,
    )));

    let (publish_tx, publish_rx) = mpsc::unbounded_channel();
    spawn_publisher(transport, publish_rx);

    let (write_tx, write_rx) = mpsc::unbounded_channel();
    spawn_persistence_writer(
        Arc::clone(&gateway),
        Arc::clone(&outbox),
        bus.clone(),
        write_rx,
    );
    spawn_outbox_drain(
        Arc::clone(&gateway),
        Arc::clone(&outbox),
        bus.clone(),
        settings.drain_interval,
    );

    let sink = EffectSink {
        publishes: publish_tx,
        writes: write_tx,
        bus: bus.clone(),
    };
    let handle = spawn_engine(engine, sink, settings.inbox_capacity);

    Arc::new(AppState::new(
        bus,
        handle,
        outbox,
        settings.low_stock_threshold,
    ))
}

/// Load persisted records and movement history and bind them to the engine.
pub async fn hydrate_from_gateway(
    state: &AppState,
    gateway: &dyn PersistenceGateway,
) -> anyhow::Result<HydrationReport> {
    let records = gateway
        .list_products()
        .await
        .with_context(|| format!("hydration: list products via {}", gateway.name()))?;
    let history = gateway
        .list_movements()
        .await
        .with_context(|| format!("hydration: list movements via {}", gateway.name()))?;

    let report = state
        .engine
        .hydrate(records, history)
        .await
        .context("hydration: engine unavailable")?;

    info!(
        bound = report.bound,
        skipped = report.skipped.len(),
        movements = report.movements_loaded,
        "hydration complete"
    );
    state
        .mark_ready(
            Some(HydrationSummary {
                bound: report.bound,
                skipped: report.skipped.len(),
                movements_loaded: report.movements_loaded,
            }),
            None,
        )
        .await;
    Ok(report)
}
