//! Deterministic engine harness.
//!
//! Wraps a [`SlotEngine`] with a fake clock that advances one second per
//! operation and records every effect the engine asks for, so scenarios can
//! assert on what would have been published or persisted.

use chrono::{DateTime, Duration, TimeZone, Utc};

use rns_core::{
    CommandRejected, Effect, HydrationReport, InboundMessage, InventoryRecord, Layout, MovementRecord, Outcome,
    OutboundCommand, ProductDraft, ReconcileReport, RecordEdit, SlotEngine, SlotId, SlotStatus,
    Topology,
};

pub struct Harness {
    pub engine: SlotEngine,
    clock: DateTime<Utc>,
    /// Every publish, in order.
    pub published: Vec<OutboundCommand>,
    /// Every persistence effect, in order.
    pub writes: Vec<Effect>,
}

impl Harness {
    pub fn from_engine(engine: SlotEngine) -> Self {
        Self {
            engine,
            clock: Utc
                .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
            published: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// One rack, tier ids `T<level>`, channel equal to slot index.
    pub fn identity(rack: &str, tiers: u8, slots_per_tier: u8) -> Self {
        let layout = Layout {
            racks: vec![rack.to_string()],
            tiers,
            slots_per_tier,
        };
        let topology = Topology::identity(rack, tiers, slots_per_tier);
        match SlotEngine::new(layout, topology) {
            Ok(engine) => Self::from_engine(engine),
            Err(e) => panic!("identity topology must fit its own layout: {e}"),
        }
    }

    /// The stock five-rack station wired on rack A.
    pub fn stock() -> Self {
        match SlotEngine::new(Layout::default(), Topology::racknova_default()) {
            Ok(engine) => Self::from_engine(engine),
            Err(e) => panic!("stock topology must fit the stock layout: {e}"),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock
    }

    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += Duration::seconds(1);
        self.clock
    }

    fn record(&mut self, outcome: &Outcome) {
        for effect in &outcome.effects {
            match effect {
                Effect::Publish { command } => self.published.push(command.clone()),
                other => self.writes.push(other.clone()),
            }
        }
    }

    fn settle(&mut self, result: Result<Outcome, CommandRejected>) -> Result<Outcome, CommandRejected> {
        if let Ok(outcome) = &result {
            self.record(outcome);
        }
        result
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    pub fn place(&mut self, slot: &str, sku: &str, quantity: u32) -> Result<Outcome, CommandRejected> {
        let draft = ProductDraft::new(sku, format!("Producto {sku}"), quantity);
        self.place_draft(&parse_slot(slot), draft)
    }

    pub fn place_draft(
        &mut self,
        slot: &SlotId,
        draft: ProductDraft,
    ) -> Result<Outcome, CommandRejected> {
        let now = self.tick();
        let result = self.engine.request_placement(slot, draft, now);
        self.settle(result)
    }

    pub fn remove(&mut self, sku: &str) -> Result<Outcome, CommandRejected> {
        self.tick();
        let result = self.engine.request_removal(sku);
        self.settle(result)
    }

    pub fn edit(&mut self, record_id: &str, edit: RecordEdit) -> Result<Outcome, CommandRejected> {
        let now = self.tick();
        let result = self.engine.request_edit(record_id, edit, now);
        self.settle(result)
    }

    pub fn clear_rack(&mut self, rack: &str) -> Result<Outcome, CommandRejected> {
        let now = self.tick();
        let result = self.engine.clear_rack(rack, now);
        self.settle(result)
    }

    pub fn set_admission(&mut self, admit: bool) -> Outcome {
        self.tick();
        let outcome = self.engine.set_admission(admit);
        self.record(&outcome);
        outcome
    }

    pub fn hydrate(
        &mut self,
        records: Vec<InventoryRecord>,
        history: Vec<MovementRecord>,
    ) -> HydrationReport {
        self.engine.hydrate(records, history)
    }

    // -----------------------------------------------------------------------
    // Hardware
    // -----------------------------------------------------------------------

    pub fn deliver(&mut self, topic: &str, payload: &str) -> ReconcileReport {
        let now = self.tick();
        let report = self
            .engine
            .handle_message(&InboundMessage::new(topic, payload.as_bytes().to_vec()), now);
        self.record(&report.outcome);
        report
    }

    /// A single-channel status report on `tier_id`'s status topic.
    pub fn report(&mut self, tier_id: &str, channel: u16, estado: &str) -> ReconcileReport {
        let topic = self.engine.topology().status_topic(tier_id);
        let mut payload = serde_json::Map::new();
        payload.insert(format!("p{channel}"), serde_json::json!({ "estado": estado }));
        self.deliver(&topic, &serde_json::Value::Object(payload).to_string())
    }

    /// Report `estado` for `slot` on the channel its tier binds it to.
    pub fn report_slot(&mut self, slot: &str, estado: &str) -> ReconcileReport {
        let id = parse_slot(slot);
        let (tier_id, channel) = {
            let binding = match self.engine.topology().binding_for_slot(&id) {
                Some(b) => b,
                None => panic!("slot {id} is not wired"),
            };
            match binding.channel_for(id.index) {
                Some(ch) => (binding.tier_id.clone(), ch),
                None => panic!("slot {id} has no channel"),
            }
        };
        self.report(&tier_id, channel, estado)
    }

    // -----------------------------------------------------------------------
    // Assertions
    // -----------------------------------------------------------------------

    pub fn status(&self, slot: &str) -> SlotStatus {
        let id = parse_slot(slot);
        match self.engine.slot(&id) {
            Some(s) => s.status,
            None => panic!("slot {id} not in layout"),
        }
    }

    pub fn movements_for(&self, sku: &str) -> Vec<MovementRecord> {
        self.engine
            .movements()
            .into_iter()
            .filter(|m| m.sku == sku)
            .collect()
    }

    pub fn assert_invariants(&self) {
        let violations = self.engine.check_invariants();
        assert!(violations.is_empty(), "invariant violations: {violations:?}");
    }
}

fn parse_slot(slot: &str) -> SlotId {
    match slot.parse() {
        Ok(id) => id,
        Err(e) => panic!("{e}"),
    }
}
