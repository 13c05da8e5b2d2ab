//! JSONL replay: feed a recorded sequence of commands and hardware messages
//! through an offline engine and report what happened.
//!
//! One step per line, tagged by `op`:
//!
//! ```text
//! {"op":"place","slot":"A-1-1","sku":"SKU-1","name":"Tornillo","quantity":5}
//! {"op":"hardware","topic":"rack/L3/buttons/states","payload":{"p14":{"estado":"ocupado"}}}
//! {"op":"remove","sku":"SKU-1"}
//! {"op":"edit","record_id":"SKU-1-A-1-1","quantity":3}
//! {"op":"clear_rack","rack":"A"}
//! {"op":"admission","admit":true}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rns_core::{
    CommandRejected, Disposition, InventoryRecord, InvariantViolation, MovementRecord, Outcome,
    OutboundCommand, ProductDraft, RecordEdit, Slot, SlotId, SlotStatus,
};

use crate::Harness;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplayStep {
    Place {
        slot: SlotId,
        sku: String,
        name: String,
        quantity: u32,
    },
    Remove {
        sku: String,
    },
    Edit {
        record_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        quantity: Option<u32>,
    },
    ClearRack {
        rack: String,
    },
    Admission {
        admit: bool,
    },
    Hardware {
        topic: String,
        #[serde(default)]
        payload: Value,
    },
}

impl ReplayStep {
    pub fn op(&self) -> &'static str {
        match self {
            ReplayStep::Place { .. } => "place",
            ReplayStep::Remove { .. } => "remove",
            ReplayStep::Edit { .. } => "edit",
            ReplayStep::ClearRack { .. } => "clear_rack",
            ReplayStep::Admission { .. } => "admission",
            ReplayStep::Hardware { .. } => "hardware",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub line: usize,
    pub op: String,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dispositions: Vec<Disposition>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub published: Vec<OutboundCommand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub steps: Vec<StepResult>,
    /// Slots that are not free at the end.
    pub slots: Vec<Slot>,
    pub records: Vec<InventoryRecord>,
    pub movements: Vec<MovementRecord>,
    pub violations: Vec<InvariantViolation>,
}

/// Parse a JSONL replay file. Line numbers are 1-based.
pub fn parse_replay(text: &str) -> Result<Vec<(usize, ReplayStep)>> {
    let mut steps = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step: ReplayStep = serde_json::from_str(line)
            .with_context(|| format!("replay line {}: not a valid step", i + 1))?;
        steps.push((i + 1, step));
    }
    Ok(steps)
}

fn payload_text(payload: Value) -> String {
    match payload {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn command_result(line: usize, op: &str, result: Result<Outcome, CommandRejected>) -> StepResult {
    match result {
        Ok(outcome) => StepResult {
            line,
            op: op.to_string(),
            accepted: true,
            reason: None,
            dispositions: Vec::new(),
            published: outcome.publishes().cloned().collect(),
        },
        Err(rejected) => StepResult {
            line,
            op: op.to_string(),
            accepted: false,
            reason: Some(rejected.reason_code().to_string()),
            dispositions: Vec::new(),
            published: Vec::new(),
        },
    }
}

pub fn run_replay(harness: &mut Harness, steps: Vec<(usize, ReplayStep)>) -> ReplayReport {
    let mut results = Vec::with_capacity(steps.len());
    for (line, step) in steps {
        let op = step.op();
        let result = match step {
            ReplayStep::Place {
                slot,
                sku,
                name,
                quantity,
            } => command_result(
                line,
                op,
                harness.place_draft(&slot, ProductDraft::new(sku, name, quantity)),
            ),
            ReplayStep::Remove { sku } => command_result(line, op, harness.remove(&sku)),
            ReplayStep::Edit {
                record_id,
                name,
                quantity,
            } => command_result(
                line,
                op,
                harness.edit(&record_id, RecordEdit { name, quantity }),
            ),
            ReplayStep::ClearRack { rack } => command_result(line, op, harness.clear_rack(&rack)),
            ReplayStep::Admission { admit } => {
                command_result(line, op, Ok(harness.set_admission(admit)))
            }
            ReplayStep::Hardware { topic, payload } => {
                let report = harness.deliver(&topic, &payload_text(payload));
                StepResult {
                    line,
                    op: op.to_string(),
                    accepted: true,
                    reason: None,
                    published: report.outcome.publishes().cloned().collect(),
                    dispositions: report.entries,
                }
            }
        };
        results.push(result);
    }

    let engine = &harness.engine;
    ReplayReport {
        steps: results,
        slots: engine
            .slots()
            .into_iter()
            .filter(|s| s.status != SlotStatus::Free)
            .collect(),
        records: engine.records(),
        movements: engine.movements(),
        violations: engine.check_invariants(),
    }
}
