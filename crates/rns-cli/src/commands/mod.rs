//! Offline command handlers for `rns`.
//!
//! Nothing here talks to the broker or the persistence backend: every
//! command works from the layered config and a local engine.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use rns_config::{
    load_layered_yaml, load_layered_yaml_from_strings, report_unused_keys, ConfigConsumer,
    LoadedConfig, StationConfig, UnusedKeyPolicy,
};
use rns_core::{CommandKind, OutboundCommand, SlotId, Topology};
use rns_testkit::{load_replay_jsonl, run_replay, Harness, ReplayReport};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Layered config, or the built-in defaults when no paths are given.
pub fn load_config(paths: &[PathBuf]) -> Result<LoadedConfig> {
    if paths.is_empty() {
        return load_layered_yaml_from_strings(&[]);
    }
    load_layered_yaml(paths)
}

/// Typed station config. Unused keys are reported on stderr, never fatal.
pub fn load_station(paths: &[PathBuf]) -> Result<StationConfig> {
    let loaded = load_config(paths)?;
    let report = report_unused_keys(
        ConfigConsumer::Offline,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !report.is_clean() {
        tracing::warn!(
            consumer = %report.consumer,
            unused = ?report.unused_leaf_pointers,
            "config has keys offline tools do not read"
        );
    }
    loaded.station()
}

// ---------------------------------------------------------------------------
// topology
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct TierView {
    pub tier_id: String,
    pub rack: String,
    pub level: u8,
    pub status_topic: String,
    pub command_topic: String,
    /// Slot id -> physical channel.
    pub channels: BTreeMap<String, u16>,
}

#[derive(Debug, Serialize)]
pub struct TopologyView {
    pub racks: Vec<String>,
    pub tiers_per_rack: u8,
    pub slots_per_tier: u8,
    pub wired: Vec<TierView>,
    pub unwired_slots: usize,
    pub admission: rns_core::Admission,
    pub subscriptions: Vec<String>,
}

pub fn topology_view(station: &StationConfig) -> Result<TopologyView> {
    let topology: Topology = station.topology()?;
    let layout = &station.layout;

    let wired: Vec<TierView> = topology
        .tiers()
        .iter()
        .map(|b| TierView {
            tier_id: b.tier_id.clone(),
            rack: b.rack.clone(),
            level: b.level,
            status_topic: topology.status_topic(&b.tier_id),
            command_topic: topology.command_topic(&b.tier_id),
            channels: b
                .channels
                .iter()
                .map(|(index, ch)| (SlotId::new(b.rack.clone(), b.level, *index).to_string(), *ch))
                .collect(),
        })
        .collect();

    let total = layout.racks.len() * usize::from(layout.tiers) * usize::from(layout.slots_per_tier);
    let wired_count: usize = wired.iter().map(|t| t.channels.len()).sum();

    Ok(TopologyView {
        racks: layout.racks.clone(),
        tiers_per_rack: layout.tiers,
        slots_per_tier: layout.slots_per_tier,
        unwired_slots: total.saturating_sub(wired_count),
        wired,
        admission: topology.admission().clone(),
        subscriptions: topology.subscriptions(),
    })
}

// ---------------------------------------------------------------------------
// encode
// ---------------------------------------------------------------------------

pub fn encode(station: &StationConfig, slot: &str, kind: CommandKind) -> Result<OutboundCommand> {
    let slot: SlotId = slot
        .parse()
        .with_context(|| format!("invalid --slot '{slot}'"))?;
    if !station.layout.contains(&slot) {
        bail!("slot {slot} is not in the layout");
    }
    let topology = station.topology()?;
    match topology.command_for(&slot, kind) {
        Some(cmd) => Ok(cmd),
        None => bail!("slot {slot} has no wired channel"),
    }
}

// ---------------------------------------------------------------------------
// replay
// ---------------------------------------------------------------------------

pub fn replay(station: &StationConfig, file: &str) -> Result<ReplayReport> {
    let steps = load_replay_jsonl(file)?;
    let mut harness = Harness::from_engine(station.build_engine()?);
    Ok(run_replay(&mut harness, steps))
}
