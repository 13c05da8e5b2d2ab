//! Static translation tables between the physical wiring and logical slots.
//!
//! A deployment is a [`Layout`] (which slots exist) plus a [`Topology`] (which
//! of those slots are wired to hardware, on which topics and channels).
//!
//! Channel maps are kept **per tier**: the stock deployment does not use the
//! same physical channel for the same slot index on every tier.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::slot::SlotId;
use crate::wire::encode_command;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// The set of slots that exist: every rack × tier × index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub racks: Vec<String>,
    pub tiers: u8,
    pub slots_per_tier: u8,
}

impl Default for Layout {
    /// Five racks (`A`..`E`), three tiers, six slots per tier.
    fn default() -> Self {
        Self {
            racks: ["A", "B", "C", "D", "E"]
                .iter()
                .map(|r| r.to_string())
                .collect(),
            tiers: 3,
            slots_per_tier: 6,
        }
    }
}

impl Layout {
    pub fn contains(&self, slot: &SlotId) -> bool {
        self.racks.iter().any(|r| *r == slot.rack)
            && (1..=self.tiers).contains(&slot.tier)
            && (1..=self.slots_per_tier).contains(&slot.index)
    }
}

// ---------------------------------------------------------------------------
// Topic scheme
// ---------------------------------------------------------------------------

/// Topic templates; `{tier}` is replaced by a tier identifier such as `L3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicScheme {
    pub status: String,
    pub system: String,
    pub command: String,
    pub echo: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            status: "rack/{tier}/buttons/states".to_string(),
            system: "rack/{tier}/system/state".to_string(),
            command: "Entrada/{tier}".to_string(),
            echo: "Salida/{tier}".to_string(),
        }
    }
}

const TIER_PLACEHOLDER: &str = "{tier}";

fn render(template: &str, tier_id: &str) -> String {
    template.replace(TIER_PLACEHOLDER, tier_id)
}

/// Extract the tier identifier from `topic` if it matches `template`.
fn match_template<'t>(template: &str, topic: &'t str) -> Option<&'t str> {
    let (prefix, suffix) = template.split_once(TIER_PLACEHOLDER)?;
    let rest = topic.strip_prefix(prefix)?;
    let tier = rest.strip_suffix(suffix)?;
    if tier.is_empty() || tier.contains('/') {
        return None;
    }
    Some(tier)
}

/// What an inbound topic refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicKind {
    /// Per-channel status report from a wired tier.
    Status { tier_id: String },
    /// Controller system state for a tier (observed only).
    SystemState { tier_id: String },
    /// Echo of our own command topic, or a controller reply (observed only).
    CommandEcho { tier_id: String },
    /// Anything else.
    Unrecognized,
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Topic and payloads of the station-wide admit/restrict switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Admission {
    pub topic: String,
    pub admit_payload: String,
    pub restrict_payload: String,
}

impl Default for Admission {
    fn default() -> Self {
        Self {
            topic: "Entrada/admision".to_string(),
            admit_payload: "8113".to_string(),
            restrict_payload: "0".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tier binding
// ---------------------------------------------------------------------------

/// One physical controller: a tier identifier wired to `(rack, level)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBinding {
    /// Identifier used in topics, e.g. `L3`.
    pub tier_id: String,
    pub rack: String,
    /// Logical tier (level) of the slots this controller drives.
    pub level: u8,
    /// Slot index -> physical channel id.
    pub channels: BTreeMap<u8, u16>,
}

impl TierBinding {
    pub fn channel_for(&self, index: u8) -> Option<u16> {
        self.channels.get(&index).copied()
    }

    pub fn index_for(&self, channel: u16) -> Option<u8> {
        self.channels
            .iter()
            .find(|(_, ch)| **ch == channel)
            .map(|(idx, _)| *idx)
    }
}

/// Which actuator command to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Place,
    Remove,
}

/// A topic + payload ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundCommand {
    pub topic: String,
    pub payload: String,
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// Errors raised while building a [`Topology`] or checking it against a layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    DuplicateTierId(String),
    DuplicateLevel { rack: String, level: u8 },
    DuplicateChannel { tier_id: String, channel: u16 },
    TemplateMissingPlaceholder(String),
    OutsideLayout { tier_id: String, slot: String },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyError::DuplicateTierId(t) => write!(f, "tier id '{t}' bound twice"),
            TopologyError::DuplicateLevel { rack, level } => {
                write!(f, "rack {rack} level {level} bound to more than one tier")
            }
            TopologyError::DuplicateChannel { tier_id, channel } => {
                write!(f, "tier {tier_id}: channel {channel} mapped to more than one slot")
            }
            TopologyError::TemplateMissingPlaceholder(t) => {
                write!(f, "topic template '{t}' has no {{tier}} placeholder")
            }
            TopologyError::OutsideLayout { tier_id, slot } => {
                write!(f, "tier {tier_id}: slot {slot} is not part of the layout")
            }
        }
    }
}

impl std::error::Error for TopologyError {}

/// Channel/tier translation tables for one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    scheme: TopicScheme,
    admission: Admission,
    tiers: Vec<TierBinding>,
}

impl Topology {
    pub fn new(
        scheme: TopicScheme,
        admission: Admission,
        tiers: Vec<TierBinding>,
    ) -> Result<Self, TopologyError> {
        for t in [&scheme.status, &scheme.system, &scheme.command, &scheme.echo] {
            if !t.contains(TIER_PLACEHOLDER) {
                return Err(TopologyError::TemplateMissingPlaceholder(t.clone()));
            }
        }

        let mut tier_ids = BTreeSet::new();
        let mut levels = BTreeSet::new();
        for binding in &tiers {
            if !tier_ids.insert(binding.tier_id.clone()) {
                return Err(TopologyError::DuplicateTierId(binding.tier_id.clone()));
            }
            if !levels.insert((binding.rack.clone(), binding.level)) {
                return Err(TopologyError::DuplicateLevel {
                    rack: binding.rack.clone(),
                    level: binding.level,
                });
            }
            let mut seen = BTreeSet::new();
            for ch in binding.channels.values() {
                if !seen.insert(*ch) {
                    return Err(TopologyError::DuplicateChannel {
                        tier_id: binding.tier_id.clone(),
                        channel: *ch,
                    });
                }
            }
        }

        Ok(Self {
            scheme,
            admission,
            tiers,
        })
    }

    /// The stock station: rack `A` wired on three controllers. Dashboard tier 1
    /// is controller `L3`, tier 2 is `L2`, tier 3 is `L1`.
    pub fn racknova_default() -> Self {
        let map = |pins: [u16; 6]| -> BTreeMap<u8, u16> {
            pins.iter()
                .enumerate()
                .map(|(i, ch)| (i as u8 + 1, *ch))
                .collect()
        };
        Self {
            scheme: TopicScheme::default(),
            admission: Admission::default(),
            tiers: vec![
                TierBinding {
                    tier_id: "L3".to_string(),
                    rack: "A".to_string(),
                    level: 1,
                    channels: map([14, 12, 32, 26, 35, 33]),
                },
                TierBinding {
                    tier_id: "L2".to_string(),
                    rack: "A".to_string(),
                    level: 2,
                    channels: map([14, 12, 32, 26, 27, 33]),
                },
                TierBinding {
                    tier_id: "L1".to_string(),
                    rack: "A".to_string(),
                    level: 3,
                    channels: map([14, 27, 32, 26, 35, 33]),
                },
            ],
        }
    }

    /// One controller per tier of `rack`, tier id `T<level>`, channel == index.
    pub fn identity(rack: &str, tiers: u8, slots_per_tier: u8) -> Self {
        let bindings = (1..=tiers)
            .map(|level| TierBinding {
                tier_id: format!("T{level}"),
                rack: rack.to_string(),
                level,
                channels: (1..=slots_per_tier).map(|i| (i, u16::from(i))).collect(),
            })
            .collect();
        Self {
            scheme: TopicScheme::default(),
            admission: Admission::default(),
            tiers: bindings,
        }
    }

    /// Every binding must address slots that exist in `layout`.
    pub fn check_against(&self, layout: &Layout) -> Result<(), TopologyError> {
        for binding in &self.tiers {
            for index in binding.channels.keys() {
                let slot = SlotId::new(binding.rack.clone(), binding.level, *index);
                if !layout.contains(&slot) {
                    return Err(TopologyError::OutsideLayout {
                        tier_id: binding.tier_id.clone(),
                        slot: slot.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn tiers(&self) -> &[TierBinding] {
        &self.tiers
    }

    pub fn scheme(&self) -> &TopicScheme {
        &self.scheme
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    pub fn binding(&self, tier_id: &str) -> Option<&TierBinding> {
        self.tiers.iter().find(|b| b.tier_id == tier_id)
    }

    pub fn binding_for_slot(&self, slot: &SlotId) -> Option<&TierBinding> {
        self.tiers
            .iter()
            .find(|b| b.rack == slot.rack && b.level == slot.tier)
    }

    /// Resolve `(tier_id, channel)` to the slot it drives.
    pub fn slot_for_channel(&self, tier_id: &str, channel: u16) -> Option<SlotId> {
        let binding = self.binding(tier_id)?;
        let index = binding.index_for(channel)?;
        Some(SlotId::new(binding.rack.clone(), binding.level, index))
    }

    pub fn command_topic(&self, tier_id: &str) -> String {
        render(&self.scheme.command, tier_id)
    }

    pub fn status_topic(&self, tier_id: &str) -> String {
        render(&self.scheme.status, tier_id)
    }

    /// Outbound actuator command for `slot`, or `None` if the slot is not wired.
    pub fn command_for(&self, slot: &SlotId, kind: CommandKind) -> Option<OutboundCommand> {
        let binding = self.binding_for_slot(slot)?;
        let channel = binding.channel_for(slot.index)?;
        Some(OutboundCommand {
            topic: self.command_topic(&binding.tier_id),
            payload: encode_command(kind, channel),
        })
    }

    pub fn admission_command(&self, admit: bool) -> OutboundCommand {
        OutboundCommand {
            topic: self.admission.topic.clone(),
            payload: if admit {
                self.admission.admit_payload.clone()
            } else {
                self.admission.restrict_payload.clone()
            },
        }
    }

    /// Classify an inbound topic. Only topics naming a bound tier match.
    pub fn classify(&self, topic: &str) -> TopicKind {
        let bound = |tier: &str| self.binding(tier).is_some();

        if let Some(tier) = match_template(&self.scheme.status, topic) {
            if bound(tier) {
                return TopicKind::Status {
                    tier_id: tier.to_string(),
                };
            }
        }
        if let Some(tier) = match_template(&self.scheme.system, topic) {
            if bound(tier) {
                return TopicKind::SystemState {
                    tier_id: tier.to_string(),
                };
            }
        }
        for template in [&self.scheme.echo, &self.scheme.command] {
            if let Some(tier) = match_template(template, topic) {
                if bound(tier) {
                    return TopicKind::CommandEcho {
                        tier_id: tier.to_string(),
                    };
                }
            }
        }
        TopicKind::Unrecognized
    }

    /// Every topic a bridge should forward to the engine.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut out = Vec::new();
        for b in &self.tiers {
            out.push(render(&self.scheme.status, &b.tier_id));
            out.push(render(&self.scheme.system, &b.tier_id));
            out.push(render(&self.scheme.echo, &b.tier_id));
            out.push(render(&self.scheme.command, &b.tier_id));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_maps_tier_one_to_controller_l3() {
        let topo = Topology::racknova_default();
        let cmd = topo
            .command_for(&SlotId::new("A", 1, 1), CommandKind::Place)
            .unwrap();
        assert_eq!(cmd.topic, "Entrada/L3");
        assert_eq!(cmd.payload, "p14c");
    }

    #[test]
    fn channel_maps_differ_per_tier() {
        let topo = Topology::racknova_default();
        let t2 = topo
            .command_for(&SlotId::new("A", 2, 5), CommandKind::Remove)
            .unwrap();
        assert_eq!(t2.payload, "q27q");
        let t3 = topo
            .command_for(&SlotId::new("A", 3, 2), CommandKind::Remove)
            .unwrap();
        assert_eq!(t3.topic, "Entrada/L1");
        assert_eq!(t3.payload, "q27q");

        assert_eq!(topo.slot_for_channel("L2", 27), Some(SlotId::new("A", 2, 5)));
        assert_eq!(topo.slot_for_channel("L1", 27), Some(SlotId::new("A", 3, 2)));
        assert_eq!(topo.slot_for_channel("L3", 27), None);
    }

    #[test]
    fn unwired_rack_has_no_command() {
        let topo = Topology::racknova_default();
        assert!(topo
            .command_for(&SlotId::new("B", 1, 1), CommandKind::Place)
            .is_none());
    }

    #[test]
    fn classify_recognises_bound_tiers_only() {
        let topo = Topology::racknova_default();
        assert_eq!(
            topo.classify("rack/L2/buttons/states"),
            TopicKind::Status {
                tier_id: "L2".to_string()
            }
        );
        assert_eq!(
            topo.classify("rack/L1/system/state"),
            TopicKind::SystemState {
                tier_id: "L1".to_string()
            }
        );
        assert_eq!(
            topo.classify("Salida/L3"),
            TopicKind::CommandEcho {
                tier_id: "L3".to_string()
            }
        );
        assert_eq!(topo.classify("rack/L9/buttons/states"), TopicKind::Unrecognized);
        assert_eq!(topo.classify("racknova/slots/update"), TopicKind::Unrecognized);
    }

    #[test]
    fn duplicate_channel_in_a_tier_is_rejected() {
        let mut channels = BTreeMap::new();
        channels.insert(1, 14);
        channels.insert(2, 14);
        let err = Topology::new(
            TopicScheme::default(),
            Admission::default(),
            vec![TierBinding {
                tier_id: "L1".to_string(),
                rack: "A".to_string(),
                level: 1,
                channels,
            }],
        )
        .unwrap_err();
        assert!(matches!(err, TopologyError::DuplicateChannel { channel: 14, .. }));
    }

    #[test]
    fn binding_outside_layout_is_rejected() {
        let layout = Layout {
            racks: vec!["A".to_string()],
            tiers: 2,
            slots_per_tier: 6,
        };
        let err = Topology::racknova_default()
            .check_against(&layout)
            .unwrap_err();
        assert!(matches!(err, TopologyError::OutsideLayout { .. }));
        assert!(Topology::racknova_default()
            .check_against(&Layout::default())
            .is_ok());
    }

    #[test]
    fn admission_command_uses_configured_payloads() {
        let topo = Topology::racknova_default();
        assert_eq!(topo.admission_command(true).payload, "8113");
        assert_eq!(topo.admission_command(false).payload, "0");
        assert_eq!(topo.admission_command(false).topic, "Entrada/admision");
    }

    #[test]
    fn subscriptions_cover_every_tier() {
        let topo = Topology::racknova_default();
        let subs = topo.subscriptions();
        assert_eq!(subs.len(), 12);
        assert!(subs.contains(&"rack/L3/buttons/states".to_string()));
        assert!(subs.contains(&"Entrada/L1".to_string()));
    }
}
