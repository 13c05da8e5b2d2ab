//! Typed station configuration.
//!
//! Every section is optional; defaults reproduce the stock RackNova station
//! (racks A-E, three tiers of six slots, rack A wired on controllers L3/L2/L1).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rns_core::{
    Admission, Layout, SlotEngine, TierBinding, TopicScheme, Topology, DEFAULT_LOW_STOCK_THRESHOLD,
    DEFAULT_OPERATOR,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StationConfig {
    pub station: StationSection,
    pub layout: Layout,
    pub topology: TopologyConfig,
    pub gateway: GatewayConfig,
    pub transport: TransportConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationSection {
    /// User label written on every movement.
    pub operator: String,
    pub low_stock_threshold: u32,
}

impl Default for StationSection {
    fn default() -> Self {
        Self {
            operator: DEFAULT_OPERATOR.to_string(),
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub topics: TopicScheme,
    pub admission: Admission,
    pub tiers: Vec<TierBinding>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        let stock = Topology::racknova_default();
        Self {
            topics: stock.scheme().clone(),
            admission: stock.admission().clone(),
            tiers: stock.tiers().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub products_path: String,
    pub movements_path: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_ms: 5_000,
            products_path: "/products".to_string(),
            movements_path: "/movements".to_string(),
        }
    }
}

/// Env var NAMES holding the bridge credentials. Never the values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsEnv {
    pub username: String,
    pub password: String,
}

impl Default for CredentialsEnv {
    fn default() -> Self {
        Self {
            username: "RNS_BRIDGE_USERNAME".to_string(),
            password: "RNS_BRIDGE_PASSWORD".to_string(),
        }
    }
}

/// How the daemon reaches the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// HTTP publish API; inbound messages arrive as webhook deliveries.
    #[default]
    Bridge,
    /// Native MQTT client that publishes and subscribes itself.
    Mqtt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "racknova-daemon".to_string(),
            keep_alive_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// Broker HTTP publish endpoint.
    pub publish_url: String,
    pub timeout_ms: u64,
    pub qos: u8,
    /// Fail start-up when the bridge credentials are not in the environment.
    pub auth_required: bool,
    pub credentials_env: CredentialsEnv,
    /// Used when `kind` is `mqtt`.
    pub mqtt: MqttConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            publish_url: "http://localhost:18083/api/v5/publish".to_string(),
            timeout_ms: 3_000,
            qos: 0,
            auth_required: false,
            credentials_env: CredentialsEnv::default(),
            mqtt: MqttConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub drain_interval_ms: u64,
    /// Outbox bound; the oldest entry is dropped when full.
    pub capacity: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            drain_interval_ms: 1_000,
            capacity: 1_024,
        }
    }
}

impl StationConfig {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let cfg: StationConfig = serde_json::from_value(config_json.clone())
            .context("CONFIG_INVALID: station config does not match schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.layout.racks.is_empty() || self.layout.tiers == 0 || self.layout.slots_per_tier == 0
        {
            bail!("CONFIG_INVALID: layout must have at least one rack, tier and slot");
        }
        if self.station.operator.trim().is_empty() {
            bail!("CONFIG_INVALID: station.operator must not be empty");
        }
        if self.gateway.base_url.trim().is_empty() {
            bail!("CONFIG_INVALID: gateway.base_url must not be empty");
        }
        for (key, path) in [
            ("gateway.products_path", &self.gateway.products_path),
            ("gateway.movements_path", &self.gateway.movements_path),
        ] {
            if !path.starts_with('/') {
                bail!("CONFIG_INVALID: {key} must start with '/' (got '{path}')");
            }
        }
        if self.transport.qos > 2 {
            bail!("CONFIG_INVALID: transport.qos must be 0, 1 or 2");
        }
        if self.transport.kind == TransportKind::Mqtt {
            let mqtt = &self.transport.mqtt;
            if mqtt.host.trim().is_empty() || mqtt.client_id.trim().is_empty() {
                bail!("CONFIG_INVALID: transport.mqtt.host and client_id must not be empty");
            }
            if mqtt.keep_alive_secs == 0 {
                bail!("CONFIG_INVALID: transport.mqtt.keep_alive_secs must be > 0");
            }
        }
        if self.retry.max_attempts == 0 || self.retry.capacity == 0 {
            bail!("CONFIG_INVALID: retry.max_attempts and retry.capacity must be > 0");
        }
        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            bail!("CONFIG_INVALID: retry.backoff_multiplier must be >= 1.0");
        }
        self.topology()?;
        Ok(())
    }

    /// Validated topology, checked against the layout.
    pub fn topology(&self) -> Result<Topology> {
        let topology = Topology::new(
            self.topology.topics.clone(),
            self.topology.admission.clone(),
            self.topology.tiers.clone(),
        )
        .context("CONFIG_INVALID: topology")?;
        topology
            .check_against(&self.layout)
            .context("CONFIG_INVALID: topology does not fit layout")?;
        Ok(topology)
    }

    /// A fresh engine for this station.
    pub fn build_engine(&self) -> Result<SlotEngine> {
        let engine = SlotEngine::new(self.layout.clone(), self.topology()?)
            .context("engine construction failed")?
            .with_operator(self.station.operator.clone());
        Ok(engine)
    }
}
