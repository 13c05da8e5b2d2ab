//! rns-config
//!
//! Layered YAML configuration for a RackNova station.
//!
//! - Documents are merged in order: earlier docs are base, later docs override.
//! - Literal secrets in any leaf are rejected (`CONFIG_SECRET_DETECTED`).
//!   Credentials are stored as env var NAMES and resolved by [`secrets`].
//! - The merged document is canonicalized and hashed (SHA-256, hex).
//! - Unused keys are reported against a registry of consumed JSON-pointer
//!   prefixes per consumer, as a warning or a hard failure.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

pub mod secrets;
pub mod station;

pub use secrets::{resolve_secrets, ResolvedSecrets};
pub use station::{
    CredentialsEnv, GatewayConfig, MqttConfig, RetryConfig, StationConfig, StationSection,
    TopologyConfig, TransportConfig, TransportKind,
};

/// Leaf string values starting with one of these abort the load.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "gho_",
    "glpat-",
    "xoxb-",
    "xoxp-",
    "Basic ",
    "Bearer ",
];

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

/// Who is reading the config. Each consumer reads a different subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigConsumer {
    /// The long-running daemon: engine, gateway, transport, retry.
    Daemon,
    /// Offline tools (`rns topology`, `rns encode`, `rns replay`).
    Offline,
}

impl ConfigConsumer {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigConsumer::Daemon => "DAEMON",
            ConfigConsumer::Offline => "OFFLINE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub consumer: String,
    /// Consumed JSON-pointer prefixes used for this analysis (sorted, unique)
    pub consumed_prefixes: Vec<String>,
    /// Unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Registry of consumed JSON-pointer prefixes per consumer.
///
/// Must list only what [`StationConfig`] actually deserializes for that
/// consumer.
pub fn consumed_pointers_for(consumer: ConfigConsumer) -> &'static [&'static str] {
    match consumer {
        ConfigConsumer::Offline => &[
            "/station/operator",
            "/station/low_stock_threshold",
            "/layout",
            "/topology",
        ],
        ConfigConsumer::Daemon => &[
            "/station/operator",
            "/station/low_stock_threshold",
            "/layout",
            "/topology",
            "/gateway/base_url",
            "/gateway/timeout_ms",
            "/gateway/products_path",
            "/gateway/movements_path",
            "/transport/kind",
            "/transport/publish_url",
            "/transport/timeout_ms",
            "/transport/qos",
            "/transport/auth_required",
            "/transport/credentials_env/username",
            "/transport/credentials_env/password",
            "/transport/mqtt/host",
            "/transport/mqtt/port",
            "/transport/mqtt/client_id",
            "/transport/mqtt/keep_alive_secs",
            "/retry/max_attempts",
            "/retry/initial_backoff_ms",
            "/retry/max_backoff_ms",
            "/retry/backoff_multiplier",
            "/retry/drain_interval_ms",
            "/retry/capacity",
        ],
    }
}

/// Produce an unused-key report for a consumer.
/// `Fail` errors when unused keys exist; `Warn` always returns the report.
pub fn report_unused_keys(
    consumer: ConfigConsumer,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<String> = consumed_pointers_for(consumer)
        .iter()
        .map(|p| normalize_pointer(p))
        .collect();
    let consumed_prefixes: Vec<String> = consumed.into_iter().collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|leaf| !consumed_prefixes.iter().any(|cp| is_prefix_pointer(cp, leaf)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        consumer: consumer.as_str().to_string(),
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS (consumer={}): {} unused config leaf key(s) detected. \
            Remove them or update the consumed registry. First few: {}",
            report.consumer,
            report.unused_leaf_pointers.len(),
            preview_list(&report.unused_leaf_pointers, 12)
        );
    }

    Ok(report)
}

fn normalize_pointer(p: &str) -> String {
    let mut s = p.trim().to_string();
    if s.is_empty() {
        return "/".to_string();
    }
    if !s.starts_with('/') {
        s.insert(0, '/');
    }
    while s.ends_with('/') && s.len() > 1 {
        s.pop();
    }
    s
}

/// `"/a/b"` covers `"/a/b"` and `"/a/b/c"` but not `"/a/bc"`.
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" || leaf == prefix {
        return true;
    }
    leaf.strip_prefix(prefix)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn preview_list(items: &[String], n: usize) -> String {
    let take = items.iter().take(n).cloned().collect::<Vec<_>>();
    format!("{:?}", take)
}

// ---------------------------------------------------------------------------
// Layered loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of the merged document; missing sections take defaults.
    pub fn station(&self) -> Result<StationConfig> {
        StationConfig::from_config_json(&self.config_json)
    }
}

pub fn load_layered_yaml<P: AsRef<std::path::Path>>(paths: &[P]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let p = p.as_ref();
        let raw = fs::read_to_string(p)
            .with_context(|| format!("failed to read yaml path: {}", p.display()))?;
        docs.push(raw);
    }
    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty document parses as null; treat it as an empty layer.
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// Compact JSON with object keys sorted at every level.
fn canonicalize_json(v: &Value) -> Result<String> {
    fn sorted(v: &Value) -> Value {
        match v {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serde_json::Map::new();
                for k in keys {
                    out.insert(k.clone(), sorted(&map[k]));
                }
                Value::Object(out)
            }
            Value::Array(arr) => Value::Array(arr.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_string(&sorted(v)).context("canonical json serialize failed")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(|val| val.as_str()) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
