//! Config hash stability
//!
//! GREEN when:
//! - the same layered input hashes identically on every load;
//! - key order inside a document does not change the hash;
//! - a changed value changes the hash;
//! - overlays override the base and the typed view sees the override.

use rns_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
station:
  operator: "Admin"
layout:
  racks: ["A", "B", "C"]
  tiers: 3
  slots_per_tier: 6
gateway:
  base_url: "http://localhost:3000"
  products_path: "/productos"
  movements_path: "/movimientos"
"#;

const BASE_YAML_REORDERED: &str = r#"
gateway:
  movements_path: "/movimientos"
  products_path: "/productos"
  base_url: "http://localhost:3000"
layout:
  slots_per_tier: 6
  tiers: 3
  racks: ["A", "B", "C"]
station:
  operator: "Admin"
"#;

const OVERLAY_YAML: &str = r#"
station:
  operator: "Turno Noche"
gateway:
  base_url: "http://inventory.internal:8080"
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(
        a.config_hash, b.config_hash,
        "key order must not affect the hash"
    );
}

#[test]
fn different_values_produce_different_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_reaches_the_typed_view() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    let station = loaded.station().unwrap();
    assert_eq!(station.station.operator, "Turno Noche");
    assert_eq!(station.gateway.base_url, "http://inventory.internal:8080");
    // untouched by the overlay
    assert_eq!(station.gateway.products_path, "/productos");
    assert_eq!(station.layout.racks, vec!["A", "B", "C"]);
}

#[test]
fn hash_is_64_hex_chars() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(loaded.config_hash.len(), 64);
    assert!(loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}
