//! JSON shapes spoken by the persistence backend.
//!
//! Field names follow the backend (`nombre`, `cantidad`, `nivel`, ...). Conversion
//! to and from `rns-core` types happens here and nowhere else.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rns_core::{InventoryRecord, MovementAction, MovementRecord, SlotId};

/// Description written on every product created from a physical placement.
pub const CREATED_DESCRIPTION: &str = "Agregado desde interfaz RackNova";

#[derive(Debug, Clone, Deserialize)]
pub struct ProductRow {
    #[serde(default)]
    pub id: Option<Value>,
    pub sku: String,
    pub nombre: String,
    pub cantidad: u32,
    pub rack: String,
    pub nivel: u8,
    pub slot: u8,
}

impl ProductRow {
    pub fn into_record(self) -> InventoryRecord {
        let slot_id = SlotId::new(self.rack, self.nivel, self.slot);
        let id = id_to_string(self.id.as_ref())
            .unwrap_or_else(|| format!("{}-{}", self.sku, slot_id));
        InventoryRecord {
            id,
            slot_id,
            sku: self.sku,
            name: self.nombre,
            quantity: self.cantidad,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProduct<'a> {
    pub sku: &'a str,
    pub nombre: &'a str,
    pub cantidad: u32,
    pub descripcion: &'a str,
    pub rack: &'a str,
    pub nivel: u8,
    pub slot: u8,
}

impl<'a> NewProduct<'a> {
    pub fn from_record(record: &'a InventoryRecord) -> Self {
        Self {
            sku: &record.sku,
            nombre: &record.name,
            cantidad: record.quantity,
            descripcion: CREATED_DESCRIPTION,
            rack: &record.slot_id.rack,
            nivel: record.slot_id.tier,
            slot: record.slot_id.index,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovementRow {
    #[serde(default)]
    pub id_mov: Option<Value>,
    pub accion: String,
    pub sku: String,
    pub producto: String,
    pub cantidad: u32,
    pub ubicacion: String,
    #[serde(default)]
    pub usuario: Option<String>,
    pub fecha: String,
    #[serde(default)]
    pub cantidad_anterior: Option<u32>,
    #[serde(default)]
    pub cantidad_nueva: Option<u32>,
}

impl MovementRow {
    /// `None` when the action or date cannot be understood.
    pub fn into_movement(self, fallback_user: &str) -> Option<MovementRecord> {
        let action = MovementAction::parse(&self.accion)?;
        let timestamp = parse_fecha(&self.fecha)?;
        let id = id_to_string(self.id_mov.as_ref())
            .unwrap_or_else(|| format!("{}-{}-{}", self.sku, action, timestamp.timestamp()));
        Some(MovementRecord {
            id,
            action,
            sku: self.sku,
            name: self.producto,
            quantity: self.cantidad,
            location: self.ubicacion,
            user: self.usuario.unwrap_or_else(|| fallback_user.to_string()),
            timestamp,
            previous_quantity: self.cantidad_anterior,
            new_quantity: self.cantidad_nueva,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMovement<'a> {
    pub accion: &'a str,
    pub sku: &'a str,
    pub producto: &'a str,
    pub cantidad: u32,
    pub ubicacion: &'a str,
    pub usuario: &'a str,
    pub fecha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cantidad_anterior: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cantidad_nueva: Option<u32>,
}

impl<'a> NewMovement<'a> {
    pub fn from_movement(m: &'a MovementRecord) -> Self {
        Self {
            accion: m.action.as_str(),
            sku: &m.sku,
            producto: &m.name,
            cantidad: m.quantity,
            ubicacion: &m.location,
            usuario: &m.user,
            fecha: m.timestamp.to_rfc3339(),
            cantidad_anterior: m.previous_quantity,
            cantidad_nueva: m.new_quantity,
        }
    }
}

pub(crate) fn id_to_string(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// RFC 3339, or a bare `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS` taken as UTC.
pub fn parse_fecha(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
