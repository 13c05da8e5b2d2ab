//! HTTP persistence gateway.
//!
//! ```text
//! GET    {base}{products}            -> [ProductRow]
//! POST   {base}{products}            <- NewProduct
//! PUT    {base}{products}/{id}       <- NewProduct
//! DELETE {base}{products}/sku/{sku}
//! GET    {base}{movements}           -> [MovementRow]
//! POST   {base}{movements}           <- NewMovement
//! ```
//!
//! Path segments are percent-encoded. Records committed by the engine carry
//! a local id; the id the backend assigns is learned from the create answer
//! (or from a listing) and used for updates.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use rns_core::{InventoryRecord, MovementRecord, DEFAULT_OPERATOR};

use crate::wire::{id_to_string, MovementRow, NewMovement, NewProduct, ProductRow};
use crate::{GatewayError, PersistenceGateway};

// ---------------------------------------------------------------------------
// Backend ids
// ---------------------------------------------------------------------------

/// sku -> id assigned by the backend.
///
/// Register after every create whose answer carries an id, forget after a
/// delete. A missing entry means the id is unknown; callers fall back to the
/// record's own id rather than guessing.
#[derive(Debug, Clone, Default)]
pub struct BackendIdMap {
    map: BTreeMap<String, String>,
}

impl BackendIdMap {
    pub fn register(&mut self, sku: impl Into<String>, backend_id: impl Into<String>) {
        self.map.insert(sku.into(), backend_id.into());
    }

    pub fn backend_id(&self, sku: &str) -> Option<&str> {
        self.map.get(sku).map(String::as_str)
    }

    pub fn forget(&mut self, sku: &str) {
        self.map.remove(sku);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpPersistenceGateway {
    http: reqwest::Client,
    base_url: String,
    products_path: String,
    movements_path: String,
    ids: Arc<Mutex<BackendIdMap>>,
}

impl HttpPersistenceGateway {
    pub fn new_with_base_url(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            products_path: "/products".to_string(),
            movements_path: "/movements".to_string(),
            ids: Arc::default(),
        }
    }

    /// Client with a request timeout and custom collection paths.
    pub fn from_parts(
        base_url: String,
        products_path: String,
        movements_path: String,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            products_path,
            movements_path,
            ids: Arc::default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// `{base}{products}/<segment>/...`, each segment percent-encoded.
    fn product_url(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.url(&self.products_path))
            .map_err(|e| GatewayError::Config(format!("products url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Config("products url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Backend id for `record`: learned from a create or a listing, else
    /// the record's own id.
    pub async fn backend_id_for(&self, record: &InventoryRecord) -> String {
        match self.ids.lock().await.backend_id(&record.sku) {
            Some(id) => id.to_string(),
            None => record.id.clone(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, GatewayError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let resp = check_status(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let resp = req
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        check_status(resp).await
    }
}

/// `id` of the saved row in a create answer. Empty or non-JSON bodies yield
/// `None`.
async fn created_id(resp: reqwest::Response) -> Option<String> {
    let body = resp.bytes().await.ok()?;
    let saved: Value = serde_json::from_slice(&body).ok()?;
    id_to_string(saved.get("id"))
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(GatewayError::Status {
        code: status.as_u16(),
        body,
    })
}

#[async_trait]
impl PersistenceGateway for HttpPersistenceGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn list_products(&self) -> Result<Vec<InventoryRecord>, GatewayError> {
        let rows: Vec<ProductRow> = self.get_json(self.url(&self.products_path)).await?;
        let mut ids = self.ids.lock().await;
        for row in &rows {
            if let Some(id) = id_to_string(row.id.as_ref()) {
                ids.register(row.sku.clone(), id);
            }
        }
        Ok(rows.into_iter().map(ProductRow::into_record).collect())
    }

    async fn create_product(&self, record: &InventoryRecord) -> Result<(), GatewayError> {
        let req = self
            .http
            .post(self.url(&self.products_path))
            .json(&NewProduct::from_record(record));
        let resp = self.send(req).await?;
        match created_id(resp).await {
            Some(id) => {
                debug!(sku = %record.sku, backend_id = %id, "backend id learned");
                self.ids.lock().await.register(record.sku.clone(), id);
            }
            None => warn!(
                sku = %record.sku,
                "create answer carried no id; updates will use the local id"
            ),
        }
        Ok(())
    }

    async fn update_product(&self, record: &InventoryRecord) -> Result<(), GatewayError> {
        let id = self.backend_id_for(record).await;
        let req = self
            .http
            .put(self.product_url(&[id.as_str()])?)
            .json(&NewProduct::from_record(record));
        self.send(req).await.map(|_| ())
    }

    async fn delete_product_by_sku(&self, sku: &str) -> Result<(), GatewayError> {
        let url = self.product_url(&["sku", sku])?;
        self.send(self.http.delete(url)).await?;
        self.ids.lock().await.forget(sku);
        Ok(())
    }

    async fn list_movements(&self) -> Result<Vec<MovementRecord>, GatewayError> {
        let rows: Vec<MovementRow> = self.get_json(self.url(&self.movements_path)).await?;
        let total = rows.len();
        let movements: Vec<MovementRecord> = rows
            .into_iter()
            .filter_map(|row| row.into_movement(DEFAULT_OPERATOR))
            .collect();
        if movements.len() != total {
            warn!(
                skipped = total - movements.len(),
                "movement rows with unknown action or date were skipped"
            );
        }
        Ok(movements)
    }

    async fn append_movement(&self, movement: &MovementRecord) -> Result<(), GatewayError> {
        let req = self
            .http
            .post(self.url(&self.movements_path))
            .json(&NewMovement::from_movement(movement));
        self.send(req).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(base: &str) -> HttpPersistenceGateway {
        HttpPersistenceGateway::from_parts(
            base.to_string(),
            "/productos".to_string(),
            "/movimientos".to_string(),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn reserved_characters_in_segments_are_encoded() {
        let gw = gateway("http://db.local:3000/");
        let url = gw.product_url(&["sku", "AB#1"]).unwrap();
        assert_eq!(url.as_str(), "http://db.local:3000/productos/sku/AB%231");
        let url = gw.product_url(&["a/b?c"]).unwrap();
        assert_eq!(url.as_str(), "http://db.local:3000/productos/a%2Fb%3Fc");
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let gw = gateway("http://db.local/api");
        let url = gw.product_url(&["17"]).unwrap();
        assert_eq!(url.as_str(), "http://db.local/api/productos/17");
    }

    #[test]
    fn id_map_registers_and_forgets() {
        let mut ids = BackendIdMap::default();
        ids.register("SKU-1", "77");
        ids.register("SKU-1", "78");
        assert_eq!(ids.backend_id("SKU-1"), Some("78"));
        ids.forget("SKU-1");
        assert!(ids.backend_id("SKU-1").is_none());
        assert!(ids.is_empty());
    }
}
