//! In-process content service.
//!
//! Holds asset records and definitions in memory and speaks whichever wire
//! shape it is configured with. Used by tests and offline tooling; it can be
//! told to reject the next edit to exercise commit-failure handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    AssetResolver, DefinitionRegistry, DefinitionSource, EditOutcome, Transport, TransportError,
};
use crate::domain::{AssetKind, AssetRecord, AssetRef, DataDefinition};
use crate::wire::WireShape;

/// Records are keyed by the type name used on the wire (`page`, `block`, `file`, ...)
type RecordKey = (String, String);

/// Memory-backed content service
#[derive(Debug, Default)]
pub struct MemoryService {
    shape: WireShape,
    records: Mutex<HashMap<RecordKey, AssetRecord>>,
    definitions: Mutex<DefinitionRegistry>,
    fail_next_edit: AtomicBool,
    edits: Mutex<Vec<AssetRecord>>,
}

impl MemoryService {
    pub fn new(shape: WireShape) -> Self {
        Self {
            shape,
            ..Default::default()
        }
    }

    /// Store a content object
    pub fn with_record(mut self, asset: &AssetRef, record: AssetRecord) -> Self {
        self.records
            .get_mut()
            .insert((asset.kind.as_str().to_string(), asset.id.clone()), record);
        self
    }

    /// Store an asset that references can resolve to
    pub fn with_asset(mut self, kind: AssetKind, id: &str, record: AssetRecord) -> Self {
        self.records
            .get_mut()
            .insert((kind.as_str().to_string(), id.to_string()), record);
        self
    }

    pub fn with_definition(mut self, definition: DataDefinition) -> Self {
        self.definitions.get_mut().insert(definition);
        self
    }

    /// Reject the next edit with `success: false`
    pub fn fail_next_edit(&self) {
        self.fail_next_edit.store(true, Ordering::SeqCst);
    }

    /// Current stored state of a content object
    pub async fn record(&self, asset: &AssetRef) -> Option<AssetRecord> {
        self.records
            .lock()
            .await
            .get(&(asset.kind.as_str().to_string(), asset.id.clone()))
            .cloned()
    }

    /// Every record submitted through `edit`, accepted or not
    pub async fn edits(&self) -> Vec<AssetRecord> {
        self.edits.lock().await.clone()
    }

    /// Register or replace a definition (simulates schema evolution)
    pub async fn put_definition(&self, definition: DataDefinition) {
        self.definitions.lock().await.insert(definition);
    }
}

#[async_trait]
impl Transport for MemoryService {
    fn name(&self) -> &str {
        "memory"
    }

    fn shape(&self) -> WireShape {
        self.shape
    }

    async fn read(&self, asset: &AssetRef) -> Result<AssetRecord, TransportError> {
        self.record(asset)
            .await
            .ok_or_else(|| TransportError::NotFound(asset.to_string()))
    }

    async fn edit(
        &self,
        asset: &AssetRef,
        record: &AssetRecord,
    ) -> Result<EditOutcome, TransportError> {
        self.edits.lock().await.push(record.clone());

        if self.fail_next_edit.swap(false, Ordering::SeqCst) {
            debug!(asset = %asset, "Rejecting edit");
            return Ok(EditOutcome::rejected("edit rejected by service"));
        }

        let mut records = self.records.lock().await;
        let key = (asset.kind.as_str().to_string(), asset.id.clone());
        if !records.contains_key(&key) {
            return Err(TransportError::NotFound(asset.to_string()));
        }
        records.insert(key, record.clone());
        Ok(EditOutcome::ok())
    }
}

#[async_trait]
impl DefinitionSource for MemoryService {
    async fn definition(&self, key: &str) -> Result<Arc<DataDefinition>, TransportError> {
        self.definitions
            .lock()
            .await
            .get(key)
            .ok_or_else(|| TransportError::NotFound(format!("definition {}", key)))
    }
}

#[async_trait]
impl AssetResolver for MemoryService {
    async fn resolve(&self, kind: AssetKind, id: &str) -> Result<AssetRecord, TransportError> {
        self.records
            .lock()
            .await
            .get(&(kind.as_str().to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("{}:{}", kind.as_str(), id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn record(id: &str) -> AssetRecord {
        AssetRecord::new("page", Map::new()).with_property("id", json!(id))
    }

    #[tokio::test]
    async fn test_read_and_edit() {
        let asset = AssetRef::page("p1");
        let service = MemoryService::new(WireShape::ArrayOnly).with_record(&asset, record("p1"));

        let read = service.read(&asset).await.unwrap();
        assert_eq!(read.id(), Some("p1"));

        let edited = read.with_property("name", json!("index"));
        assert!(service.edit(&asset, &edited).await.unwrap().success);
        assert_eq!(service.record(&asset).await.unwrap().name(), Some("index"));
    }

    #[tokio::test]
    async fn test_fail_next_edit_is_one_shot() {
        let asset = AssetRef::page("p1");
        let service = MemoryService::new(WireShape::ArrayOnly).with_record(&asset, record("p1"));
        service.fail_next_edit();

        let edited = record("p1").with_property("name", json!("changed"));
        let outcome = service.edit(&asset, &edited).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(service.record(&asset).await.unwrap().name(), None);

        assert!(service.edit(&asset, &edited).await.unwrap().success);
        assert_eq!(service.edits().await.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_unknown_asset() {
        let service = MemoryService::new(WireShape::ObjectOrArray);
        let err = service.resolve(AssetKind::File, "f1").await.unwrap_err();
        assert!(matches!(err, TransportError::NotFound(_)));
    }
}
