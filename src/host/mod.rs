//! Host binding: a tree bound to the content object that owns it.
//!
//! [`Client::open`] reads a page or block, looks up the definition its
//! structured data was built against and decodes it into a [`ContentHandle`].
//! The caller edits the handle's tree and hands it back to
//! [`Client::commit`], which encodes the whole tree in the transport's shape
//! and replaces the content object in one edit call.
//!
//! A rejected commit leaves the handle exactly as the caller left it so the
//! edit can be inspected, retried or discarded.

use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::adapters::{AssetResolver, DefinitionSource, Transport};
use crate::core::{self, Tree, TreeError};
use crate::domain::asset::{STRUCTURED_DATA, XHTML};
use crate::domain::{AssetRecord, AssetRef, Identifier, Reference};
use crate::error::{Error, Result};
use crate::wire::{self, WireShape};

/// What a content object holds
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Structured data decoded against a definition
    Structured(Tree),
    /// Plain xhtml; no tree to edit
    Xhtml(String),
}

/// Identifiers touched by a reconcile pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub phantom_nodes: Vec<Identifier>,
    pub phantom_values: Vec<Identifier>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.phantom_nodes.is_empty() && self.phantom_values.is_empty()
    }
}

/// A content object and its decoded content
#[derive(Debug, Clone)]
pub struct ContentHandle {
    asset: AssetRef,
    record: AssetRecord,
    content: Content,
    fingerprint: String,
}

impl ContentHandle {
    fn new(asset: AssetRef, record: AssetRecord, content: Content) -> Self {
        let fingerprint = fingerprint(&content);
        Self {
            asset,
            record,
            content,
            fingerprint,
        }
    }

    pub fn asset(&self) -> &AssetRef {
        &self.asset
    }

    /// Record as last read from the service
    pub fn record(&self) -> &AssetRecord {
        &self.record
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn tree(&self) -> std::result::Result<&Tree, TreeError> {
        match &self.content {
            Content::Structured(tree) => Ok(tree),
            Content::Xhtml(_) => Err(TreeError::NotWritable),
        }
    }

    pub fn tree_mut(&mut self) -> std::result::Result<&mut Tree, TreeError> {
        match &mut self.content {
            Content::Structured(tree) => Ok(tree),
            Content::Xhtml(_) => Err(TreeError::NotWritable),
        }
    }

    pub fn xhtml(&self) -> Option<&str> {
        match &self.content {
            Content::Xhtml(xhtml) => Some(xhtml),
            Content::Structured(_) => None,
        }
    }

    /// Set a text node of the bound tree
    pub fn set_text(
        &mut self,
        identifier: &Identifier,
        value: impl Into<String>,
    ) -> std::result::Result<(), TreeError> {
        self.tree_mut()?.set_text(identifier, value)
    }

    /// Whether the content changed since it was read
    pub fn is_dirty(&self) -> bool {
        fingerprint(&self.content) != self.fingerprint
    }

    /// Record to send on commit
    fn outgoing(&self, shape: WireShape) -> AssetRecord {
        match &self.content {
            Content::Structured(tree) => self
                .record
                .with_property(STRUCTURED_DATA, wire::encode(tree, shape)),
            Content::Xhtml(xhtml) => self
                .record
                .with_property(XHTML, Value::from(xhtml.as_str())),
        }
    }
}

fn fingerprint(content: &Content) -> String {
    let mut hasher = Sha256::new();
    match content {
        Content::Structured(tree) => {
            hasher.update(wire::encode(tree, WireShape::ArrayOnly).to_string().as_bytes())
        }
        Content::Xhtml(xhtml) => hasher.update(xhtml.as_bytes()),
    }
    hex::encode(hasher.finalize())
}

/// Definition key a structured-data payload names
fn definition_key(payload: &Value) -> Option<&str> {
    ["definitionId", "definitionPath"]
        .into_iter()
        .filter_map(|key| payload.get(key).and_then(Value::as_str))
        .find(|key| !key.is_empty())
}

/// Entry point for reading, editing and committing content objects
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    definitions: Arc<dyn DefinitionSource>,
    resolver: Option<Arc<dyn AssetResolver>>,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>, definitions: Arc<dyn DefinitionSource>) -> Self {
        Self {
            transport,
            definitions,
            resolver: None,
        }
    }

    /// Enable [`Client::resolve`]
    pub fn with_resolver(mut self, resolver: Arc<dyn AssetResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Read a content object and decode its structured data
    #[instrument(skip(self), fields(asset = %asset, transport = self.transport.name()))]
    pub async fn open(&self, asset: &AssetRef) -> Result<ContentHandle> {
        let record = self.transport.read(asset).await?;
        let handle = self.bind(asset.clone(), record).await?;
        info!(structured = handle.tree().is_ok(), "Opened content");
        Ok(handle)
    }

    async fn bind(&self, asset: AssetRef, record: AssetRecord) -> Result<ContentHandle> {
        let content = match record.structured_data() {
            Some(payload) => {
                let key = definition_key(payload)
                    .ok_or_else(|| Error::MissingDefinition(asset.clone()))?;
                let definition = self.definitions.definition(key).await?;
                Content::Structured(wire::decode(payload, &definition)?)
            }
            None => Content::Xhtml(record.xhtml().unwrap_or_default().to_string()),
        };
        Ok(ContentHandle::new(asset, record, content))
    }

    /// Send the handle's content to the service.
    ///
    /// On success the handle is rebuilt from a fresh read. On rejection the
    /// handle is left untouched and [`Error::CommitFailure`] is returned.
    #[instrument(skip(self, handle), fields(asset = %handle.asset, shape = ?self.transport.shape()))]
    pub async fn commit(&self, handle: &mut ContentHandle) -> Result<()> {
        let record = handle.outgoing(self.transport.shape());
        let outcome = self.transport.edit(&handle.asset, &record).await?;

        if !outcome.success {
            let message = outcome
                .message
                .unwrap_or_else(|| "service gave no reason".to_string());
            warn!(%message, "Commit rejected");
            return Err(Error::CommitFailure {
                asset: handle.asset.clone(),
                message,
            });
        }

        let fresh = self.transport.read(&handle.asset).await?;
        *handle = self.bind(handle.asset.clone(), fresh).await?;
        info!("Committed content");
        Ok(())
    }

    /// Bring the handle's tree in line with the current definition.
    ///
    /// Phantom nodes are pruned first, then phantom values are cleared from
    /// what remains. The handle is marked dirty if anything changed.
    #[instrument(skip(self, handle), fields(asset = %handle.asset))]
    pub async fn reconcile(&self, handle: &mut ContentHandle) -> Result<ReconcileReport> {
        let tree = handle.tree()?;
        let key = tree
            .definition()
            .key()
            .ok_or_else(|| Error::MissingDefinition(handle.asset.clone()))?;
        let definition = self.definitions.definition(key).await?;

        let phantom_nodes = core::find_phantom_nodes(tree, &definition);
        let pruned = core::prune_phantom_nodes(tree, &definition);
        let phantom_values = core::find_phantom_values(&pruned, &definition);
        let cleared = core::clear_phantom_values(&pruned, &definition);

        *handle.tree_mut()? = cleared;
        info!(
            nodes = phantom_nodes.len(),
            values = phantom_values.len(),
            "Reconciled content"
        );
        Ok(ReconcileReport {
            phantom_nodes,
            phantom_values,
        })
    }

    /// Fetch the asset a reference points at; `None` when nothing is chosen
    #[instrument(skip(self, reference))]
    pub async fn resolve(&self, reference: &Reference) -> Result<Option<AssetRecord>> {
        let Some(target) = &reference.target else {
            return Ok(None);
        };
        let Some(key) = target.id.as_deref().or(target.path.as_deref()) else {
            return Ok(None);
        };
        let resolver = self.resolver.as_ref().ok_or(Error::NoResolver)?;
        Ok(Some(resolver.resolve(target.kind, key).await?))
    }
}
