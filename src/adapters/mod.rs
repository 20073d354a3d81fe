//! Adapter interfaces for the content service.
//!
//! The tree core never talks to the service itself. A [`Transport`] reads and
//! edits content objects, a [`DefinitionSource`] supplies data definitions and
//! an [`AssetResolver`] dereferences chosen assets. Each transport declares
//! the [`WireShape`] it speaks so the host binding can encode accordingly.

pub mod memory;
pub mod registry;
pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{AssetKind, AssetRecord, AssetRef, DataDefinition, DefinitionError};
use crate::wire::WireShape;

pub use memory::MemoryService;
pub use registry::DefinitionRegistry;
pub use rest::RestTransport;

/// Errors raised while talking to the content service
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Service error: {message}")]
    Service { message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed service response: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// Result of an edit call
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EditOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl EditOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Reads and edits content objects
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name
    fn name(&self) -> &str;

    /// Node-list shape this transport expects on edit
    fn shape(&self) -> WireShape;

    /// Fetch the current state of a content object
    async fn read(&self, asset: &AssetRef) -> Result<AssetRecord, TransportError>;

    /// Replace a content object with `record`
    async fn edit(&self, asset: &AssetRef, record: &AssetRecord)
        -> Result<EditOutcome, TransportError>;
}

/// Supplies data definitions by id or path
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    async fn definition(&self, key: &str) -> Result<Arc<DataDefinition>, TransportError>;
}

/// Dereferences an asset chosen by a reference node
#[async_trait]
pub trait AssetResolver: Send + Sync {
    async fn resolve(&self, kind: AssetKind, id: &str) -> Result<AssetRecord, TransportError>;
}
