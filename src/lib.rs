//! sdtree - Structured data trees for content objects
//!
//! Pages and blocks on the content service carry structured data: a tree of
//! group, text and asset-chooser nodes shaped by a data definition. This
//! crate decodes that data into an in-memory [`Tree`], edits it, keeps it in
//! line with an evolving definition, and writes it back.
//!
//! # Modules
//!
//! - `domain`: Identifiers, definitions, node and asset types
//! - `core`: The tree, multiplicity, reconciliation, search/replace
//! - `wire`: JSON codec for both node-list shapes
//! - `adapters`: Service transports and definition sources
//! - `host`: Binding a tree to the content object that owns it
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # List node identifiers of a payload
//! sdtree ids data.json -d news.yaml
//!
//! # Drop nodes and values the current definition no longer allows
//! sdtree prune data.json -d news.yaml --values -o clean.json
//!
//! # Reconcile a block on the service
//! sdtree reconcile block:abc123 --commit
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod host;
pub mod wire;

// Re-export main types at crate root for convenience
pub use adapters::{
    AssetResolver, DefinitionRegistry, DefinitionSource, EditOutcome, MemoryService,
    RestTransport, Transport, TransportError,
};
pub use core::{Scope, Tree, TreeError};
pub use domain::{
    AssetKind, AssetRecord, AssetRef, ContentType, DataDefinition, FieldKind, Identifier,
    IdentifierError, Node, NodeKind, Reference, ReferenceKind, SchemaField, Slot, Target, Text,
    TextKind,
};
pub use error::{Error, Result};
pub use host::{Client, Content, ContentHandle, ReconcileReport};
pub use wire::{decode, encode, DecodeError, WireShape};
