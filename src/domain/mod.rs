//! Domain types for structured data.
//!
//! This module contains the core data structures:
//! - Identifier: addressing of nodes by field path
//! - Definition: the schema a tree is built against
//! - Node: node instances of a tree
//! - Asset: content objects and reference kinds

pub mod asset;
pub mod definition;
pub mod identifier;
pub mod node;

// Re-export commonly used types
pub use asset::{AssetKind, AssetRecord, AssetRef, ContentType, ReferenceKind};
pub use definition::{DataDefinition, DefinitionError, FieldKind, SchemaField, TextKind};
pub use identifier::{Identifier, IdentifierError, Segment};
pub use node::{Group, Node, NodeKind, Reference, Slot, Target, Text};
