//! Core tree logic.
//!
//! This module contains:
//! - Tree: identifier-addressed reads and writes
//! - Multiplicity: sibling instances of repeatable fields
//! - Reconcile: phantom node/value detection and pruning
//! - Search: literal and pattern search/replace over text nodes

pub mod multiplicity;
pub mod reconcile;
pub mod search;
pub mod tree;

// Re-export commonly used types
pub use reconcile::{
    clear_phantom_values, find_phantom_nodes, find_phantom_values, prune_phantom_nodes, reconcile,
};
pub use search::{replace_literal, replace_pattern, search_literal, search_pattern, Scope};
pub use tree::{Tree, TreeError};
