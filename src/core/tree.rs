//! The structured-data instance tree.
//!
//! A [`Tree`] is the mutable runtime form of a content object's structured
//! data. Every node is addressed by its [`Identifier`]; the tree holds the
//! definition it was decoded against so that writes can be checked and new
//! instances synthesized.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use thiserror::Error;

use crate::domain::{
    AssetKind, DataDefinition, Group, Identifier, IdentifierError, Node, NodeKind, Reference,
    ReferenceKind, SchemaField, Segment, Slot, Target, Text, TextKind,
};

/// Storage format of calendar fields
pub const CALENDAR_FORMAT: &str = "%m-%d-%Y";

/// Errors from addressing or mutating a tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error("Node not found: {0}")]
    NodeNotFound(Identifier),

    #[error("Node {identifier} is a {found} node, expected {expected}")]
    WrongNodeKind {
        identifier: Identifier,
        expected: NodeKind,
        found: NodeKind,
    },

    #[error("Text node {identifier} is {found:?}, expected {expected}")]
    WrongTextKind {
        identifier: Identifier,
        expected: &'static str,
        found: TextKind,
    },

    #[error("Chooser {identifier} accepts {declared}, cannot hold a {given}")]
    ReferenceKindMismatch {
        identifier: Identifier,
        declared: ReferenceKind,
        given: AssetKind,
    },

    #[error("Value '{value}' is not a legal value of {identifier}")]
    IllegalValue { identifier: Identifier, value: String },

    #[error("Content has no structured data to write to")]
    NotWritable,

    #[error("Field of {0} is not repeatable")]
    NotMultiple(Identifier),

    #[error("Cannot remove the only instance of {0}")]
    CannotRemoveSoleInstance(Identifier),

    #[error("Invalid instance count {count} for {identifier}")]
    InvalidCount { identifier: Identifier, count: usize },

    #[error("Cannot swap {a} with {b}: nodes are not structurally compatible")]
    KindMismatch { a: Identifier, b: Identifier },

    #[error("No field definition for {0}")]
    UnknownField(Identifier),

    #[error("Invalid date value '{value}' at {identifier}")]
    InvalidDate { identifier: Identifier, value: String },
}

/// Structured data of one content object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    definition: Arc<DataDefinition>,
    root: Group,
}

impl Tree {
    pub fn new(definition: Arc<DataDefinition>, root: Group) -> Self {
        Self { definition, root }
    }

    /// Fresh tree with one instance of every field
    pub fn blank(definition: Arc<DataDefinition>) -> Self {
        let root = Group::blank(definition.fields());
        Self { definition, root }
    }

    /// Definition the tree was built against
    pub fn definition(&self) -> &Arc<DataDefinition> {
        &self.definition
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    #[cfg(test)]
    pub(crate) fn root_mut(&mut self) -> &mut Group {
        &mut self.root
    }

    pub fn into_parts(self) -> (Arc<DataDefinition>, Group) {
        (self.definition, self.root)
    }

    /// Schema field owning an identifier, if the definition has one
    pub fn field(&self, identifier: &Identifier) -> Option<&SchemaField> {
        self.definition.field_for(identifier)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn get(&self, identifier: &Identifier) -> Result<&Node, TreeError> {
        resolve(&self.root, identifier.segments())
            .ok_or_else(|| TreeError::NodeNotFound(identifier.clone()))
    }

    pub fn get_mut(&mut self, identifier: &Identifier) -> Result<&mut Node, TreeError> {
        resolve_mut(&mut self.root, identifier.segments())
            .ok_or_else(|| TreeError::NodeNotFound(identifier.clone()))
    }

    pub fn has_node(&self, identifier: &Identifier) -> bool {
        self.get(identifier).is_ok()
    }

    pub fn node_kind(&self, identifier: &Identifier) -> Result<NodeKind, TreeError> {
        Ok(self.get(identifier)?.kind())
    }

    pub fn is_group(&self, identifier: &Identifier) -> bool {
        matches!(self.node_kind(identifier), Ok(NodeKind::Group))
    }

    pub fn is_text(&self, identifier: &Identifier) -> bool {
        matches!(self.node_kind(identifier), Ok(NodeKind::Text))
    }

    pub fn is_reference(&self, identifier: &Identifier) -> bool {
        matches!(self.node_kind(identifier), Ok(NodeKind::Reference))
    }

    /// True iff the field owning `identifier` is repeatable.
    ///
    /// Answered from the definition; only phantom nodes fall back to the
    /// shape of the tree's own slot.
    pub fn is_multiple(&self, identifier: &Identifier) -> Result<bool, TreeError> {
        let parent = self.group_at(identifier.parent().as_ref())?;
        match (self.field(identifier), parent.slot(identifier.last().name())) {
            (Some(field), _) => Ok(field.repeatable),
            (None, Some(slot)) => Ok(slot.is_multiple()),
            (None, None) => Err(TreeError::NodeNotFound(identifier.clone())),
        }
    }

    /// Group containing the children of `parent` (the root for `None`)
    pub(crate) fn group_at(&self, parent: Option<&Identifier>) -> Result<&Group, TreeError> {
        match parent {
            None => Ok(&self.root),
            Some(id) => {
                let node = self.get(id)?;
                node.as_group().ok_or_else(|| wrong_kind(id, NodeKind::Group, node.kind()))
            }
        }
    }

    pub(crate) fn group_at_mut(
        &mut self,
        parent: Option<&Identifier>,
    ) -> Result<&mut Group, TreeError> {
        match parent {
            None => Ok(&mut self.root),
            Some(id) => {
                let node = self.get_mut(id)?;
                let kind = node.kind();
                node.as_group_mut()
                    .ok_or_else(|| wrong_kind(id, NodeKind::Group, kind))
            }
        }
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Every node currently present, phantoms included, pre-order
    pub fn nodes(&self) -> Vec<(Identifier, &Node)> {
        let mut out = Vec::new();
        walk(&self.root, None, &mut out);
        out
    }

    /// Identifiers of every node currently present, pre-order
    pub fn identifiers(&self) -> Vec<Identifier> {
        self.nodes().into_iter().map(|(id, _)| id).collect()
    }

    /// Every text node, pre-order
    pub fn texts(&self) -> Vec<(Identifier, &Text)> {
        self.nodes()
            .into_iter()
            .filter_map(|(id, node)| node.as_text().map(|text| (id, text)))
            .collect()
    }

    /// Every reference node, pre-order
    pub fn references(&self) -> Vec<(Identifier, &Reference)> {
        self.nodes()
            .into_iter()
            .filter_map(|(id, node)| node.as_reference().map(|reference| (id, reference)))
            .collect()
    }

    // ========================================================================
    // Text
    // ========================================================================

    pub fn text(&self, identifier: &Identifier) -> Result<&Text, TreeError> {
        let node = self.get(identifier)?;
        node.as_text()
            .ok_or_else(|| wrong_kind(identifier, NodeKind::Text, node.kind()))
    }

    fn text_mut(&mut self, identifier: &Identifier) -> Result<&mut Text, TreeError> {
        let node = self.get_mut(identifier)?;
        let kind = node.kind();
        node.as_text_mut()
            .ok_or_else(|| wrong_kind(identifier, NodeKind::Text, kind))
    }

    /// Current value of a text node (`""` when unset)
    pub fn text_value(&self, identifier: &Identifier) -> Result<&str, TreeError> {
        Ok(self.text(identifier)?.value())
    }

    /// Set a text node's value.
    ///
    /// Enumerated fields only take values from their legal set.
    pub fn set_text(
        &mut self,
        identifier: &Identifier,
        value: impl Into<String>,
    ) -> Result<(), TreeError> {
        let value = value.into();
        self.text(identifier)?;

        if let Some(field) = self.field(identifier) {
            if !field.allows_value(&value) {
                return Err(TreeError::IllegalValue {
                    identifier: identifier.clone(),
                    value,
                });
            }
        }

        self.text_mut(identifier)?.value = Some(value);
        Ok(())
    }

    /// Reset a text node to no value
    pub fn clear_text(&mut self, identifier: &Identifier) -> Result<(), TreeError> {
        self.text_mut(identifier)?.value = None;
        Ok(())
    }

    /// Select items of a checkbox or multi-selector
    pub fn set_choices<S: AsRef<str>>(
        &mut self,
        identifier: &Identifier,
        items: &[S],
    ) -> Result<(), TreeError> {
        let kind = self.text(identifier)?.kind;
        if items.len() > 1 && !kind.is_multi_valued() {
            return Err(TreeError::WrongTextKind {
                identifier: identifier.clone(),
                expected: "checkbox or multi-selector",
                found: kind,
            });
        }
        self.set_text(identifier, kind.join_items(items))
    }

    /// Date held by a calendar field
    pub fn date(&self, identifier: &Identifier) -> Result<Option<NaiveDate>, TreeError> {
        let text = self.text_of_kind(identifier, TextKind::Calendar, "calendar")?;
        if text.value().is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(text.value(), CALENDAR_FORMAT)
            .map(Some)
            .map_err(|_| invalid_date(identifier, text.value()))
    }

    pub fn set_date(&mut self, identifier: &Identifier, date: NaiveDate) -> Result<(), TreeError> {
        self.text_of_kind(identifier, TextKind::Calendar, "calendar")?;
        self.set_text(identifier, date.format(CALENDAR_FORMAT).to_string())
    }

    /// Instant held by a datetime field
    pub fn datetime(&self, identifier: &Identifier) -> Result<Option<DateTime<Utc>>, TreeError> {
        let text = self.text_of_kind(identifier, TextKind::Datetime, "datetime")?;
        if text.value().is_empty() {
            return Ok(None);
        }
        text.value()
            .parse::<i64>()
            .ok()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .map(Some)
            .ok_or_else(|| invalid_date(identifier, text.value()))
    }

    pub fn set_datetime(
        &mut self,
        identifier: &Identifier,
        instant: DateTime<Utc>,
    ) -> Result<(), TreeError> {
        self.text_of_kind(identifier, TextKind::Datetime, "datetime")?;
        self.set_text(identifier, instant.timestamp_millis().to_string())
    }

    fn text_of_kind(
        &self,
        identifier: &Identifier,
        kind: TextKind,
        expected: &'static str,
    ) -> Result<&Text, TreeError> {
        let text = self.text(identifier)?;
        if text.kind != kind {
            return Err(TreeError::WrongTextKind {
                identifier: identifier.clone(),
                expected,
                found: text.kind,
            });
        }
        Ok(text)
    }

    // ========================================================================
    // References
    // ========================================================================

    pub fn reference(&self, identifier: &Identifier) -> Result<&Reference, TreeError> {
        let node = self.get(identifier)?;
        node.as_reference()
            .ok_or_else(|| wrong_kind(identifier, NodeKind::Reference, node.kind()))
    }

    /// Point a chooser at an asset.
    ///
    /// The asset kind must be one the chooser accepts; linkable choosers take
    /// pages, files, and symlinks interchangeably.
    pub fn set_reference(
        &mut self,
        identifier: &Identifier,
        target: Target,
    ) -> Result<(), TreeError> {
        let node = self.get_mut(identifier)?;
        let found = node.kind();
        let reference = node
            .as_reference_mut()
            .ok_or_else(|| wrong_kind(identifier, NodeKind::Reference, found))?;

        if !reference.kind.accepts(target.kind) {
            return Err(TreeError::ReferenceKindMismatch {
                identifier: identifier.clone(),
                declared: reference.kind,
                given: target.kind,
            });
        }

        reference.target = target.normalized();
        Ok(())
    }

    pub fn clear_reference(&mut self, identifier: &Identifier) -> Result<(), TreeError> {
        let node = self.get_mut(identifier)?;
        let found = node.kind();
        node.as_reference_mut()
            .ok_or_else(|| wrong_kind(identifier, NodeKind::Reference, found))?
            .target = None;
        Ok(())
    }
}

pub(crate) fn wrong_kind(identifier: &Identifier, expected: NodeKind, found: NodeKind) -> TreeError {
    TreeError::WrongNodeKind {
        identifier: identifier.clone(),
        expected,
        found,
    }
}

fn invalid_date(identifier: &Identifier, value: &str) -> TreeError {
    TreeError::InvalidDate {
        identifier: identifier.clone(),
        value: value.to_string(),
    }
}

/// Instance a single segment selects within a group
fn select<'a>(group: &'a Group, segment: &Segment) -> Option<&'a Node> {
    match (group.slot(segment.name())?, segment.index()) {
        (Slot::Single(node), None) => Some(node),
        (Slot::Multiple(nodes), Some(index)) => nodes.get(index),
        _ => None,
    }
}

fn resolve<'a>(group: &'a Group, segments: &[Segment]) -> Option<&'a Node> {
    let (first, rest) = segments.split_first()?;
    let node = select(group, first)?;
    if rest.is_empty() {
        Some(node)
    } else {
        resolve(node.as_group()?, rest)
    }
}

fn resolve_mut<'a>(group: &'a mut Group, segments: &[Segment]) -> Option<&'a mut Node> {
    let (first, rest) = segments.split_first()?;
    let node = match (group.slot_mut(first.name())?, first.index()) {
        (Slot::Single(node), None) => node,
        (Slot::Multiple(nodes), Some(index)) => nodes.get_mut(index)?,
        _ => return None,
    };
    if rest.is_empty() {
        Some(node)
    } else {
        resolve_mut(node.as_group_mut()?, rest)
    }
}

/// Identifier of a child under `parent` (top level for `None`)
pub(crate) fn child_identifier(parent: Option<&Identifier>, segment: Segment) -> Identifier {
    match parent {
        Some(parent) => parent.child(segment),
        None => Identifier::root(segment),
    }
}

/// Segments addressing each instance of a slot
pub(crate) fn slot_segments(name: &str, slot: &Slot) -> Vec<Segment> {
    match slot {
        Slot::Single(_) => vec![Segment::unchecked(name, None)],
        Slot::Multiple(nodes) => (0..nodes.len())
            .map(|index| Segment::unchecked(name, Some(index)))
            .collect(),
    }
}

fn walk<'a>(group: &'a Group, parent: Option<&Identifier>, out: &mut Vec<(Identifier, &'a Node)>) {
    for (name, slot) in &group.children {
        for (segment, node) in slot_segments(name, slot).into_iter().zip(slot.instances()) {
            let id = child_identifier(parent, segment);
            out.push((id.clone(), node));
            if let Node::Group(child) = node {
                walk(child, Some(&id), out);
            }
        }
    }
}
