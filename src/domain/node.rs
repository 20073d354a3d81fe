//! Node instances of a structured-data tree.
//!
//! A repeatable field is stored as one [`Slot::Multiple`] holding an ordered
//! list of instances, so sibling indices are always `0..n` by construction.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::asset::{AssetKind, ReferenceKind};
use super::definition::{FieldKind, SchemaField, TextKind};

/// Discriminant of a [`Node`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Group,
    Text,
    Reference,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Group => "group",
            NodeKind::Text => "text",
            NodeKind::Reference => "reference",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&FieldKind> for NodeKind {
    fn from(kind: &FieldKind) -> Self {
        match kind {
            FieldKind::Group => NodeKind::Group,
            FieldKind::Text(_) => NodeKind::Text,
            FieldKind::Reference(_) => NodeKind::Reference,
        }
    }
}

/// One node instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Group(Group),
    Text(Text),
    Reference(Reference),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Group(_) => NodeKind::Group,
            Node::Text(_) => NodeKind::Text,
            Node::Reference(_) => NodeKind::Reference,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Node::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut Group> {
        match self {
            Node::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Node::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut Text> {
        match self {
            Node::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Node::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn as_reference_mut(&mut self) -> Option<&mut Reference> {
        match self {
            Node::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    /// Fresh instance of a schema field.
    ///
    /// Groups get one instance of each child field; text starts at the
    /// field's default value.
    pub fn blank(field: &SchemaField) -> Self {
        match field.kind {
            FieldKind::Group => Node::Group(Group::blank(&field.fields)),
            FieldKind::Text(kind) => Node::Text(Text {
                kind,
                value: field.default.clone(),
            }),
            FieldKind::Reference(kind) => Node::Reference(Reference::empty(kind)),
        }
    }
}

/// All instances of one field inside a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Non-repeatable field
    Single(Node),
    /// Repeatable field, never empty
    Multiple(Vec<Node>),
}

impl Slot {
    pub fn is_multiple(&self) -> bool {
        matches!(self, Slot::Multiple(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Slot::Single(_) => 1,
            Slot::Multiple(nodes) => nodes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn instances(&self) -> std::slice::Iter<'_, Node> {
        match self {
            Slot::Single(node) => std::slice::from_ref(node).iter(),
            Slot::Multiple(nodes) => nodes.iter(),
        }
    }

    pub fn instances_mut(&mut self) -> std::slice::IterMut<'_, Node> {
        match self {
            Slot::Single(node) => std::slice::from_mut(node).iter_mut(),
            Slot::Multiple(nodes) => nodes.iter_mut(),
        }
    }

    /// Instances in order, consuming the slot
    pub fn into_instances(self) -> Vec<Node> {
        match self {
            Slot::Single(node) => vec![node],
            Slot::Multiple(nodes) => nodes,
        }
    }

    fn blank(field: &SchemaField) -> Self {
        let node = Node::blank(field);
        if field.repeatable {
            Slot::Multiple(vec![node])
        } else {
            Slot::Single(node)
        }
    }
}

/// Container node: field name to instances, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub children: IndexMap<String, Slot>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// One blank instance of every field
    pub fn blank(fields: &[SchemaField]) -> Self {
        Self {
            children: fields
                .iter()
                .map(|field| (field.name.clone(), Slot::blank(field)))
                .collect(),
        }
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.children.get(name)
    }

    pub fn slot_mut(&mut self, name: &str) -> Option<&mut Slot> {
        self.children.get_mut(name)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Text node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    pub kind: TextKind,
    pub value: Option<String>,
}

impl Text {
    pub fn new(kind: TextKind, value: Option<String>) -> Self {
        Self { kind, value }
    }

    pub fn value(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }

    /// Selected items of a checkbox/multi-selector (or the single value)
    pub fn items(&self) -> Vec<&str> {
        self.kind.split_items(self.value())
    }
}

/// Chosen asset of a reference node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub kind: AssetKind,
    pub id: Option<String>,
    pub path: Option<String>,
}

impl Target {
    pub fn by_id(kind: AssetKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: Some(id.into()),
            path: None,
        }
    }

    pub fn by_path(kind: AssetKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            id: None,
            path: Some(path.into()),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Drop empty strings; `None` when nothing identifies the asset
    pub fn normalized(self) -> Option<Self> {
        let id = self.id.filter(|s| !s.is_empty());
        let path = self.path.filter(|s| !s.is_empty());
        if id.is_none() && path.is_none() {
            None
        } else {
            Some(Self {
                kind: self.kind,
                id,
                path,
            })
        }
    }
}

/// Asset-chooser node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Chooser kind the field declares
    pub kind: ReferenceKind,
    pub target: Option<Target>,
}

impl Reference {
    pub fn empty(kind: ReferenceKind) -> Self {
        Self { kind, target: None }
    }

    pub fn target_id(&self) -> Option<&str> {
        self.target.as_ref().and_then(|t| t.id.as_deref())
    }

    pub fn target_path(&self) -> Option<&str> {
        self.target.as_ref().and_then(|t| t.path.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_group_uses_defaults() {
        let field = SchemaField::group(
            "g",
            vec![
                SchemaField::text("title", TextKind::Plain).with_default("Untitled"),
                SchemaField::text("items", TextKind::Plain).multiple(),
                SchemaField::reference("link", ReferenceKind::Page),
            ],
        );
        let node = Node::blank(&field);
        let group = node.as_group().unwrap();

        match group.slot("title").unwrap() {
            Slot::Single(Node::Text(text)) => assert_eq!(text.value(), "Untitled"),
            other => panic!("unexpected slot {:?}", other),
        }
        assert!(group.slot("items").unwrap().is_multiple());
        assert_eq!(group.slot("items").unwrap().len(), 1);
        assert_eq!(
            group.slot("link").unwrap().instances().next().unwrap().kind(),
            NodeKind::Reference
        );
    }

    #[test]
    fn test_target_normalized() {
        let target = Target {
            kind: AssetKind::Page,
            id: Some(String::new()),
            path: Some("/about".into()),
        };
        let normalized = target.normalized().unwrap();
        assert_eq!(normalized.id, None);
        assert_eq!(normalized.path.as_deref(), Some("/about"));

        let empty = Target {
            kind: AssetKind::File,
            id: None,
            path: Some(String::new()),
        };
        assert!(empty.normalized().is_none());
    }

    #[test]
    fn test_text_items() {
        let text = Text::new(
            TextKind::MultiSelector,
            Some("::CONTENT-XML-SELECTOR::x::CONTENT-XML-SELECTOR::y".into()),
        );
        assert_eq!(text.items(), vec!["x", "y"]);
        assert!(Text::new(TextKind::Plain, None).items().is_empty());
    }
}
