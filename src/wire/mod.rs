//! Wire codec for structured data.
//!
//! The service speaks two JSON shapes for the same data, one per transport:
//!
//! - **array-only**: every node list is a JSON array
//!   (`"structuredDataNodes": [ {...}, {...} ]`).
//! - **object-or-array**: node lists are wrapped in a `structuredDataNode`
//!   property that holds a bare object when the list has exactly one entry
//!   and an array otherwise (`"structuredDataNodes": {"structuredDataNode": {...}}`).
//!   An empty list is omitted.
//!
//! [`decode`] accepts either shape (even mixed within one payload) and
//! produces the same [`Tree`]; [`encode`] produces whichever shape the
//! caller's transport needs. The tree itself never knows which shape it
//! came from.
//!
//! Node objects:
//!
//! ```json
//! {"type": "text",  "identifier": "title", "text": "Hello"}
//! {"type": "group", "identifier": "items", "structuredDataNodes": [...]}
//! {"type": "asset", "identifier": "link",  "assetType": "page", "pageId": "...", "pagePath": "..."}
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::core::Tree;
use crate::domain::identifier::validate_name;
use crate::domain::{
    AssetKind, DataDefinition, FieldKind, Group, IdentifierError, Node, Reference, ReferenceKind,
    SchemaField, Slot, Target, Text, TextKind,
};

/// Property holding a node list
pub const NODES: &str = "structuredDataNodes";

/// Wrapper property inside an object-or-array node list
pub const NODE: &str = "structuredDataNode";

const DEFINITION_ID: &str = "definitionId";
const DEFINITION_PATH: &str = "definitionPath";

/// Which JSON shape node lists are written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireShape {
    /// Single-entry lists collapse to a bare object
    ObjectOrArray,
    /// Lists are always arrays
    #[default]
    ArrayOnly,
}

impl std::str::FromStr for WireShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "object-or-array" => Ok(WireShape::ObjectOrArray),
            "array-only" => Ok(WireShape::ArrayOnly),
            other => Err(format!("unknown wire shape '{}'", other)),
        }
    }
}

/// Payload does not describe a tree for the given definition
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Structured data payload is not a JSON object")]
    NotAnObject,

    #[error("Payload was built against definition '{found}', expected '{expected}'")]
    DefinitionMismatch { expected: String, found: String },

    #[error("Expected a node list at {at}")]
    InvalidNodeList { at: String },

    #[error("Expected a node object at {at}")]
    InvalidNode { at: String },

    #[error("Node at {at} is missing '{field}'")]
    MissingField { at: String, field: &'static str },

    #[error("Invalid identifier '{identifier}' at {at}: {source}")]
    InvalidIdentifier {
        at: String,
        identifier: String,
        #[source]
        source: IdentifierError,
    },

    #[error("Unknown node type '{node_type}' at {at}")]
    UnknownNodeType { at: String, node_type: String },

    #[error("Text of {at} is not a string")]
    InvalidText { at: String },

    #[error("Cannot determine the asset type of {at}")]
    UnknownAssetType { at: String },
}

// ============================================================================
// Decode
// ============================================================================

/// Decode a structured-data payload in either shape
pub fn decode(payload: &Value, definition: &Arc<DataDefinition>) -> Result<Tree, DecodeError> {
    let object = payload.as_object().ok_or(DecodeError::NotAnObject)?;

    if let (Some(expected), Some(found)) = (
        definition.id(),
        object
            .get(DEFINITION_ID)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty()),
    ) {
        if expected != found {
            return Err(DecodeError::DefinitionMismatch {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
    }

    let root = decode_children(object.get(NODES), Some(definition.fields()), "")?;
    let tree = Tree::new(Arc::clone(definition), root);
    debug!(nodes = tree.identifiers().len(), "Decoded structured data");
    Ok(tree)
}

/// Display form of a location for error messages
fn location(at: &str) -> String {
    if at.is_empty() {
        "<root>".to_string()
    } else {
        at.to_string()
    }
}

/// Flatten a node list in either shape
fn node_list<'a>(value: Option<&'a Value>, at: &str) -> Result<Vec<&'a Map<String, Value>>, DecodeError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_object().ok_or_else(|| DecodeError::InvalidNode { at: location(at) })
            })
            .collect(),
        Some(Value::Object(map)) => {
            if let Some(inner) = map.get(NODE) {
                node_list(Some(inner), at)
            } else if map.is_empty() {
                Ok(Vec::new())
            } else if map.contains_key("identifier") || map.contains_key("type") {
                Ok(vec![map])
            } else {
                Err(DecodeError::InvalidNodeList { at: location(at) })
            }
        }
        Some(_) => Err(DecodeError::InvalidNodeList { at: location(at) }),
    }
}

fn decode_children(
    value: Option<&Value>,
    fields: Option<&[SchemaField]>,
    at: &str,
) -> Result<Group, DecodeError> {
    // Instances of the same field are gathered in first-appearance order
    let mut by_name: IndexMap<&str, Vec<&Map<String, Value>>> = IndexMap::new();
    for object in node_list(value, at)? {
        let name = object
            .get("identifier")
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError::MissingField {
                at: location(at),
                field: "identifier",
            })?;
        validate_name(name).map_err(|source| DecodeError::InvalidIdentifier {
            at: location(at),
            identifier: name.to_string(),
            source,
        })?;
        by_name.entry(name).or_default().push(object);
    }

    let mut group = Group::new();
    for (name, objects) in by_name {
        let field = fields.and_then(|fields| fields.iter().find(|f| f.name == name));
        let repeatable = field.map_or(objects.len() > 1, |f| f.repeatable || objects.len() > 1);

        let mut nodes = Vec::with_capacity(objects.len());
        for (index, object) in objects.iter().enumerate() {
            let node_at = match (at.is_empty(), repeatable) {
                (true, false) => name.to_string(),
                (true, true) => format!("{}#{}", name, index),
                (false, false) => format!("{};{}", at, name),
                (false, true) => format!("{};{}#{}", at, name, index),
            };
            nodes.push(decode_node(object, field, &node_at)?);
        }

        let slot = if repeatable {
            Slot::Multiple(nodes)
        } else {
            match nodes.pop() {
                Some(node) => Slot::Single(node),
                None => continue,
            }
        };
        group.children.insert(name.to_string(), slot);
    }

    Ok(group)
}

fn decode_node(
    object: &Map<String, Value>,
    field: Option<&SchemaField>,
    at: &str,
) -> Result<Node, DecodeError> {
    let node_type = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError::MissingField {
            at: at.to_string(),
            field: "type",
        })?;

    match node_type {
        "group" => {
            let fields = field
                .filter(|f| f.kind.is_group())
                .map(|f| f.fields.as_slice());
            Ok(Node::Group(decode_children(object.get(NODES), fields, at)?))
        }
        "text" => {
            let kind = match field.map(|f| f.kind) {
                Some(FieldKind::Text(kind)) => kind,
                _ => TextKind::Plain,
            };
            let value = match object.get("text") {
                None | Some(Value::Null) => None,
                Some(Value::String(text)) => Some(text.clone()),
                Some(_) => return Err(DecodeError::InvalidText { at: at.to_string() }),
            };
            Ok(Node::Text(Text { kind, value }))
        }
        "asset" => decode_reference(object, field, at).map(Node::Reference),
        other => Err(DecodeError::UnknownNodeType {
            at: at.to_string(),
            node_type: other.to_string(),
        }),
    }
}

fn decode_reference(
    object: &Map<String, Value>,
    field: Option<&SchemaField>,
    at: &str,
) -> Result<Reference, DecodeError> {
    let unknown = || DecodeError::UnknownAssetType { at: at.to_string() };

    let target = AssetKind::ALL.iter().find_map(|kind| {
        Target {
            kind: *kind,
            id: string_property(object, &format!("{}Id", kind.as_str())),
            path: string_property(object, &format!("{}Path", kind.as_str())),
        }
        .normalized()
    });

    let wire_kind = object
        .get("assetType")
        .and_then(Value::as_str)
        .map(|name| ReferenceKind::from_wire_name(name).ok_or_else(unknown))
        .transpose()?;

    // The chooser kind is the field's; the wire kind only binds phantoms
    let kind = match (field.map(|f| f.kind), wire_kind, &target) {
        (Some(FieldKind::Reference(kind)), _, _) => kind,
        (_, Some(kind), _) => kind,
        (_, None, Some(target)) => ReferenceKind::from(target.kind),
        _ => return Err(unknown()),
    };

    Ok(Reference { kind, target })
}

fn string_property(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

// ============================================================================
// Encode
// ============================================================================

/// Encode a tree in the requested shape
pub fn encode(tree: &Tree, shape: WireShape) -> Value {
    let mut payload = Map::new();
    let definition = tree.definition();
    if let Some(id) = definition.id() {
        payload.insert(DEFINITION_ID.to_string(), Value::from(id));
    }
    if let Some(path) = definition.path() {
        payload.insert(DEFINITION_PATH.to_string(), Value::from(path));
    }
    if let Some(nodes) = encode_children(tree.root(), shape) {
        payload.insert(NODES.to_string(), nodes);
    }
    Value::Object(payload)
}

fn encode_children(group: &Group, shape: WireShape) -> Option<Value> {
    let mut nodes: Vec<Value> = group
        .children
        .iter()
        .flat_map(|(name, slot)| slot.instances().map(move |node| encode_node(name, node, shape)))
        .collect();

    match shape {
        WireShape::ArrayOnly => Some(Value::Array(nodes)),
        WireShape::ObjectOrArray => {
            let list = match nodes.len() {
                0 => return None,
                1 => nodes.pop()?,
                _ => Value::Array(nodes),
            };
            let mut wrapper = Map::new();
            wrapper.insert(NODE.to_string(), list);
            Some(Value::Object(wrapper))
        }
    }
}

fn encode_node(name: &str, node: &Node, shape: WireShape) -> Value {
    let mut object = Map::new();
    object.insert("identifier".to_string(), Value::from(name));

    match node {
        Node::Group(group) => {
            object.insert("type".to_string(), Value::from("group"));
            if let Some(children) = encode_children(group, shape) {
                object.insert(NODES.to_string(), children);
            }
        }
        Node::Text(text) => {
            object.insert("type".to_string(), Value::from("text"));
            if let Some(value) = &text.value {
                object.insert("text".to_string(), Value::from(value.as_str()));
            }
        }
        Node::Reference(reference) => {
            object.insert("type".to_string(), Value::from("asset"));
            object.insert(
                "assetType".to_string(),
                Value::from(reference.kind.wire_name()),
            );
            if let Some(target) = &reference.target {
                let prefix = target.kind.as_str();
                if let Some(id) = &target.id {
                    object.insert(format!("{}Id", prefix), Value::from(id.as_str()));
                }
                if let Some(path) = &target.path {
                    object.insert(format!("{}Path", prefix), Value::from(path.as_str()));
                }
            }
        }
    }

    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Identifier;
    use serde_json::json;

    fn id(text: &str) -> Identifier {
        Identifier::parse(text).unwrap()
    }

    fn definition() -> Arc<DataDefinition> {
        Arc::new(
            DataDefinition::new(
                Some("def-1".into()),
                Some("/defs/news".into()),
                vec![
                    SchemaField::text("title", TextKind::Plain),
                    SchemaField::group(
                        "multiple-first",
                        vec![SchemaField::text("text", TextKind::Plain)],
                    )
                    .multiple(),
                    SchemaField::reference("link", ReferenceKind::Linkable),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_decode_array_only() {
        let payload = json!({
            "definitionId": "def-1",
            "structuredDataNodes": [
                {"type": "text", "identifier": "title", "text": "Hello"},
                {"type": "group", "identifier": "multiple-first", "structuredDataNodes": [
                    {"type": "text", "identifier": "text", "text": "X"}
                ]},
                {"type": "asset", "identifier": "link", "assetType": "page,file,symlink",
                 "fileId": "f1", "filePath": "/docs/a.pdf"}
            ]
        });

        let tree = decode(&payload, &definition()).unwrap();
        assert_eq!(tree.text_value(&id("title")).unwrap(), "Hello");
        assert_eq!(tree.sibling_count(&id("multiple-first#0")).unwrap(), 1);
        assert_eq!(tree.text_value(&id("multiple-first#0;text")).unwrap(), "X");

        let link = tree.reference(&id("link")).unwrap();
        assert_eq!(link.kind, ReferenceKind::Linkable);
        assert_eq!(link.target.as_ref().unwrap().kind, AssetKind::File);
        assert_eq!(link.target_path(), Some("/docs/a.pdf"));
    }

    #[test]
    fn test_decode_object_or_array_single_child() {
        let payload = json!({
            "structuredDataNodes": {"structuredDataNode": {
                "type": "group", "identifier": "multiple-first",
                "structuredDataNodes": {"structuredDataNode": {
                    "type": "text", "identifier": "text", "text": "X"
                }}
            }}
        });

        let tree = decode(&payload, &definition()).unwrap();
        assert_eq!(tree.sibling_count(&id("multiple-first#0")).unwrap(), 1);
        assert_eq!(tree.text_value(&id("multiple-first#0;text")).unwrap(), "X");
    }

    #[test]
    fn test_encode_object_or_array_collapses_single_entry() {
        let mut tree = Tree::blank(definition());
        tree.root_mut().children.shift_remove("title");
        tree.root_mut().children.shift_remove("link");

        let encoded = encode(&tree, WireShape::ObjectOrArray);
        let wrapped = &encoded[NODES][NODE];
        assert!(wrapped.is_object());
        assert_eq!(wrapped["identifier"], "multiple-first");

        tree.append_sibling(&id("multiple-first#0")).unwrap();
        let encoded = encode(&tree, WireShape::ObjectOrArray);
        assert_eq!(encoded[NODES][NODE].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_encode_array_only_is_always_array() {
        let mut tree = Tree::blank(definition());
        tree.root_mut().children.retain(|name, _| name == "multiple-first");
        let encoded = encode(&tree, WireShape::ArrayOnly);
        assert_eq!(encoded[NODES].as_array().unwrap().len(), 1);
        assert_eq!(encoded["definitionId"], "def-1");
        assert_eq!(encoded["definitionPath"], "/defs/news");
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        let definition = definition();
        assert!(matches!(
            decode(&json!([]), &definition),
            Err(DecodeError::NotAnObject)
        ));
        assert!(matches!(
            decode(&json!({"structuredDataNodes": 3}), &definition),
            Err(DecodeError::InvalidNodeList { .. })
        ));
        assert!(matches!(
            decode(&json!({"structuredDataNodes": [{"type": "text"}]}), &definition),
            Err(DecodeError::MissingField { field: "identifier", .. })
        ));
        assert!(matches!(
            decode(
                &json!({"structuredDataNodes": [{"type": "blob", "identifier": "x"}]}),
                &definition
            ),
            Err(DecodeError::UnknownNodeType { .. })
        ));
        assert!(matches!(
            decode(
                &json!({"structuredDataNodes": [{"type": "text", "identifier": "a;b"}]}),
                &definition
            ),
            Err(DecodeError::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            decode(
                &json!({"structuredDataNodes": [{"type": "text", "identifier": "title", "text": 4}]}),
                &definition
            ),
            Err(DecodeError::InvalidText { .. })
        ));
        assert!(matches!(
            decode(&json!({"definitionId": "other"}), &definition),
            Err(DecodeError::DefinitionMismatch { .. })
        ));
    }

    #[test]
    fn test_chooser_kind_prefers_field_over_wire() {
        let payload = json!({"structuredDataNodes": [
            {"type": "asset", "identifier": "link", "assetType": "page", "pageId": "p1"},
            {"type": "asset", "identifier": "gone", "assetType": "block", "blockId": "b1"}
        ]});
        let tree = decode(&payload, &definition()).unwrap();
        assert_eq!(tree.reference(&id("link")).unwrap().kind, ReferenceKind::Linkable);
        assert_eq!(tree.reference(&id("gone")).unwrap().kind, ReferenceKind::Block);
    }

    #[test]
    fn test_kind_drift_decodes_as_wire_kind() {
        let payload = json!({"structuredDataNodes": [
            {"type": "group", "identifier": "title", "structuredDataNodes": []}
        ]});
        let tree = decode(&payload, &definition()).unwrap();
        assert!(tree.is_group(&id("title")));
    }

    #[test]
    fn test_unknown_field_repeated_becomes_multiple() {
        let payload = json!({"structuredDataNodes": [
            {"type": "text", "identifier": "legacy", "text": "a"},
            {"type": "text", "identifier": "legacy", "text": "b"}
        ]});
        let tree = decode(&payload, &definition()).unwrap();
        assert_eq!(tree.text_value(&id("legacy#1")).unwrap(), "b");
    }

    #[test]
    fn test_shape_from_str() {
        assert_eq!(
            "object-or-array".parse::<WireShape>(),
            Ok(WireShape::ObjectOrArray)
        );
        assert_eq!("array-only".parse::<WireShape>(), Ok(WireShape::ArrayOnly));
        assert!("soap".parse::<WireShape>().is_err());
    }
}
