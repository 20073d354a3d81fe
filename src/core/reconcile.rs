//! Reconciliation of a tree against a (possibly newer) definition.
//!
//! After a definition changes, a tree decoded earlier can hold nodes that
//! no longer belong to any field ("phantom nodes") and values a field no
//! longer accepts ("phantom values"). Neither is an error: the finders below
//! report them, and the pruners return a corrected copy of the tree. Nothing
//! here mutates its input or talks to the service.
//!
//! A node is phantom when:
//! - no field exists at its name path, or
//! - the field is of a different kind (group/text/reference), or
//! - it is instance `#1` or later of a field that is no longer repeatable.
//!
//! Descendants of a phantom group are phantom as well.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{
    DataDefinition, FieldKind, Group, Identifier, Node, NodeKind, Reference, SchemaField, Slot,
    Text,
};

use super::tree::{child_identifier, slot_segments, Tree};

/// Every phantom node, pre-order
pub fn find_phantom_nodes(tree: &Tree, definition: &DataDefinition) -> Vec<Identifier> {
    let mut out = Vec::new();
    visit(tree.root(), Some(definition.fields()), None, &mut |id, _, field| {
        if field.is_none() {
            out.push(id.clone());
        }
    });
    out
}

/// Copy of `tree` without its phantom nodes, bound to `definition`.
///
/// Surviving instances keep their order, so indices of a repeatable field
/// stay contiguous. Slots are re-shaped to the field's current multiplicity
/// and text subtypes / chooser kinds are taken from the definition.
pub fn prune_phantom_nodes(tree: &Tree, definition: &Arc<DataDefinition>) -> Tree {
    let pruned = Tree::new(Arc::clone(definition), prune_group(tree.root(), definition.fields()));
    debug!(
        before = tree.identifiers().len(),
        after = pruned.identifiers().len(),
        "Pruned phantom nodes"
    );
    pruned
}

/// Text and reference nodes holding a value their field does not accept
pub fn find_phantom_values(tree: &Tree, definition: &DataDefinition) -> Vec<Identifier> {
    let mut out = Vec::new();
    visit(tree.root(), Some(definition.fields()), None, &mut |id, node, field| {
        if let Some(field) = field {
            if value_is_phantom(node, field) {
                out.push(id.clone());
            }
        }
    });
    out
}

/// Copy of `tree` with phantom values reset, bound to `definition`.
///
/// Single-valued fields become empty; checkbox and multi-selector fields
/// keep the items that are still legal.
pub fn clear_phantom_values(tree: &Tree, definition: &Arc<DataDefinition>) -> Tree {
    let phantoms = find_phantom_values(tree, definition);
    let mut cleared = Tree::new(Arc::clone(definition), tree.root().clone());

    for id in &phantoms {
        let Some(field) = definition.field_for(id) else {
            continue;
        };
        match cleared.get_mut(id) {
            Ok(Node::Text(text)) => text.value = legal_remainder(text, field),
            Ok(Node::Reference(reference)) => reference.target = None,
            _ => {}
        }
    }

    debug!(cleared = phantoms.len(), "Cleared phantom values");
    cleared
}

/// Prune phantom nodes, then clear phantom values
pub fn reconcile(tree: &Tree, definition: &Arc<DataDefinition>) -> Tree {
    let pruned = prune_phantom_nodes(tree, definition);
    clear_phantom_values(&pruned, definition)
}

/// Walk every node, passing the field it belongs to (`None` when phantom)
fn visit<F>(group: &Group, fields: Option<&[SchemaField]>, parent: Option<&Identifier>, f: &mut F)
where
    F: FnMut(&Identifier, &Node, Option<&SchemaField>),
{
    for (name, slot) in &group.children {
        let field = fields.and_then(|fields| fields.iter().find(|field| field.name == *name));
        let segments = slot_segments(name, slot);

        for (index, (segment, node)) in segments.into_iter().zip(slot.instances()).enumerate() {
            let id = child_identifier(parent, segment);
            let owner = field.filter(|field| belongs_to(node, index, field));
            f(&id, node, owner);

            if let Node::Group(child) = node {
                visit(child, owner.map(|field| field.fields.as_slice()), Some(&id), f);
            }
        }
    }
}

/// Whether instance `index` of a slot is a legitimate instance of `field`
fn belongs_to(node: &Node, index: usize, field: &SchemaField) -> bool {
    NodeKind::from(&field.kind) == node.kind() && (field.repeatable || index == 0)
}

fn prune_group(group: &Group, fields: &[SchemaField]) -> Group {
    let mut pruned = Group::new();

    for (name, slot) in &group.children {
        let Some(field) = fields.iter().find(|field| field.name == *name) else {
            continue;
        };

        let mut kept: Vec<Node> = slot
            .instances()
            .enumerate()
            .filter(|(index, node)| belongs_to(node, *index, field))
            .map(|(_, node)| rebind(node, field))
            .collect();

        let slot = if field.repeatable {
            if kept.is_empty() {
                continue;
            }
            Slot::Multiple(kept)
        } else {
            match kept.pop() {
                Some(node) => Slot::Single(node),
                None => continue,
            }
        };
        pruned.children.insert(name.clone(), slot);
    }

    pruned
}

/// Copy of a node with its kind information taken from `field`
fn rebind(node: &Node, field: &SchemaField) -> Node {
    match (node, &field.kind) {
        (Node::Group(group), FieldKind::Group) => Node::Group(prune_group(group, &field.fields)),
        (Node::Text(text), FieldKind::Text(kind)) => Node::Text(Text {
            kind: *kind,
            value: text.value.clone(),
        }),
        (Node::Reference(reference), FieldKind::Reference(kind)) => Node::Reference(Reference {
            kind: *kind,
            target: reference.target.clone(),
        }),
        _ => node.clone(),
    }
}

fn value_is_phantom(node: &Node, field: &SchemaField) -> bool {
    match (node, &field.kind) {
        (Node::Text(text), FieldKind::Text(_)) => !field.allows_value(text.value()),
        (Node::Reference(reference), FieldKind::Reference(kind)) => reference
            .target
            .as_ref()
            .is_some_and(|target| !kind.accepts(target.kind)),
        _ => false,
    }
}

/// What is left of a text value once illegal items are dropped
fn legal_remainder(text: &Text, field: &SchemaField) -> Option<String> {
    let FieldKind::Text(kind) = field.kind else {
        return None;
    };
    if !kind.is_multi_valued() {
        return None;
    }

    let legal: Vec<&str> = kind
        .split_items(text.value())
        .into_iter()
        .filter(|item| {
            field
                .legal_values
                .as_ref()
                .map_or(true, |legal| legal.contains(*item))
        })
        .collect();

    if legal.is_empty() {
        None
    } else {
        Some(kind.join_items(&legal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetKind, ReferenceKind, Target, TextKind};

    fn id(text: &str) -> Identifier {
        Identifier::parse(text).unwrap()
    }

    fn original() -> Arc<DataDefinition> {
        Arc::new(
            DataDefinition::new(
                Some("def".into()),
                None,
                vec![
                    SchemaField::text("title", TextKind::Plain),
                    SchemaField::group(
                        "items",
                        vec![
                            SchemaField::text("label", TextKind::Plain),
                            SchemaField::text("legacy", TextKind::Plain),
                        ],
                    )
                    .multiple(),
                    SchemaField::text("color", TextKind::Dropdown)
                        .with_values(["red", "green", "blue"]),
                    SchemaField::text("tags", TextKind::Checkbox).with_values(["a", "b", "c"]),
                    SchemaField::reference("link", ReferenceKind::Linkable),
                    SchemaField::text("old", TextKind::Plain),
                ],
            )
            .unwrap(),
        )
    }

    fn evolved() -> Arc<DataDefinition> {
        Arc::new(
            DataDefinition::new(
                Some("def".into()),
                None,
                vec![
                    SchemaField::text("title", TextKind::Plain),
                    SchemaField::group("items", vec![SchemaField::text("label", TextKind::Plain)])
                        .multiple(),
                    SchemaField::text("color", TextKind::Dropdown).with_values(["red", "green"]),
                    SchemaField::text("tags", TextKind::Checkbox).with_values(["a", "b"]),
                    SchemaField::reference("link", ReferenceKind::Page),
                ],
            )
            .unwrap(),
        )
    }

    fn drifted_tree() -> Tree {
        let mut tree = Tree::blank(original());
        tree.set_text(&id("items#0;label"), "one").unwrap();
        tree.append_sibling(&id("items#0")).unwrap();
        tree.set_text(&id("items#1;label"), "two").unwrap();
        tree.set_text(&id("color"), "blue").unwrap();
        tree.set_choices(&id("tags"), &["a", "c"]).unwrap();
        tree.set_reference(&id("link"), Target::by_id(AssetKind::File, "f1"))
            .unwrap();
        tree
    }

    #[test]
    fn test_find_phantom_nodes() {
        let tree = drifted_tree();
        let phantoms: Vec<String> = find_phantom_nodes(&tree, &evolved())
            .iter()
            .map(|i| i.to_string())
            .collect();
        assert_eq!(phantoms, vec!["items#0;legacy", "items#1;legacy", "old"]);
    }

    #[test]
    fn test_clean_tree_has_no_phantoms() {
        let tree = Tree::blank(evolved());
        assert!(find_phantom_nodes(&tree, &evolved()).is_empty());
        assert!(find_phantom_values(&tree, &evolved()).is_empty());
        assert_eq!(prune_phantom_nodes(&tree, &evolved()), tree);
        assert_eq!(clear_phantom_values(&tree, &evolved()), tree);
    }

    #[test]
    fn test_prune_keeps_valid_siblings() {
        let tree = drifted_tree();
        let pruned = prune_phantom_nodes(&tree, &evolved());

        assert!(!pruned.has_node(&id("old")));
        assert!(!pruned.has_node(&id("items#0;legacy")));
        assert_eq!(pruned.text_value(&id("items#0;label")).unwrap(), "one");
        assert_eq!(pruned.text_value(&id("items#1;label")).unwrap(), "two");
        assert!(find_phantom_nodes(&pruned, &evolved()).is_empty());
    }

    #[test]
    fn test_prune_is_idempotent() {
        let tree = drifted_tree();
        let once = prune_phantom_nodes(&tree, &evolved());
        let twice = prune_phantom_nodes(&once, &evolved());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_kind_change_is_phantom() {
        let tree = Tree::blank(original());
        let changed = Arc::new(
            DataDefinition::new(
                Some("def".into()),
                None,
                vec![SchemaField::group(
                    "title",
                    vec![SchemaField::text("x", TextKind::Plain)],
                )],
            )
            .unwrap(),
        );
        let phantoms = find_phantom_nodes(&tree, &changed);
        assert!(phantoms.contains(&id("title")));

        let pruned = prune_phantom_nodes(&tree, &changed);
        assert!(pruned.identifiers().is_empty());
    }

    #[test]
    fn test_no_longer_repeatable_keeps_first_instance() {
        let tree = drifted_tree();
        let single = Arc::new(
            DataDefinition::new(
                Some("def".into()),
                None,
                vec![SchemaField::group(
                    "items",
                    vec![SchemaField::text("label", TextKind::Plain)],
                )],
            )
            .unwrap(),
        );

        let phantoms = find_phantom_nodes(&tree, &single);
        assert!(phantoms.contains(&id("items#1")));
        assert!(!phantoms.contains(&id("items#0")));

        let pruned = prune_phantom_nodes(&tree, &single);
        assert_eq!(pruned.text_value(&id("items;label")).unwrap(), "one");
        assert!(!pruned.is_multiple(&id("items")).unwrap());
    }

    #[test]
    fn test_find_and_clear_phantom_values() {
        let tree = prune_phantom_nodes(&drifted_tree(), &evolved());
        let values = find_phantom_values(&tree, &evolved());
        assert_eq!(values, vec![id("color"), id("tags"), id("link")]);

        let cleared = clear_phantom_values(&tree, &evolved());
        assert_eq!(cleared.text(&id("color")).unwrap().value, None);
        assert_eq!(cleared.text(&id("tags")).unwrap().items(), vec!["a"]);
        assert!(cleared.reference(&id("link")).unwrap().target.is_none());
        assert!(cleared.has_node(&id("color")));
        assert!(find_phantom_values(&cleared, &evolved()).is_empty());
    }

    #[test]
    fn test_unconstrained_values_never_phantom() {
        let mut tree = Tree::blank(evolved());
        tree.set_text(&id("title"), "anything at all").unwrap();
        assert!(find_phantom_values(&tree, &evolved()).is_empty());
    }

    #[test]
    fn test_reconcile_does_both() {
        let reconciled = reconcile(&drifted_tree(), &evolved());
        assert!(find_phantom_nodes(&reconciled, &evolved()).is_empty());
        assert!(find_phantom_values(&reconciled, &evolved()).is_empty());
        assert_eq!(reconciled.definition(), &evolved());
    }
}
