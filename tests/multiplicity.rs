//! Multiplicity Integration Tests
//!
//! Appending, removing, resizing and swapping instances of repeatable fields.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use sdtree::core::find_phantom_nodes;
use sdtree::wire::decode;
use sdtree::{DataDefinition, Identifier, SchemaField, TextKind, Tree, TreeError};

fn id(text: &str) -> Identifier {
    Identifier::parse(text).unwrap()
}

fn tree() -> Tree {
    let definition = DataDefinition::new(
        None,
        Some("/definitions/list".into()),
        vec![
            SchemaField::text("title", TextKind::Plain),
            SchemaField::group(
                "multiple-first",
                vec![
                    SchemaField::text("text", TextKind::Plain),
                    SchemaField::group(
                        "rows",
                        vec![SchemaField::text("cell", TextKind::Plain)],
                    )
                    .multiple(),
                ],
            )
            .multiple(),
        ],
    )
    .unwrap();
    Tree::blank(Arc::new(definition))
}

#[test]
fn test_resize_then_remove_to_sole_instance() {
    let mut tree = tree();
    let first = id("multiple-first#0");
    tree.set_text(&id("multiple-first#0;text"), "X").unwrap();

    tree.resize_to(&first, 3).unwrap();
    assert_eq!(
        tree.siblings(&first).unwrap(),
        vec![
            id("multiple-first#0"),
            id("multiple-first#1"),
            id("multiple-first#2")
        ]
    );
    for index in 0..3 {
        let text = id(&format!("multiple-first#{};text", index));
        assert_eq!(tree.text_value(&text).unwrap(), "X");
    }

    tree.remove_last_sibling(&first).unwrap();
    tree.remove_last_sibling(&first).unwrap();
    assert_eq!(tree.siblings(&first).unwrap(), vec![id("multiple-first#0")]);

    let before = tree.clone();
    let err = tree.remove_last_sibling(&first).unwrap_err();
    assert_eq!(err, TreeError::CannotRemoveSoleInstance(first.clone()));
    assert_eq!(tree, before);
    assert_eq!(tree.sibling_count(&first).unwrap(), 1);
}

#[test]
fn test_append_duplicates_nested_subtree() {
    let mut tree = tree();
    tree.set_text(&id("multiple-first#0;rows#0;cell"), "c0").unwrap();
    tree.append_sibling(&id("multiple-first#0;rows#0")).unwrap();
    tree.set_text(&id("multiple-first#0;rows#1;cell"), "c1").unwrap();

    let appended = tree.append_sibling(&id("multiple-first#0")).unwrap();
    assert_eq!(appended, id("multiple-first#1"));
    assert_eq!(tree.sibling_count(&id("multiple-first#1;rows#0")).unwrap(), 2);
    assert_eq!(tree.text_value(&id("multiple-first#1;rows#1;cell")).unwrap(), "c1");
}

#[test]
fn test_nested_sibling_counts_are_per_parent() {
    let mut tree = tree();
    tree.append_sibling(&id("multiple-first#0")).unwrap();
    tree.resize_to(&id("multiple-first#1;rows#0"), 4).unwrap();

    assert_eq!(tree.sibling_count(&id("multiple-first#0;rows#0")).unwrap(), 1);
    assert_eq!(tree.sibling_count(&id("multiple-first#1;rows#0")).unwrap(), 4);
}

#[test]
fn test_swap_across_parents() {
    let mut tree = tree();
    tree.set_text(&id("multiple-first#0;rows#0;cell"), "left").unwrap();
    tree.append_sibling(&id("multiple-first#0")).unwrap();
    tree.set_text(&id("multiple-first#1;rows#0;cell"), "right").unwrap();

    tree.swap(&id("multiple-first#0;rows#0"), &id("multiple-first#1;rows#0"))
        .unwrap();
    assert_eq!(tree.text_value(&id("multiple-first#0;rows#0;cell")).unwrap(), "right");
    assert_eq!(tree.text_value(&id("multiple-first#1;rows#0;cell")).unwrap(), "left");
}

#[test]
fn test_failed_operations_leave_tree_unchanged() {
    let mut tree = tree();
    let before = tree.clone();

    assert!(matches!(
        tree.append_sibling(&id("multiple-first#0;text")),
        Err(TreeError::NotMultiple(_))
    ));
    assert!(matches!(
        tree.resize_to(&id("multiple-first#0"), 0),
        Err(TreeError::InvalidCount { .. })
    ));
    assert!(matches!(
        tree.swap(&id("multiple-first#0"), &id("multiple-first#5")),
        Err(TreeError::NodeNotFound(_))
    ));
    assert!(matches!(
        tree.append_sibling(&id("missing#0")),
        Err(TreeError::NodeNotFound(_))
    ));
    assert_eq!(tree, before);
}

#[test]
fn test_duplicated_single_field_is_not_multiple() {
    let definition = Arc::clone(tree().definition());
    let payload = json!({
        "definitionPath": "/definitions/list",
        "structuredDataNodes": [
            {"type": "text", "identifier": "title", "text": "one"},
            {"type": "text", "identifier": "title", "text": "two"}
        ]
    });
    let mut tree = decode(&payload, &definition).unwrap();
    let before = tree.clone();

    assert!(!tree.is_multiple(&id("title#0")).unwrap());
    assert!(matches!(
        tree.sibling_count(&id("title#0")),
        Err(TreeError::NotMultiple(_))
    ));
    assert!(matches!(
        tree.append_sibling(&id("title#0")),
        Err(TreeError::NotMultiple(_))
    ));
    assert!(matches!(
        tree.remove_last_sibling(&id("title#0")),
        Err(TreeError::NotMultiple(_))
    ));
    assert_eq!(tree, before);
    assert_eq!(find_phantom_nodes(&tree, &definition), vec![id("title#1")]);
}

#[derive(Debug, Clone)]
enum Op {
    Append,
    RemoveLast,
    Resize(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Append),
        Just(Op::RemoveLast),
        (1usize..6).prop_map(Op::Resize),
    ]
}

proptest! {
    /// Sibling indices stay exactly 0..n after any sequence of operations
    #[test]
    fn prop_indices_stay_contiguous(ops in proptest::collection::vec(arb_op(), 0..25)) {
        let mut tree = tree();
        let first = id("multiple-first#0");
        let mut expected = 1usize;

        for op in ops {
            match op {
                Op::Append => {
                    tree.append_sibling(&first).unwrap();
                    expected += 1;
                }
                Op::RemoveLast => {
                    let result = tree.remove_last_sibling(&first);
                    if expected == 1 {
                        prop_assert!(result.is_err());
                    } else {
                        prop_assert!(result.is_ok());
                        expected -= 1;
                    }
                }
                Op::Resize(count) => {
                    tree.resize_to(&first, count).unwrap();
                    expected = count;
                }
            }

            let siblings = tree.siblings(&first).unwrap();
            prop_assert_eq!(siblings.len(), expected);
            for (index, sibling) in siblings.iter().enumerate() {
                prop_assert!(tree.has_node(sibling));
                prop_assert_eq!(sibling.last().index(), Some(index));
            }
            prop_assert!(!tree.has_node(&first.with_last_index(expected)));
        }
    }
}
