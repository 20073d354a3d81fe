//! Host Binding Integration Tests
//!
//! Opening, editing, committing and reconciling content objects through an
//! in-memory service, in both wire shapes.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio_test::assert_ok;

use sdtree::domain::{AssetKind, Target};
use sdtree::wire::{NODE, NODES};
use sdtree::{
    AssetRecord, AssetRef, Client, DataDefinition, Error, Identifier, MemoryService, TreeError,
    WireShape,
};

fn id(text: &str) -> Identifier {
    Identifier::parse(text).unwrap()
}

const DEFINITION: &str = r#"
id: promo-def
path: /definitions/promo
fields:
  - name: heading
    type: text
  - name: cards
    type: group
    multiple: true
    fields:
      - name: text
        type: text
  - name: style
    type: text
    text_type: dropdown
    values: [light, dark]
  - name: target
    type: asset
    asset_type: page
"#;

fn definition() -> DataDefinition {
    DataDefinition::from_yaml(DEFINITION).unwrap()
}

fn block_record() -> AssetRecord {
    let mut properties = Map::new();
    properties.insert("id".into(), json!("blk1"));
    properties.insert("name".into(), json!("promo"));
    properties.insert(
        "structuredData".into(),
        json!({
            "definitionId": "promo-def",
            "structuredDataNodes": [
                {"type": "text", "identifier": "heading", "text": "Welcome"},
                {"type": "group", "identifier": "cards", "structuredDataNodes": [
                    {"type": "text", "identifier": "text", "text": "X"}
                ]},
                {"type": "text", "identifier": "style", "text": "light"},
                {"type": "asset", "identifier": "target", "assetType": "page", "pageId": "p9"}
            ]
        }),
    );
    AssetRecord::new("xhtmlDataDefinitionBlock", properties)
}

fn service(shape: WireShape) -> Arc<MemoryService> {
    let mut page = Map::new();
    page.insert("id".into(), json!("p9"));
    page.insert("name".into(), json!("landing"));

    Arc::new(
        MemoryService::new(shape)
            .with_definition(definition())
            .with_record(&AssetRef::block("blk1"), block_record())
            .with_record(
                &AssetRef::page("plain"),
                AssetRecord::new("page", Map::new()).with_property("xhtml", json!("<p>hi</p>")),
            )
            .with_asset(AssetKind::Page, "p9", AssetRecord::new("page", page)),
    )
}

fn client(service: &Arc<MemoryService>) -> Client {
    Client::new(service.clone(), service.clone()).with_resolver(service.clone())
}

fn stored_nodes(record: &AssetRecord) -> &Value {
    &record.structured_data().unwrap()[NODES]
}

#[tokio::test]
async fn test_open_edit_commit_in_both_shapes() {
    for shape in [WireShape::ArrayOnly, WireShape::ObjectOrArray] {
        let service = service(shape);
        let client = client(&service);
        let asset = AssetRef::block("blk1");

        let mut handle = assert_ok!(client.open(&asset).await);
        assert!(!handle.is_dirty());

        handle.set_text(&id("heading"), "Hello").unwrap();
        handle.tree_mut().unwrap().append_sibling(&id("cards#0")).unwrap();
        assert!(handle.is_dirty());

        assert_ok!(client.commit(&mut handle).await);
        assert!(!handle.is_dirty());
        assert_eq!(handle.tree().unwrap().text_value(&id("heading")).unwrap(), "Hello");
        assert_eq!(handle.tree().unwrap().sibling_count(&id("cards#0")).unwrap(), 2);

        let stored = service.record(&asset).await.unwrap();
        assert_eq!(stored.name(), Some("promo"));
        match shape {
            WireShape::ArrayOnly => assert!(stored_nodes(&stored).is_array()),
            WireShape::ObjectOrArray => assert!(stored_nodes(&stored)[NODE].is_array()),
        }
    }
}

#[tokio::test]
async fn test_commit_failure_keeps_edits() {
    let service = service(WireShape::ArrayOnly);
    let client = client(&service);
    let asset = AssetRef::block("blk1");

    let mut handle = client.open(&asset).await.unwrap();
    handle.set_text(&id("heading"), "Unsaved").unwrap();
    service.fail_next_edit();

    match client.commit(&mut handle).await {
        Err(Error::CommitFailure { asset: failed, message }) => {
            assert_eq!(failed, asset);
            assert!(message.contains("rejected"));
        }
        other => panic!("Expected CommitFailure, got {:?}", other.map(|_| ())),
    }

    assert!(handle.is_dirty());
    assert_eq!(handle.tree().unwrap().text_value(&id("heading")).unwrap(), "Unsaved");
    let stored = service.record(&asset).await.unwrap();
    assert_eq!(stored_nodes(&stored)[0]["text"], "Welcome");

    // retry goes through
    assert_ok!(client.commit(&mut handle).await);
    assert!(!handle.is_dirty());
}

#[tokio::test]
async fn test_xhtml_content_is_not_writable() {
    let service = service(WireShape::ArrayOnly);
    let client = client(&service);

    let mut handle = client.open(&AssetRef::page("plain")).await.unwrap();
    assert_eq!(handle.xhtml(), Some("<p>hi</p>"));
    assert_eq!(handle.tree().unwrap_err(), TreeError::NotWritable);
    assert_eq!(
        handle.set_text(&id("heading"), "x").unwrap_err(),
        TreeError::NotWritable
    );
}

#[tokio::test]
async fn test_reconcile_after_definition_change() {
    let service = service(WireShape::ObjectOrArray);
    let client = client(&service);
    let asset = AssetRef::block("blk1");
    let mut handle = client.open(&asset).await.unwrap();

    service
        .put_definition(
            DataDefinition::from_yaml(
                r#"
id: promo-def
path: /definitions/promo
fields:
  - name: heading
    type: text
  - name: style
    type: text
    text_type: dropdown
    values: [dark]
  - name: target
    type: asset
    asset_type: page
"#,
            )
            .unwrap(),
        )
        .await;

    let report = client.reconcile(&mut handle).await.unwrap();
    assert_eq!(report.phantom_nodes, vec![id("cards#0"), id("cards#0;text")]);
    assert_eq!(report.phantom_values, vec![id("style")]);
    assert!(handle.is_dirty());

    let tree = handle.tree().unwrap();
    assert!(!tree.has_node(&id("cards#0")));
    assert_eq!(tree.text_value(&id("style")).unwrap(), "");

    assert_ok!(client.commit(&mut handle).await);
    let report = client.reconcile(&mut handle).await.unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_resolve_reference() {
    let service = service(WireShape::ArrayOnly);
    let client = client(&service);
    let handle = client.open(&AssetRef::block("blk1")).await.unwrap();

    let target = handle.tree().unwrap().reference(&id("target")).unwrap().clone();
    let record = client.resolve(&target).await.unwrap().unwrap();
    assert_eq!(record.name(), Some("landing"));

    let mut empty = target.clone();
    empty.target = None;
    assert!(client.resolve(&empty).await.unwrap().is_none());

    let mut missing = target;
    missing.target = Some(Target::by_id(AssetKind::Page, "nope"));
    assert!(matches!(
        client.resolve(&missing).await,
        Err(Error::Transport(_))
    ));
}

#[tokio::test]
async fn test_open_unknown_definition() {
    let service = Arc::new(
        MemoryService::new(WireShape::ArrayOnly)
            .with_record(&AssetRef::block("blk1"), block_record()),
    );
    let client = Client::new(service.clone(), service);
    assert!(matches!(
        client.open(&AssetRef::block("blk1")).await,
        Err(Error::Transport(_))
    ));
}
