//! This contains test scenarios that a given [TreeStore] needs to pass.
//! We use [rstest] and [rstest_reuse] to provide all stores we want to test
//! against, and then apply this template to all test functions.

use futures::TryStreamExt;
use rstest::*;
use rstest_reuse::{self, *};

use super::TreeStore;
use crate::fixtures::{SCENARIO_TREE, WIDE_ROOT};
use crate::indexer::index_tree;
use crate::nodes::{DigitalObjectId, FileTree, Node};
use crate::proto::NodeRecord;
use crate::treestore::{self, assemble};
use crate::{Error, NodeId, TreeId};

/// This produces a template, which will be applied to all individual test functions.
/// See https://github.com/la10736/rstest/issues/130#issuecomment-968864832
#[template]
#[rstest]
#[case::memory(treestore::from_addr("memory://").await.unwrap())]
#[case::sled(treestore::from_addr("sled://").await.unwrap())]
#[case::redb(treestore::from_addr("redb://").await.unwrap())]
pub fn tree_stores(#[case] tree_store: impl TreeStore) {}

/// Indexes the tree and stamps all records with the given version.
fn records_of(tree: &FileTree, version: u32) -> Vec<NodeRecord> {
    let mut records = index_tree(tree).unwrap();
    for record in records.iter_mut() {
        record.version = version;
    }
    records
}

/// The records of [WIDE_ROOT], stored as the given tree.
fn wide_records_for(tree: &TreeId, version: u32) -> Vec<NodeRecord> {
    let wide = FileTree::with_view(
        tree.digital_object_id().clone(),
        tree.view(),
        WIDE_ROOT.clone(),
    );
    records_of(&wide, version)
}

fn scenario_tree_id() -> TreeId {
    TreeId::new(
        SCENARIO_TREE.digital_object_id().clone(),
        SCENARIO_TREE.view(),
    )
}

async fn collect_range(
    tree_store: &impl TreeStore,
    tree: &TreeId,
    from: u64,
    to: u64,
) -> Vec<NodeRecord> {
    tree_store
        .range(tree, from, to)
        .try_collect()
        .await
        .expect("range must succeed")
}

/// Asking for anything in a store that never saw the tree returns nothing.
#[apply(tree_stores)]
#[tokio::test]
async fn test_non_exist(tree_store: impl TreeStore) {
    let tree = scenario_tree_id();

    assert_eq!(Ok(None), tree_store.get(&tree, 0).await);
    assert_eq!(Ok(None), tree_store.seek(&tree, 0, u64::MAX).await);
    assert!(collect_range(&tree_store, &tree, 0, u64::MAX).await.is_empty());
    assert_eq!(Ok(0), tree_store.delete_tree(&tree).await);
    assert_eq!(
        Ok(Vec::<String>::new()),
        tree_store.views(tree.digital_object_id()).await
    );
}

/// Records written in a batch can be looked up individually and by range,
/// ordered by arrived.
#[apply(tree_stores)]
#[tokio::test]
async fn put_get_range(tree_store: impl TreeStore) {
    let records = records_of(&SCENARIO_TREE, 1);
    tree_store.put_batch(records.clone()).await.unwrap();

    let tree = scenario_tree_id();
    for record in &records {
        assert_eq!(
            Some(record.clone()),
            tree_store.get(&tree, record.arrived).await.unwrap()
        );
    }

    // arrived 4 and 5 are never used by the scenario
    assert_eq!(Ok(None), tree_store.get(&tree, 4).await);

    assert_eq!(records, collect_range(&tree_store, &tree, 0, u64::MAX).await);
    assert_eq!(
        records[1..3].to_vec(),
        collect_range(&tree_store, &tree, 1, 2).await
    );
    assert!(collect_range(&tree_store, &tree, 3, 1).await.is_empty());
}

/// The first batch of a tree is only written while there is no root.
#[apply(tree_stores)]
#[tokio::test]
async fn put_first_batch_refuses_existing_root(tree_store: impl TreeStore) {
    let tree = scenario_tree_id();
    let records = records_of(&SCENARIO_TREE, 1);
    tree_store
        .put_first_batch(&tree, records.clone())
        .await
        .unwrap();

    let wide = wide_records_for(&tree, 2);
    assert_eq!(
        Err(Error::AlreadyExists {
            digital_object_id: tree.digital_object_id().clone(),
            view: tree.view().to_string(),
        }),
        tree_store.put_first_batch(&tree, wide.clone()).await
    );
    // nothing of the refused batch got written
    assert_eq!(records, collect_range(&tree_store, &tree, 0, u64::MAX).await);

    // other views are separate trees
    let other = TreeId::new(tree.digital_object_id().clone(), "other");
    let mut other_records = records_of(&SCENARIO_TREE, 1);
    for record in other_records.iter_mut() {
        record.view = "other".to_string();
    }
    tree_store
        .put_first_batch(&other, other_records)
        .await
        .unwrap();

    // once the tree is gone, it can be written again
    tree_store.delete_tree(&tree).await.unwrap();
    tree_store.put_first_batch(&tree, wide.clone()).await.unwrap();
    assert_eq!(wide, collect_range(&tree_store, &tree, 0, u64::MAX).await);
}

/// Of two first batches racing for the same tree, exactly one is written.
#[apply(tree_stores)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn put_first_batch_race(tree_store: impl TreeStore) {
    let tree = scenario_tree_id();
    let scenario = records_of(&SCENARIO_TREE, 1);
    let wide = wide_records_for(&tree, 2);

    let (a, b) = tokio::join!(
        tree_store.put_first_batch(&tree, scenario.clone()),
        tree_store.put_first_batch(&tree, wide.clone()),
    );

    let stored = collect_range(&tree_store, &tree, 0, u64::MAX).await;
    match (a, b) {
        (Ok(()), Err(Error::AlreadyExists { .. })) => assert_eq!(scenario, stored),
        (Err(Error::AlreadyExists { .. }), Ok(())) => assert_eq!(wide, stored),
        other => panic!("expected exactly one batch to be written, got {:?}", other),
    }
}

#[apply(tree_stores)]
#[tokio::test]
async fn seek(tree_store: impl TreeStore) {
    let records = records_of(&SCENARIO_TREE, 1);
    tree_store.put_batch(records.clone()).await.unwrap();
    let tree = scenario_tree_id();

    assert_eq!(Some(records[2].clone()), tree_store.seek(&tree, 2, 5).await.unwrap());
    assert_eq!(None, tree_store.seek(&tree, 4, 5).await.unwrap());
    assert_eq!(None, tree_store.seek(&tree, 5, 0).await.unwrap());

    // other views of the same object are not visible
    let other = TreeId::new(tree.digital_object_id().clone(), "other");
    assert_eq!(None, tree_store.seek(&other, 0, u64::MAX).await.unwrap());
}

/// Trees of objects whose ids are prefixes of each other don't bleed into
/// each other.
#[apply(tree_stores)]
#[tokio::test]
async fn objects_are_separate(tree_store: impl TreeStore) {
    let short = FileTree::new("obj", Node::file("short", "lfn://s"));
    let long = FileTree::new("obj-1", Node::file("long", "lfn://l"));
    tree_store.put_batch(records_of(&short, 1)).await.unwrap();
    tree_store.put_batch(records_of(&long, 1)).await.unwrap();

    let short_id = TreeId::default_view("obj".into());
    let records = collect_range(&tree_store, &short_id, 0, u64::MAX).await;
    assert_eq!(1, records.len());
    assert_eq!(Some("short"), records[0].name.as_deref());

    assert_eq!(Ok(1), tree_store.delete_all(short_id.digital_object_id()).await);
    assert!(tree_store
        .get(&TreeId::default_view("obj-1".into()), 0)
        .await
        .unwrap()
        .is_some());
}

#[apply(tree_stores)]
#[tokio::test]
async fn update(tree_store: impl TreeStore) {
    tree_store
        .put_batch(records_of(&SCENARIO_TREE, 3))
        .await
        .unwrap();
    let tree = scenario_tree_id();

    let node_id = NodeId::new(tree.digital_object_id().clone(), 1, 3, tree.view());
    let replacement = Node::file("renamed.txt", "lfn://renamed").with_attribute(("k", "v"));

    let updated = tree_store.update(&node_id, &replacement).await.unwrap();
    assert_eq!(replacement, updated.to_node().unwrap());
    assert_eq!(
        Some(updated.clone()),
        tree_store.get(&tree, 1).await.unwrap(),
        "update must be persisted"
    );
    assert_eq!((1, 1, 1), (updated.arrived, updated.leaved, updated.depth));

    // wrong kind
    assert_eq!(
        Err(Error::TypeMismatch {
            stored: crate::proto::NodeKind::File,
            replacement: crate::proto::NodeKind::Collection,
        }),
        tree_store.update(&node_id, &Node::collection("c")).await
    );

    // wrong version, and a position nothing is at
    for stale in [
        NodeId::new(tree.digital_object_id().clone(), 1, 2, tree.view()),
        NodeId::new(tree.digital_object_id().clone(), 4, 3, tree.view()),
    ] {
        assert_eq!(
            Err(Error::InvalidHandle(stale.clone())),
            tree_store.update(&stale, &replacement).await
        );
    }

    // neither of the failed updates changed anything
    assert_eq!(Some(updated), tree_store.get(&tree, 1).await.unwrap());
}

#[apply(tree_stores)]
#[tokio::test]
async fn views_and_delete(tree_store: impl TreeStore) {
    let doid: DigitalObjectId = "obj-1".into();
    for view in ["default", "by-date", "alt"] {
        let tree = FileTree::with_view(doid.clone(), view, WIDE_ROOT.clone());
        tree_store.put_batch(records_of(&tree, 1)).await.unwrap();
    }
    tree_store
        .put_batch(records_of(&FileTree::new("obj-2", WIDE_ROOT.clone()), 1))
        .await
        .unwrap();

    let mut views = tree_store.views(&doid).await.unwrap();
    views.sort();
    assert_eq!(vec!["alt", "by-date", "default"], views);

    let by_date = TreeId::new(doid.clone(), "by-date");
    assert_eq!(
        Ok(WIDE_ROOT.count_nodes() as u64),
        tree_store.delete_tree(&by_date).await
    );
    assert_eq!(Ok(None), tree_store.get(&by_date, 0).await);

    let mut views = tree_store.views(&doid).await.unwrap();
    views.sort();
    assert_eq!(vec!["alt", "default"], views);

    assert_eq!(
        Ok(2 * WIDE_ROOT.count_nodes() as u64),
        tree_store.delete_all(&doid).await
    );
    assert!(tree_store.views(&doid).await.unwrap().is_empty());
    assert_eq!(
        vec!["default"],
        tree_store.views(&"obj-2".into()).await.unwrap()
    );
}

/// Generations count up per tree, and survive deleting the tree.
#[apply(tree_stores)]
#[tokio::test]
async fn generations(tree_store: impl TreeStore) {
    let tree = scenario_tree_id();
    let other = TreeId::new(tree.digital_object_id().clone(), "other");

    assert_eq!(Ok(1), tree_store.next_generation(&tree).await);
    assert_eq!(Ok(2), tree_store.next_generation(&tree).await);
    assert_eq!(Ok(1), tree_store.next_generation(&other).await);

    tree_store
        .put_batch(records_of(&SCENARIO_TREE, 2))
        .await
        .unwrap();
    tree_store.delete_all(tree.digital_object_id()).await.unwrap();

    assert_eq!(Ok(3), tree_store.next_generation(&tree).await);
}

/// Records read back from the store assemble into the tree they were made of.
#[apply(tree_stores)]
#[tokio::test]
async fn assemble_from_store(tree_store: impl TreeStore) {
    let tree = FileTree::new("obj-wide", WIDE_ROOT.clone());
    tree_store.put_batch(records_of(&tree, 1)).await.unwrap();

    let records = collect_range(
        &tree_store,
        &TreeId::default_view("obj-wide".into()),
        0,
        u64::MAX,
    )
    .await;
    assert_eq!(*WIDE_ROOT, assemble(records).unwrap());
}
