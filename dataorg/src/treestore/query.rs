//! Tree shaped queries, answered with integer comparisons on the positions
//! of the records.
//!
//! Direct children are found by skip-scanning: the first record after a
//! node is its first child, and the first record after the subtree of a
//! child is its next sibling. Subtrees are a single range scan.
use futures::TryStreamExt;
use tracing::{debug, instrument, warn};

use super::TreeStore;
use crate::nodes::Node;
use crate::proto::NodeRecord;
use crate::{Error, NodeId, TreeId};

fn corrupted(record: &NodeRecord, reason: &str) -> Error {
    warn!(
        digital_object_id = %record.digital_object_id,
        view = %record.view,
        arrived = record.arrived,
        reason,
        "corrupted tree index"
    );
    Error::StorageError(format!(
        "corrupted tree index at {}:{}:{}: {}",
        record.digital_object_id, record.view, record.arrived, reason
    ))
}

/// Looks up the root record of a tree.
#[instrument(skip(store, tree), fields(tree = %tree), err)]
pub async fn root<S>(store: &S, tree: &TreeId) -> Result<Option<NodeRecord>, Error>
where
    S: TreeStore + ?Sized,
{
    match store.get(tree, 0).await? {
        Some(record) if record.depth != 0 => Err(corrupted(&record, "root is not at depth 0")),
        record => Ok(record),
    }
}

/// Looks up the record a handle points to. Fails with
/// [Error::InvalidHandle] if there is no record with the handle's position
/// and version.
#[instrument(skip(store, node_id), fields(node_id = %node_id))]
pub async fn resolve<S>(store: &S, node_id: &NodeId) -> Result<NodeRecord, Error>
where
    S: TreeStore + ?Sized,
{
    match store
        .get(&node_id.tree_id(), node_id.in_tree_id())
        .await?
    {
        Some(record) if record.version == node_id.version() => Ok(record),
        Some(record) => {
            debug!(stored.version = record.version, "stale handle");
            Err(Error::InvalidHandle(node_id.clone()))
        }
        None => {
            debug!("no record for handle");
            Err(Error::InvalidHandle(node_id.clone()))
        }
    }
}

/// Calls `f` with the direct children of `parent` in order, as long as it
/// returns true.
async fn for_each_child<S, F>(store: &S, parent: &NodeRecord, mut f: F) -> Result<(), Error>
where
    S: TreeStore + ?Sized,
    F: FnMut(NodeRecord) -> bool,
{
    // leaves have nothing in between arrived and leaved
    if parent.leaved <= parent.arrived {
        return Ok(());
    }

    let tree = parent.tree_id();
    let mut cursor = parent.arrived + 1;

    while let Some(child) = store.seek(&tree, cursor, parent.leaved).await? {
        if child.depth != parent.depth + 1 {
            return Err(corrupted(&child, "unexpected depth of child"));
        }
        if child.leaved < child.arrived || child.leaved >= parent.leaved {
            return Err(corrupted(&child, "child interval not nested in parent"));
        }

        cursor = child.leaved + 1;
        if !f(child) {
            break;
        }
    }

    Ok(())
}

/// Returns the direct children of `parent`, skipping the first `offset` and
/// returning at most `limit`.
#[instrument(skip(store, parent), fields(parent.arrived = parent.arrived), err)]
pub async fn children<S>(
    store: &S,
    parent: &NodeRecord,
    offset: usize,
    limit: usize,
) -> Result<Vec<NodeRecord>, Error>
where
    S: TreeStore + ?Sized,
{
    let mut page = Vec::new();
    if limit == 0 {
        return Ok(page);
    }

    let mut skipped = 0;
    for_each_child(store, parent, |child| {
        if skipped < offset {
            skipped += 1;
        } else {
            page.push(child);
        }
        page.len() < limit
    })
    .await?;

    Ok(page)
}

/// Counts the direct children of `parent`.
#[instrument(skip(store, parent), fields(parent.arrived = parent.arrived), err)]
pub async fn child_count<S>(store: &S, parent: &NodeRecord) -> Result<u64, Error>
where
    S: TreeStore + ?Sized,
{
    let mut count = 0;
    for_each_child(store, parent, |_| {
        count += 1;
        true
    })
    .await?;

    Ok(count)
}

/// Returns the records of the subtree below `node` (including it), in
/// pre-order, down to `max_depth` levels below it. [None] means all of them.
#[instrument(skip(store, node), fields(node.arrived = node.arrived), err)]
pub async fn subtree<S>(
    store: &S,
    node: &NodeRecord,
    max_depth: Option<u32>,
) -> Result<Vec<NodeRecord>, Error>
where
    S: TreeStore + ?Sized,
{
    let depth_limit = max_depth.map(|r| node.depth.saturating_add(r));
    let leaved = node.leaved;

    store
        .range(&node.tree_id(), node.arrived, node.leaved)
        .try_filter(|record| {
            let keep = record.leaved <= leaved && depth_limit.map_or(true, |d| record.depth <= d);
            futures::future::ready(keep)
        })
        .try_collect()
        .await
}

/// Returns the record of the parent of `node`, or [None] for the root.
///
/// There is no link to the parent stored, so this descends from the root,
/// each level picking the child whose interval contains `node`.
#[instrument(skip(store, node), fields(node.arrived = node.arrived), err)]
pub async fn parent<S>(store: &S, node: &NodeRecord) -> Result<Option<NodeRecord>, Error>
where
    S: TreeStore + ?Sized,
{
    if node.depth == 0 {
        return Ok(None);
    }

    let tree = node.tree_id();
    let mut current = root(store, &tree)
        .await?
        .ok_or_else(|| corrupted(node, "tree has no root"))?;

    loop {
        let mut next = None;
        for_each_child(store, &current, |child| {
            if child.contains(node) {
                next = Some(child);
                false
            } else {
                true
            }
        })
        .await?;

        match next {
            Some(child) if child.arrived == node.arrived => return Ok(Some(current)),
            Some(child) if child.depth < node.depth => current = child,
            _ => return Err(corrupted(node, "node is not reachable from the root")),
        }
    }
}

/// Rebuilds the node tree from the records of a subtree in pre-order, as
/// returned by [subtree]. The first record becomes the returned root.
pub fn assemble(records: impl IntoIterator<Item = NodeRecord>) -> Result<Node, Error> {
    // the records whose subtree is still being filled, the root at the bottom
    let mut stack: Vec<(NodeRecord, Node)> = Vec::new();

    for record in records {
        while let Some((top, _)) = stack.last() {
            if top.contains(&record) {
                break;
            }
            if stack.len() == 1 {
                return Err(corrupted(&record, "record outside of the subtree"));
            }
            close_top(&mut stack)?;
        }

        if let Some((top, _)) = stack.last() {
            if record.depth != top.depth + 1 || record.arrived <= top.arrived {
                return Err(corrupted(&record, "record does not follow its parent"));
            }
        }

        let node = record.to_node()?;
        stack.push((record, node));
    }

    while stack.len() > 1 {
        close_top(&mut stack)?;
    }

    stack
        .pop()
        .map(|(_, node)| node)
        .ok_or_else(|| Error::StorageError("no records to assemble a tree from".to_string()))
}

/// Pops the topmost node and attaches it to the one below.
fn close_top(stack: &mut Vec<(NodeRecord, Node)>) -> Result<(), Error> {
    if let Some((record, node)) = stack.pop() {
        if let Some((_, parent)) = stack.last_mut() {
            parent
                .add_child(node)
                .map_err(|_| corrupted(&record, "record below a file"))?;
        }
    }
    Ok(())
}
