//! Assigns every node of an in-memory tree its position, so that tree-shaped
//! queries can be answered by comparing integers.
//!
//! A single counter is walked through the tree depth-first. A node takes the
//! next value when it is entered (`arrived`). Once all of its children have
//! been processed, it takes the next value again (`leaved`). Nodes without
//! children are entered and left in one step and get `leaved == arrived`.
//!
//! This results in nested intervals: for every descendant `d` of `n`,
//! `n.arrived <= d.arrived <= d.leaved <= n.leaved`.
use tracing::instrument;

use crate::nodes::{FileTree, Node};
use crate::proto::NodeRecord;
use crate::{Error, TreeId};

/// The position of a node inside its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub arrived: u64,
    pub leaved: u64,
    pub depth: u32,
}

/// Walks the tree below `root` and returns every node together with its
/// position, in pre-order (ascending `arrived`).
pub fn assign_positions(root: &Node) -> Result<Vec<(&Node, Position)>, Error> {
    let mut counter = 0u64;
    let mut out: Vec<(&Node, Position)> = Vec::with_capacity(root.count_nodes());

    let arrived = next(&mut counter)?;
    out.push((
        root,
        Position {
            arrived,
            leaved: arrived,
            depth: 0,
        },
    ));

    // index into `out`, and the index of the next child to enter
    let mut stack: Vec<(usize, usize)> = vec![(0, 0)];

    while let Some(&(idx, next_child)) = stack.last() {
        let (node, position) = out[idx];

        match node.children().get(next_child) {
            Some(child) => {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }

                let depth = position.depth.checked_add(1).ok_or_else(|| {
                    Error::MalformedInput("tree is too deep to be indexed".to_string())
                })?;
                let arrived = next(&mut counter)?;

                out.push((
                    child,
                    Position {
                        arrived,
                        leaved: arrived,
                        depth,
                    },
                ));
                stack.push((out.len() - 1, 0));
            }
            None => {
                stack.pop();
                if !node.children().is_empty() {
                    out[idx].1.leaved = next(&mut counter)?;
                }
            }
        }
    }

    Ok(out)
}

fn next(counter: &mut u64) -> Result<u64, Error> {
    let value = *counter;
    *counter = counter
        .checked_add(1)
        .ok_or_else(|| Error::MalformedInput("tree has too many nodes".to_string()))?;
    Ok(value)
}

/// Turns a whole tree into the flat records to persist, ordered by `arrived`.
/// The records carry version 0, the caller sets the tree generation.
#[instrument(skip_all, fields(tree.digital_object_id = %tree.digital_object_id(), tree.view = tree.view()), err)]
pub fn index_tree(tree: &FileTree) -> Result<Vec<NodeRecord>, Error> {
    if tree.digital_object_id().as_str().is_empty() {
        return Err(Error::MalformedInput(
            "digital object id must not be empty".to_string(),
        ));
    }
    if tree.view().is_empty() {
        return Err(Error::MalformedInput(
            "view name must not be empty".to_string(),
        ));
    }

    let tree_id = TreeId::new(tree.digital_object_id().clone(), tree.view());

    Ok(assign_positions(tree.root())?
        .into_iter()
        .map(|(node, p)| NodeRecord::from_node(&tree_id, node, p.arrived, p.leaved, p.depth))
        .collect())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{assign_positions, index_tree, Position};
    use crate::builder::TreeBuilder;
    use crate::fixtures::{SCENARIO_ROOT, WIDE_ROOT};
    use crate::nodes::{FileTree, Node};
    use crate::Error;

    fn positions(root: &Node) -> Vec<(String, u64, u64, u32)> {
        assign_positions(root)
            .unwrap()
            .into_iter()
            .map(|(n, p)| (n.name().unwrap().to_string(), p.arrived, p.leaved, p.depth))
            .collect()
    }

    #[test]
    fn scenario_numbering() {
        assert_eq!(
            vec![
                ("R".to_string(), 0, 5, 0),
                ("a.txt".to_string(), 1, 1, 1),
                ("sub".to_string(), 2, 4, 1),
                ("b.txt".to_string(), 3, 3, 2),
            ],
            positions(&SCENARIO_ROOT)
        );
    }

    #[test]
    fn single_node() {
        let root = Node::file("lonely", "lfn://x");
        assert_eq!(
            vec![(
                &root,
                Position {
                    arrived: 0,
                    leaved: 0,
                    depth: 0
                }
            )],
            assign_positions(&root).unwrap()
        );
    }

    #[test]
    fn empty_collection_is_a_leaf() {
        let mut root = Node::collection("R");
        root.add_child(Node::collection("empty")).unwrap();
        root.add_child(Node::file("f", "lfn://f")).unwrap();

        assert_eq!(
            vec![
                ("R".to_string(), 0, 3, 0),
                ("empty".to_string(), 1, 1, 1),
                ("f".to_string(), 2, 2, 1),
            ],
            positions(&root)
        );
    }

    /// Checks the nested-interval invariant on a bigger tree, by comparing
    /// against the ancestors recorded during a plain recursive walk.
    #[test]
    fn nested_intervals() {
        let positioned = assign_positions(&WIDE_ROOT).unwrap();
        assert_eq!(WIDE_ROOT.count_nodes(), positioned.len());

        // arrived is strictly increasing in the returned order
        for w in positioned.windows(2) {
            assert!(w[0].1.arrived < w[1].1.arrived);
        }

        for (i, (node, p)) in positioned.iter().enumerate() {
            assert!(p.leaved >= p.arrived);
            let descendants = node.count_nodes() - 1;
            // the descendants are exactly the next entries in pre-order
            for (_, d) in &positioned[i + 1..=i + descendants] {
                assert!(p.arrived <= d.arrived && d.leaved <= p.leaved);
                assert!(d.depth > p.depth);
            }
            // and nothing after them is contained
            for (_, o) in &positioned[i + 1 + descendants..] {
                assert!(!(p.arrived <= o.arrived && o.leaved <= p.leaved));
            }
        }
    }

    #[test]
    fn index_tree_rejects_empty_identifiers() {
        let tree = FileTree::new("", SCENARIO_ROOT.clone());
        assert!(matches!(index_tree(&tree), Err(Error::MalformedInput(_))));

        let tree = FileTree::with_view("obj-1", "", SCENARIO_ROOT.clone());
        assert!(matches!(index_tree(&tree), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn index_tree_records() {
        let tree = FileTree::with_view("obj-1", "custom", SCENARIO_ROOT.clone());
        let records = index_tree(&tree).unwrap();

        assert_eq!(4, records.len());
        assert!(records
            .iter()
            .all(|r| r.digital_object_id == "obj-1" && r.view == "custom" && r.version == 0));
        assert_eq!(
            vec![0, 1, 2, 3],
            records.iter().map(|r| r.arrived).collect::<Vec<_>>()
        );
    }

    /// Deep trees are indexed without running out of stack.
    #[test]
    fn deep_chain() {
        const DEPTH: u64 = 200_000;

        let mut builder = TreeBuilder::create("deep");
        for i in 0..DEPTH {
            builder = builder.create_and_enter_collection(format!("level-{}", i));
        }
        let tree = builder.build_tree("obj-deep", "default");

        let records = index_tree(&tree).unwrap();
        assert_eq!(DEPTH as usize + 1, records.len());

        // the innermost collection is empty, so it is a leaf. Every level
        // above it takes one more value when left.
        let innermost = records.last().unwrap();
        assert_eq!(
            (DEPTH, DEPTH, DEPTH as u32),
            (innermost.arrived, innermost.leaved, innermost.depth)
        );
        assert_eq!(2 * DEPTH, records[0].leaved);
        assert_eq!(2 * DEPTH - 1, records[1].leaved);
    }
}
