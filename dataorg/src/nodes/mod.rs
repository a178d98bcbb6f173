//! This holds the in-memory types of a data organization tree.
mod attribute;
mod file_tree;
mod logical_file_name;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use attribute::Attribute;
pub use file_tree::{is_reserved_view_name, DigitalObjectId, FileTree, DEFAULT_VIEW};
pub use logical_file_name::LogicalFileName;

use crate::proto::NodeKind;
use crate::Error;

/// A node of a data organization tree: a collection or a file.
///
/// Nodes own their children, a tree is therefore always acyclic.
/// Two nodes are equal if their name, description and attribute set are equal,
/// and their children (in order) or logical file names are.
///
/// Cloning, comparing and dropping walk the subtree with an explicit stack,
/// so arbitrarily deep trees can be handled.
#[derive(Debug, Serialize, Deserialize)]
pub struct Node {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    attributes: BTreeSet<Attribute>,
    #[serde(flatten)]
    node_type: NodeType,
}

/// The part of a [Node] that depends on its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeType {
    /// Holds an ordered list of children, which can be collections or files.
    Collection {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<Node>,
    },
    /// Refers to the data by its logical file name. Has no children.
    File {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        logical_file_name: Option<LogicalFileName>,
    },
}

impl Node {
    fn new(name: Option<String>, node_type: NodeType) -> Self {
        Self {
            name,
            description: None,
            attributes: BTreeSet::new(),
            node_type,
        }
    }

    /// Constructs a collection node without children.
    pub fn collection(name: impl Into<String>) -> Self {
        Self::new(
            Some(name.into()),
            NodeType::Collection {
                children: Vec::new(),
            },
        )
    }

    /// Constructs a collection node holding the given children.
    pub fn collection_with(
        name: impl Into<String>,
        children: impl IntoIterator<Item = Node>,
    ) -> Self {
        Self::new(
            Some(name.into()),
            NodeType::Collection {
                children: children.into_iter().collect(),
            },
        )
    }

    /// Constructs a file node pointing to the given logical file name.
    pub fn file(name: impl Into<String>, logical_file_name: impl Into<LogicalFileName>) -> Self {
        Self::new(
            Some(name.into()),
            NodeType::File {
                logical_file_name: Some(logical_file_name.into()),
            },
        )
    }

    /// Constructs a node of the given kind with no name and no content.
    pub fn empty(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Collection => Self::new(
                None,
                NodeType::Collection {
                    children: Vec::new(),
                },
            ),
            NodeKind::File => Self::new(
                None,
                NodeType::File {
                    logical_file_name: None,
                },
            ),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    /// Returns the node with the description set.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn attributes(&self) -> &BTreeSet<Attribute> {
        &self.attributes
    }

    /// Adds an attribute. Returns false if an equal attribute (same key and
    /// value) was already present, in which case nothing changed.
    pub fn add_attribute(&mut self, attribute: impl Into<Attribute>) -> bool {
        self.attributes.insert(attribute.into())
    }

    /// Returns the node with the attribute added.
    pub fn with_attribute(mut self, attribute: impl Into<Attribute>) -> Self {
        self.add_attribute(attribute);
        self
    }

    pub fn remove_attribute(&mut self, attribute: &Attribute) -> bool {
        self.attributes.remove(attribute)
    }

    /// Replaces the whole attribute set.
    pub fn set_attributes(&mut self, attributes: impl IntoIterator<Item = Attribute>) {
        self.attributes = attributes.into_iter().collect();
    }

    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    pub fn kind(&self) -> NodeKind {
        match self.node_type {
            NodeType::Collection { .. } => NodeKind::Collection,
            NodeType::File { .. } => NodeKind::File,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.node_type, NodeType::Collection { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self.node_type, NodeType::File { .. })
    }

    /// The children of a collection, in insertion order.
    /// Files have none.
    pub fn children(&self) -> &[Node] {
        match &self.node_type {
            NodeType::Collection { children } => children,
            NodeType::File { .. } => &[],
        }
    }

    /// Appends a child to a collection.
    pub fn add_child(&mut self, child: Node) -> Result<(), Error> {
        match &mut self.node_type {
            NodeType::Collection { children } => {
                children.push(child);
                Ok(())
            }
            NodeType::File { .. } => Err(Error::InvalidRequest(
                "file nodes can not have children".to_string(),
            )),
        }
    }

    /// Detaches the child at the given position and returns it.
    pub fn remove_child(&mut self, index: usize) -> Option<Node> {
        match &mut self.node_type {
            NodeType::Collection { children } if index < children.len() => {
                Some(children.remove(index))
            }
            _ => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match &mut self.node_type {
            NodeType::Collection { children } => Some(children),
            NodeType::File { .. } => None,
        }
    }

    pub fn logical_file_name(&self) -> Option<&LogicalFileName> {
        match &self.node_type {
            NodeType::File { logical_file_name } => logical_file_name.as_ref(),
            NodeType::Collection { .. } => None,
        }
    }

    pub fn set_logical_file_name(
        &mut self,
        value: Option<LogicalFileName>,
    ) -> Result<(), Error> {
        match &mut self.node_type {
            NodeType::File { logical_file_name } => {
                *logical_file_name = value;
                Ok(())
            }
            NodeType::Collection { .. } => Err(Error::InvalidRequest(
                "collection nodes have no logical file name".to_string(),
            )),
        }
    }

    /// Returns a copy of the node content, with the children left out.
    pub fn without_children(&self) -> Node {
        let node_type = match &self.node_type {
            NodeType::Collection { .. } => NodeType::Collection {
                children: Vec::new(),
            },
            NodeType::File { logical_file_name } => NodeType::File {
                logical_file_name: logical_file_name.clone(),
            },
        };

        Node {
            name: self.name.clone(),
            description: self.description.clone(),
            attributes: self.attributes.clone(),
            node_type,
        }
    }

    /// Number of nodes in this subtree, including this one.
    pub fn count_nodes(&self) -> usize {
        self.iter().count()
    }

    /// Visits the subtree depth-first, calling `pre` before and `post` after
    /// the children of a node are processed.
    pub fn walk<Pre, Post>(&self, mut pre: Pre, mut post: Post)
    where
        Pre: FnMut(&Node),
        Post: FnMut(&Node),
    {
        pre(self);
        // nodes entered, with their children not visited yet
        let mut stack = vec![(self, self.children().iter())];

        while let Some((node, remaining)) = stack.last_mut() {
            match remaining.next() {
                Some(child) => {
                    pre(child);
                    stack.push((child, child.children().iter()));
                }
                None => {
                    post(*node);
                    stack.pop();
                }
            }
        }
    }

    /// Iterates over the subtree in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children().iter().rev());
            Some(node)
        })
    }

    /// Returns the first node in pre-order carrying the given name.
    pub fn find_by_name(&self, name: &str) -> Option<&Node> {
        self.iter().find(|node| node.name() == Some(name))
    }

    /// Returns all nodes of the subtree whose name matches the regular
    /// expression, in pre-order.
    pub fn find_by_regex(&self, pattern: &str) -> Result<Vec<&Node>, Error> {
        let re = Regex::new(pattern)
            .map_err(|e| Error::InvalidRequest(format!("invalid pattern: {}", e)))?;

        Ok(self
            .iter()
            .filter(|node| node.name().is_some_and(|name| re.is_match(name)))
            .collect())
    }
}

impl Clone for Node {
    fn clone(&self) -> Self {
        // copies still receiving children, with the children left to copy
        let mut stack = vec![(self.without_children(), self.children().iter())];

        loop {
            let next = stack
                .last_mut()
                .and_then(|(_, remaining)| remaining.next());
            if let Some(child) = next {
                stack.push((child.without_children(), child.children().iter()));
                continue;
            }

            let Some((copy, _)) = stack.pop() else {
                return self.without_children();
            };
            match stack.last_mut().and_then(|(parent, _)| parent.children_mut()) {
                Some(children) => children.push(copy),
                None => return copy,
            }
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];

        while let Some((a, b)) = pending.pop() {
            if a.name != b.name || a.description != b.description || a.attributes != b.attributes
            {
                return false;
            }

            match (&a.node_type, &b.node_type) {
                (
                    NodeType::Collection { children: ours },
                    NodeType::Collection { children: theirs },
                ) => {
                    if ours.len() != theirs.len() {
                        return false;
                    }
                    pending.extend(ours.iter().zip(theirs.iter()));
                }
                (
                    NodeType::File {
                        logical_file_name: ours,
                    },
                    NodeType::File {
                        logical_file_name: theirs,
                    },
                ) => {
                    if ours != theirs {
                        return false;
                    }
                }
                _ => return false,
            }
        }

        true
    }
}

impl Eq for Node {}

impl Drop for Node {
    fn drop(&mut self) {
        // detach all descendants, so each one is dropped without children
        let Some(children) = self.children_mut() else {
            return;
        };
        let mut pending = std::mem::take(children);

        while let Some(mut node) = pending.pop() {
            if let Some(children) = node.children_mut() {
                pending.append(children);
            }
        }
    }
}
