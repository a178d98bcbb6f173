use serde::{Deserialize, Serialize};
use std::fmt;

use crate::nodes::{DigitalObjectId, DEFAULT_VIEW};

/// Addresses one tree: a digital object in one of its views.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId {
    digital_object_id: DigitalObjectId,
    view: String,
}

impl TreeId {
    pub fn new(digital_object_id: DigitalObjectId, view: impl Into<String>) -> Self {
        Self {
            digital_object_id,
            view: view.into(),
        }
    }

    /// The tree of the digital object in the [DEFAULT_VIEW].
    pub fn default_view(digital_object_id: DigitalObjectId) -> Self {
        Self::new(digital_object_id, DEFAULT_VIEW)
    }

    pub fn digital_object_id(&self) -> &DigitalObjectId {
        &self.digital_object_id
    }

    pub fn view(&self) -> &str {
        &self.view
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.digital_object_id, self.view)
    }
}

/// A detached handle to a node of a persisted tree.
///
/// It is a lookup key, not a reference: the node is looked up by its
/// pre-order number in the tree and the tree generation it has been handed
/// out for. Once the tree is deleted and created again, the generation
/// differs and the handle no longer resolves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    digital_object_id: DigitalObjectId,
    in_tree_id: u64,
    version: u32,
    view: String,
}

impl NodeId {
    pub fn new(
        digital_object_id: DigitalObjectId,
        in_tree_id: u64,
        version: u32,
        view: impl Into<String>,
    ) -> Self {
        Self {
            digital_object_id,
            in_tree_id,
            version,
            view: view.into(),
        }
    }

    pub fn digital_object_id(&self) -> &DigitalObjectId {
        &self.digital_object_id
    }

    /// The pre-order number of the node at the time the handle was issued.
    pub fn in_tree_id(&self) -> u64 {
        self.in_tree_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    pub fn tree_id(&self) -> TreeId {
        TreeId::new(self.digital_object_id.clone(), self.view.clone())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}@{}",
            self.digital_object_id, self.view, self.in_tree_id, self.version
        )
    }
}
