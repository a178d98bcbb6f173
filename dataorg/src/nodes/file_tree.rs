use serde::{Deserialize, Serialize};
use std::fmt;

use super::Node;

/// The view every call uses when no view name is given.
pub const DEFAULT_VIEW: &str = "default";

/// View names the system keeps for itself.
const RESERVED_VIEWS: [&str; 3] = [DEFAULT_VIEW, "data", "generated"];

/// Returns true if the view name is one of the names reserved by the system,
/// and thus should not be picked for a custom view.
pub fn is_reserved_view_name(name: &str) -> bool {
    RESERVED_VIEWS.contains(&name)
}

/// Identifies the dataset a tree describes. Several trees (one per view) may
/// share the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigitalObjectId(String);

impl DigitalObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DigitalObjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DigitalObjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for DigitalObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A whole tree: its root node together with the digital object and view it
/// belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTree {
    digital_object_id: DigitalObjectId,
    #[serde(default = "default_view")]
    view: String,
    root: Node,
}

fn default_view() -> String {
    DEFAULT_VIEW.to_string()
}

impl FileTree {
    /// Creates a tree in the [DEFAULT_VIEW].
    pub fn new(digital_object_id: impl Into<DigitalObjectId>, root: Node) -> Self {
        Self::with_view(digital_object_id, DEFAULT_VIEW, root)
    }

    pub fn with_view(
        digital_object_id: impl Into<DigitalObjectId>,
        view: impl Into<String>,
        root: Node,
    ) -> Self {
        Self {
            digital_object_id: digital_object_id.into(),
            view: view.into(),
            root,
        }
    }

    pub fn digital_object_id(&self) -> &DigitalObjectId {
        &self.digital_object_id
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    pub fn into_root(self) -> Node {
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_view_names() {
        assert!(is_reserved_view_name("default"));
        assert!(is_reserved_view_name("data"));
        assert!(is_reserved_view_name("generated"));
        assert!(!is_reserved_view_name("custom"));
        assert!(!is_reserved_view_name("Default"));
    }

    #[test]
    fn view_defaults_when_deserializing() {
        let tree: FileTree = serde_json::from_value(serde_json::json!({
            "digital_object_id": "obj-1",
            "root": { "type": "collection", "name": "R" }
        }))
        .expect("must deserialize");

        assert_eq!(DEFAULT_VIEW, tree.view());
        assert_eq!(Some("R"), tree.root().name());
    }
}
