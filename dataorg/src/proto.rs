//! The flat record every tree node is persisted as.
//!
//! Records are protobuf messages, so the on-disk format of all backends is
//! the same and can be read by other tooling.
use std::collections::BTreeSet;

use crate::nodes::{Attribute, DigitalObjectId, LogicalFileName, Node, NodeType};
use crate::{Error, NodeId, TreeId};

/// The persisted form of a single node, carrying its position in the tree.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeRecord {
    #[prost(string, tag = "1")]
    pub digital_object_id: String,
    #[prost(string, tag = "2")]
    pub view: String,
    /// Pre-order number of the node, unique within a tree. The root has 0.
    #[prost(uint64, tag = "3")]
    pub arrived: u64,
    /// Number assigned once the whole subtree below the node was visited.
    /// All descendants have their `arrived` and `leaved` in
    /// `arrived..=leaved` of their ancestors.
    #[prost(uint64, tag = "4")]
    pub leaved: u64,
    /// Distance to the root.
    #[prost(uint32, tag = "5")]
    pub depth: u32,
    /// Generation of the tree this record has been written for.
    #[prost(uint32, tag = "6")]
    pub version: u32,
    #[prost(enumeration = "NodeKind", tag = "7")]
    pub kind: i32,
    #[prost(string, optional, tag = "8")]
    pub name: ::core::option::Option<String>,
    #[prost(string, optional, tag = "9")]
    pub description: ::core::option::Option<String>,
    /// Only set for files.
    #[prost(string, optional, tag = "10")]
    pub logical_file_name: ::core::option::Option<String>,
    #[prost(message, repeated, tag = "11")]
    pub attributes: Vec<AttributeRecord>,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct AttributeRecord {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum NodeKind {
    Collection = 0,
    File = 1,
}

impl From<&Attribute> for AttributeRecord {
    fn from(value: &Attribute) -> Self {
        Self {
            key: value.key().to_string(),
            value: value.value().to_string(),
        }
    }
}

impl From<&AttributeRecord> for Attribute {
    fn from(value: &AttributeRecord) -> Self {
        Attribute::new(value.key.clone(), value.value.clone())
    }
}

impl NodeRecord {
    /// Builds the record for a node at the given position.
    /// The version is left at 0, it's set once the tree generation is known.
    pub(crate) fn from_node(
        tree: &TreeId,
        node: &Node,
        arrived: u64,
        leaved: u64,
        depth: u32,
    ) -> Self {
        let mut record = Self {
            digital_object_id: tree.digital_object_id().to_string(),
            view: tree.view().to_string(),
            arrived,
            leaved,
            depth,
            version: 0,
            kind: node.kind() as i32,
            ..Default::default()
        };
        record.set_content(node);
        record
    }

    /// Returns the kind of the node, failing on unknown values.
    pub fn node_kind(&self) -> Result<NodeKind, Error> {
        NodeKind::try_from(self.kind).map_err(|_| {
            Error::StorageError(format!(
                "record {}:{}:{} has unknown node kind {}",
                self.digital_object_id, self.view, self.arrived, self.kind
            ))
        })
    }

    pub fn tree_id(&self) -> TreeId {
        TreeId::new(
            DigitalObjectId::new(self.digital_object_id.clone()),
            self.view.clone(),
        )
    }

    /// The handle that resolves to this record.
    pub fn node_id(&self) -> NodeId {
        NodeId::new(
            DigitalObjectId::new(self.digital_object_id.clone()),
            self.arrived,
            self.version,
            self.view.clone(),
        )
    }

    /// Returns true if `other` lies in the subtree of this record
    /// (this includes `other` being this very record).
    pub fn contains(&self, other: &NodeRecord) -> bool {
        self.arrived <= other.arrived && other.leaved <= self.leaved
    }

    /// Reconstructs the node content, without any children.
    pub fn to_node(&self) -> Result<Node, Error> {
        let mut node = Node::empty(self.node_kind()?);
        node.set_name(self.name.clone());
        node.set_description(self.description.clone());
        node.set_attributes(self.attributes.iter().map(Attribute::from));
        if node.is_file() {
            node.set_logical_file_name(
                self.logical_file_name.clone().map(LogicalFileName::from),
            )?;
        }
        Ok(node)
    }

    /// Overwrites name, description, logical file name and attributes with
    /// the ones from `content`. The position in the tree is left untouched.
    ///
    /// Attributes are reconciled: the ones not present in `content` are
    /// removed, the missing ones are appended, the others stay where they are.
    pub fn update_content(&mut self, content: &Node) -> Result<(), Error> {
        let stored = self.node_kind()?;
        if stored != content.kind() {
            return Err(Error::TypeMismatch {
                stored,
                replacement: content.kind(),
            });
        }

        self.set_content(content);
        Ok(())
    }

    fn set_content(&mut self, content: &Node) {
        self.name = content.name().map(str::to_string);
        self.description = content.description().map(str::to_string);
        if let NodeType::File { logical_file_name } = content.node_type() {
            self.logical_file_name = logical_file_name.clone().map(String::from);
        }

        let wanted = content.attributes();
        let mut kept = BTreeSet::new();
        self.attributes.retain(|a| {
            let attribute = Attribute::from(a);
            // retain only the first of duplicates
            wanted.contains(&attribute) && kept.insert(attribute)
        });
        for attribute in wanted.iter() {
            if !kept.contains(attribute) {
                self.attributes.push(attribute.into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AttributeRecord, NodeKind, NodeRecord};
    use crate::nodes::{Attribute, Node};
    use crate::{Error, TreeId};

    fn file_record() -> NodeRecord {
        let node = Node::file("a.txt", "lfn://a")
            .with_attribute(("k", "1"))
            .with_attribute(("k", "2"));
        NodeRecord::from_node(&TreeId::new("obj".into(), "default"), &node, 1, 1, 1)
    }

    #[test]
    fn content_roundtrip() {
        let record = file_record();
        let node = record.to_node().expect("must convert");

        assert_eq!(NodeKind::File, node.kind());
        assert_eq!(Some("a.txt"), node.name());
        assert_eq!(Some("lfn://a"), node.logical_file_name().map(|l| l.as_str()));
        assert_eq!(2, node.attributes().len());
    }

    #[test]
    fn update_reconciles_attributes() {
        let mut record = file_record();
        let replacement = Node::file("renamed", "lfn://b")
            .with_attribute(("k", "2"))
            .with_attribute(("new", "x"));

        record.update_content(&replacement).expect("must update");

        assert_eq!(Some("renamed"), record.name.as_deref());
        assert_eq!(Some("lfn://b"), record.logical_file_name.as_deref());
        assert_eq!(
            vec![
                AttributeRecord {
                    key: "k".into(),
                    value: "2".into()
                },
                AttributeRecord {
                    key: "new".into(),
                    value: "x".into()
                },
            ],
            record.attributes
        );
        // position is untouched
        assert_eq!((1, 1, 1), (record.arrived, record.leaved, record.depth));
    }

    #[test]
    fn update_rejects_other_kind() {
        let mut record = file_record();
        let before = record.clone();

        assert_eq!(
            Err(Error::TypeMismatch {
                stored: NodeKind::File,
                replacement: NodeKind::Collection
            }),
            record.update_content(&Node::collection("c"))
        );
        assert_eq!(before, record, "failed update must not modify the record");
    }

    #[test]
    fn unknown_kind_is_a_storage_error() {
        let mut record = file_record();
        record.kind = 42;
        assert!(matches!(record.to_node(), Err(Error::StorageError(_))));
    }

    #[test]
    fn attribute_conversion() {
        let attribute = Attribute::new("k", "v");
        assert_eq!(attribute, Attribute::from(&AttributeRecord::from(&attribute)));
    }
}
