#[cfg(test)]
use rstest_reuse;

mod errors;
mod node_id;

pub mod builder;
pub mod fixtures;
pub mod indexer;
pub mod nodes;
pub mod organizer;
pub mod proto;
pub mod treestore;

pub use errors::Error;
pub use node_id::{NodeId, TreeId};
pub use nodes::{
    is_reserved_view_name, Attribute, DigitalObjectId, FileTree, LogicalFileName, Node, NodeType,
    DEFAULT_VIEW,
};
pub use organizer::{DataOrganizer, NodeEntry};
