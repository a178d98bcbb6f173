//! Persistence of indexed trees, and the range queries answered on top of it.
use futures::stream::BoxStream;

use async_trait::async_trait;

use crate::nodes::{DigitalObjectId, Node};
use crate::proto::NodeRecord;
use crate::{Error, NodeId, TreeId};

mod bulk;
mod from_addr;
mod keys;
mod memory;
mod query;
mod redb;
mod sled;
#[cfg(test)]
pub mod tests;

pub use self::bulk::BulkLoader;
pub use self::from_addr::from_addr;
pub use self::memory::MemoryTreeStore;
pub use self::query::{assemble, child_count, children, parent, resolve, root, subtree};
pub use self::redb::RedbTreeStore;
pub use self::sled::SledTreeStore;

/// The primitives all tree store backends need to implement.
///
/// A backend is an ordered map from (digital object, view, `arrived`) to
/// [NodeRecord], plus a counter per tree handing out generations.
/// All tree shaped queries, like [children] and [subtree], are built on top
/// of these.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Looks up the record at position `arrived` of the tree.
    /// In case there is none, Ok(None) is returned.
    async fn get(&self, tree: &TreeId, arrived: u64) -> Result<Option<NodeRecord>, Error>;

    /// Returns the record with the lowest `arrived` in `from..=to`, if any.
    async fn seek(&self, tree: &TreeId, from: u64, to: u64) -> Result<Option<NodeRecord>, Error>;

    /// Returns all records with `arrived` in `from..=to`, ascending by
    /// `arrived`. An empty range produces an empty stream.
    fn range(
        &self,
        tree: &TreeId,
        from: u64,
        to: u64,
    ) -> BoxStream<'static, Result<NodeRecord, Error>>;

    /// Writes all records in one atomic batch.
    /// Existing records at the same position are overwritten.
    async fn put_batch(&self, records: Vec<NodeRecord>) -> Result<(), Error>;

    /// Writes the first batch of a new tree. Checking that the tree has no
    /// root yet and writing the batch happen atomically, so of two
    /// concurrent creates of the same tree only one gets through.
    /// Fails with [Error::AlreadyExists] if there is a root, leaving the
    /// store untouched.
    async fn put_first_batch(
        &self,
        tree: &TreeId,
        records: Vec<NodeRecord>,
    ) -> Result<(), Error>;

    /// Atomically replaces the content of the record the handle points to,
    /// see [NodeRecord::update_content]. Fails with [Error::InvalidHandle]
    /// if there is no record with the handle's position and version.
    async fn update(&self, node_id: &NodeId, content: &Node) -> Result<NodeRecord, Error>;

    /// Removes all records of a tree, returning how many were removed.
    /// The tree generation is kept.
    async fn delete_tree(&self, tree: &TreeId) -> Result<u64, Error>;

    /// Removes all records of a digital object, over all views.
    async fn delete_all(&self, digital_object_id: &DigitalObjectId) -> Result<u64, Error>;

    /// Returns the distinct views having records for the digital object,
    /// in key order.
    async fn views(&self, digital_object_id: &DigitalObjectId) -> Result<Vec<String>, Error>;

    /// Increments the generation of the tree and returns the new value.
    /// The first call for a tree returns 1.
    async fn next_generation(&self, tree: &TreeId) -> Result<u32, Error>;
}

#[async_trait]
impl<A> TreeStore for A
where
    A: AsRef<dyn TreeStore> + Send + Sync,
{
    async fn get(&self, tree: &TreeId, arrived: u64) -> Result<Option<NodeRecord>, Error> {
        self.as_ref().get(tree, arrived).await
    }

    async fn seek(&self, tree: &TreeId, from: u64, to: u64) -> Result<Option<NodeRecord>, Error> {
        self.as_ref().seek(tree, from, to).await
    }

    fn range(
        &self,
        tree: &TreeId,
        from: u64,
        to: u64,
    ) -> BoxStream<'static, Result<NodeRecord, Error>> {
        self.as_ref().range(tree, from, to)
    }

    async fn put_batch(&self, records: Vec<NodeRecord>) -> Result<(), Error> {
        self.as_ref().put_batch(records).await
    }

    async fn put_first_batch(
        &self,
        tree: &TreeId,
        records: Vec<NodeRecord>,
    ) -> Result<(), Error> {
        self.as_ref().put_first_batch(tree, records).await
    }

    async fn update(&self, node_id: &NodeId, content: &Node) -> Result<NodeRecord, Error> {
        self.as_ref().update(node_id, content).await
    }

    async fn delete_tree(&self, tree: &TreeId) -> Result<u64, Error> {
        self.as_ref().delete_tree(tree).await
    }

    async fn delete_all(&self, digital_object_id: &DigitalObjectId) -> Result<u64, Error> {
        self.as_ref().delete_all(digital_object_id).await
    }

    async fn views(&self, digital_object_id: &DigitalObjectId) -> Result<Vec<String>, Error> {
        self.as_ref().views(digital_object_id).await
    }

    async fn next_generation(&self, tree: &TreeId) -> Result<u32, Error> {
        self.as_ref().next_generation(tree).await
    }
}

/// Applies a content update to the record found at the handle's position.
/// Shared by the backends, which take care of doing lookup and write
/// atomically.
fn updated_record(
    stored: Option<NodeRecord>,
    node_id: &NodeId,
    content: &Node,
) -> Result<NodeRecord, Error> {
    match stored {
        Some(mut record) if record.version == node_id.version() => {
            record.update_content(content)?;
            Ok(record)
        }
        _ => Err(Error::InvalidHandle(node_id.clone())),
    }
}

pub(crate) fn already_exists(tree: &TreeId) -> Error {
    Error::AlreadyExists {
        digital_object_id: tree.digital_object_id().clone(),
        view: tree.view().to_string(),
    }
}
