use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;

use super::keys::{key_of, next_generation, object_prefix, record_key, tree_prefix, view_of};
use super::{already_exists, updated_record, TreeStore};
use crate::nodes::{DigitalObjectId, Node};
use crate::proto::NodeRecord;
use crate::{Error, NodeId, TreeId};

#[derive(Clone, Default)]
pub struct MemoryTreeStore {
    db: Arc<RwLock<Db>>,
}

#[derive(Default)]
struct Db {
    records: BTreeMap<Vec<u8>, NodeRecord>,
    generations: HashMap<Vec<u8>, u32>,
}

impl Db {
    /// All keys below the given prefix.
    fn keys_below(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        self.records
            .range(prefix.to_vec()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn remove_all(&mut self, keys: Vec<Vec<u8>>) -> u64 {
        keys.iter()
            .filter(|k| self.records.remove(k.as_slice()).is_some())
            .count() as u64
    }
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    #[instrument(skip(self, tree), fields(tree = %tree))]
    async fn get(&self, tree: &TreeId, arrived: u64) -> Result<Option<NodeRecord>, Error> {
        Ok(self.db.read().records.get(&record_key(tree, arrived)).cloned())
    }

    #[instrument(skip(self, tree), fields(tree = %tree))]
    async fn seek(&self, tree: &TreeId, from: u64, to: u64) -> Result<Option<NodeRecord>, Error> {
        if from > to {
            return Ok(None);
        }

        let db = self.db.read();
        Ok(db
            .records
            .range(record_key(tree, from)..=record_key(tree, to))
            .next()
            .map(|(_, record)| record.clone()))
    }

    #[instrument(skip(self, tree), fields(tree = %tree))]
    fn range(
        &self,
        tree: &TreeId,
        from: u64,
        to: u64,
    ) -> BoxStream<'static, Result<NodeRecord, Error>> {
        if from > to {
            return stream::empty().boxed();
        }

        let records: Vec<_> = self
            .db
            .read()
            .records
            .range(record_key(tree, from)..=record_key(tree, to))
            .map(|(_, record)| Ok(record.clone()))
            .collect();

        stream::iter(records).boxed()
    }

    #[instrument(skip_all, fields(batch.len = records.len()))]
    async fn put_batch(&self, records: Vec<NodeRecord>) -> Result<(), Error> {
        let mut db = self.db.write();
        for record in records {
            db.records.insert(key_of(&record), record);
        }
        Ok(())
    }

    #[instrument(skip(self, tree, records), fields(tree = %tree, batch.len = records.len()))]
    async fn put_first_batch(
        &self,
        tree: &TreeId,
        records: Vec<NodeRecord>,
    ) -> Result<(), Error> {
        let mut db = self.db.write();
        if db.records.contains_key(&record_key(tree, 0)) {
            return Err(already_exists(tree));
        }
        for record in records {
            db.records.insert(key_of(&record), record);
        }
        Ok(())
    }

    #[instrument(skip(self, node_id, content), fields(node_id = %node_id))]
    async fn update(&self, node_id: &NodeId, content: &Node) -> Result<NodeRecord, Error> {
        let key = record_key(&node_id.tree_id(), node_id.in_tree_id());

        let mut db = self.db.write();
        let record = updated_record(db.records.get(&key).cloned(), node_id, content)?;
        db.records.insert(key, record.clone());

        Ok(record)
    }

    #[instrument(skip(self, tree), fields(tree = %tree))]
    async fn delete_tree(&self, tree: &TreeId) -> Result<u64, Error> {
        let mut db = self.db.write();
        let keys = db.keys_below(&tree_prefix(tree));
        Ok(db.remove_all(keys))
    }

    #[instrument(skip(self, digital_object_id), fields(digital_object_id = %digital_object_id))]
    async fn delete_all(&self, digital_object_id: &DigitalObjectId) -> Result<u64, Error> {
        let mut db = self.db.write();
        let keys = db.keys_below(&object_prefix(digital_object_id));
        Ok(db.remove_all(keys))
    }

    #[instrument(skip(self, digital_object_id), fields(digital_object_id = %digital_object_id))]
    async fn views(&self, digital_object_id: &DigitalObjectId) -> Result<Vec<String>, Error> {
        let prefix = object_prefix(digital_object_id);
        let db = self.db.read();

        let mut views: Vec<String> = Vec::new();
        for key in db.keys_below(&prefix) {
            let view = view_of(&key, &prefix)?;
            if views.last() != Some(&view) {
                views.push(view);
            }
        }
        Ok(views)
    }

    #[instrument(skip(self, tree), fields(tree = %tree))]
    async fn next_generation(&self, tree: &TreeId) -> Result<u32, Error> {
        let mut db = self.db.write();
        let generation = db.generations.entry(tree_prefix(tree)).or_default();
        *generation = next_generation(*generation)?;
        Ok(*generation)
    }
}
