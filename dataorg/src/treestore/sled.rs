use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use prost::Message;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use std::path::Path;
use tracing::{instrument, warn};

use super::keys::{
    decode_generation, key_of, next_generation, object_prefix, record_key, tree_prefix, view_of,
};
use super::{already_exists, updated_record, TreeStore};
use crate::nodes::{DigitalObjectId, Node};
use crate::proto::NodeRecord;
use crate::{Error, NodeId, TreeId};

/// Stores records in a sled tree, and generations in a second one.
#[derive(Clone)]
pub struct SledTreeStore {
    records: sled::Tree,
    generations: sled::Tree,
}

impl SledTreeStore {
    pub fn new<P: AsRef<Path>>(p: P) -> Result<Self, sled::Error> {
        let config = sled::Config::default()
            .use_compression(false) // is a required parameter
            .path(p);

        Self::open(config)
    }

    pub fn new_temporary() -> Result<Self, sled::Error> {
        Self::open(sled::Config::default().temporary(true))
    }

    fn open(config: sled::Config) -> Result<Self, sled::Error> {
        let db = config.open()?;

        Ok(Self {
            records: db.open_tree("records")?,
            generations: db.open_tree("generations")?,
        })
    }

    fn decode(data: &[u8]) -> Result<NodeRecord, Error> {
        NodeRecord::decode(data).map_err(|e| {
            warn!(err=%e, "unable to parse node record");
            Error::from(e)
        })
    }

    /// Removes everything below the prefix in one batch.
    fn remove_below(&self, prefix: &[u8]) -> Result<u64, Error> {
        let mut batch = sled::Batch::default();
        let mut removed = 0;
        for key in self.records.scan_prefix(prefix).keys() {
            batch.remove(key?);
            removed += 1;
        }

        self.records
            .apply_batch(batch)
            .map_err(|e| Error::StorageError(format!("unable to apply batch: {}", e)))?;

        Ok(removed)
    }
}

#[async_trait]
impl TreeStore for SledTreeStore {
    #[instrument(skip(self, tree), fields(tree = %tree))]
    async fn get(&self, tree: &TreeId, arrived: u64) -> Result<Option<NodeRecord>, Error> {
        match self.records.get(record_key(tree, arrived))? {
            None => Ok(None),
            Some(data) => Ok(Some(Self::decode(&data)?)),
        }
    }

    #[instrument(skip(self, tree), fields(tree = %tree))]
    async fn seek(&self, tree: &TreeId, from: u64, to: u64) -> Result<Option<NodeRecord>, Error> {
        if from > to {
            return Ok(None);
        }

        match self
            .records
            .range(record_key(tree, from)..=record_key(tree, to))
            .next()
        {
            None => Ok(None),
            Some(entry) => Ok(Some(Self::decode(&entry?.1)?)),
        }
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

        // sled iterators own their tree, so this is read lazily.
        let iter = self
            .records
            .range(record_key(tree, from)..=record_key(tree, to))
            .values()
            .map(|data| Self::decode(&data?));

        stream::iter(iter).boxed()
    }

    #[instrument(skip_all, fields(batch.len = records.len()))]
    async fn put_batch(&self, records: Vec<NodeRecord>) -> Result<(), Error> {
        let mut batch = sled::Batch::default();
        for record in records {
            batch.insert(key_of(&record), record.encode_to_vec());
        }

        self.records
            .apply_batch(batch)
            .map_err(|e| Error::StorageError(format!("unable to apply batch: {}", e)))
    }

    #[instrument(skip(self, tree, records), fields(tree = %tree, batch.len = records.len()))]
    async fn put_first_batch(
        &self,
        tree: &TreeId,
        records: Vec<NodeRecord>,
    ) -> Result<(), Error> {
        let root_key = record_key(tree, 0);
        // the transaction closure may run more than once
        let entries: Vec<(Vec<u8>, Vec<u8>)> = records
            .iter()
            .map(|record| (key_of(record), record.encode_to_vec()))
            .collect();

        self.records
            .transaction(|tx| -> ConflictableTransactionResult<(), Error> {
                if tx.get(&root_key)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(already_exists(tree)));
                }
                for (key, data) in &entries {
                    tx.insert(key.as_slice(), data.as_slice())?;
                }
                Ok(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => e.into(),
            })
    }

    #[instrument(skip(self, node_id, content), fields(node_id = %node_id))]
    async fn update(&self, node_id: &NodeId, content: &Node) -> Result<NodeRecord, Error> {
        let key = record_key(&node_id.tree_id(), node_id.in_tree_id());

        self.records
            .transaction(|tx| -> ConflictableTransactionResult<NodeRecord, Error> {
                let stored = match tx.get(&key)? {
                    None => None,
                    Some(data) => {
                        Some(Self::decode(&data).map_err(ConflictableTransactionError::Abort)?)
                    }
                };

                let record = updated_record(stored, node_id, content)
                    .map_err(ConflictableTransactionError::Abort)?;
                tx.insert(key.as_slice(), record.encode_to_vec())?;

                Ok(record)
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => e.into(),
            })
    }

    #[instrument(skip(self, tree), fields(tree = %tree))]
    async fn delete_tree(&self, tree: &TreeId) -> Result<u64, Error> {
        self.remove_below(&tree_prefix(tree))
    }

    #[instrument(skip(self, digital_object_id), fields(digital_object_id = %digital_object_id))]
    async fn delete_all(&self, digital_object_id: &DigitalObjectId) -> Result<u64, Error> {
        self.remove_below(&object_prefix(digital_object_id))
    }

    #[instrument(skip(self, digital_object_id), fields(digital_object_id = %digital_object_id))]
    async fn views(&self, digital_object_id: &DigitalObjectId) -> Result<Vec<String>, Error> {
        let prefix = object_prefix(digital_object_id);

        let mut views: Vec<String> = Vec::new();
        for key in self.records.scan_prefix(&prefix).keys() {
            let view = view_of(&key?, &prefix)?;
            if views.last() != Some(&view) {
                views.push(view);
            }
        }
        Ok(views)
    }

    #[instrument(skip(self, tree), fields(tree = %tree))]
    async fn next_generation(&self, tree: &TreeId) -> Result<u32, Error> {
        // update_and_fetch can't fail from within, so the outcome is kept aside.
        let mut outcome = Ok(0);
        self.generations.update_and_fetch(tree_prefix(tree), |old| {
            outcome = old
                .map(decode_generation)
                .unwrap_or(Ok(0))
                .and_then(next_generation);

            match &outcome {
                Ok(generation) => Some(generation.to_be_bytes().to_vec()),
                // leave the stored value alone
                Err(_) => old.map(|data| data.to_vec()),
            }
        })?;

        outcome
    }
}
