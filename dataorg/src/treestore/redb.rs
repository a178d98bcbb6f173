use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use prost::Message;
use redb::{Database, ReadableTable, TableDefinition};
use std::{path::PathBuf, sync::Arc};
use tracing::{instrument, warn};

use super::keys::{key_of, next_generation, object_prefix, record_key, tree_prefix, view_of};
use super::{already_exists, updated_record, TreeStore};
use crate::nodes::{DigitalObjectId, Node};
use crate::proto::NodeRecord;
use crate::{Error, NodeId, TreeId};

const RECORDS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");
const GENERATIONS_TABLE: TableDefinition<&[u8], u32> = TableDefinition::new("generations");

#[derive(Clone)]
pub struct RedbTreeStore {
    // We wrap the db in an Arc to be able to move it into spawn_blocking,
    // as discussed in https://github.com/cberner/redb/issues/789
    db: Arc<Database>,
}

impl RedbTreeStore {
    /// Constructs a new instance using the specified filesystem path for
    /// storage.
    pub async fn new(path: PathBuf) -> Result<Self, Error> {
        if path == PathBuf::from("/") {
            return Err(Error::StorageError(
                "cowardly refusing to open / with redb".to_string(),
            ));
        }

        let db = tokio::task::spawn_blocking(|| -> Result<_, redb::Error> {
            let db = redb::Database::create(path)?;
            create_schema(&db)?;
            Ok(db)
        })
        .await??;

        Ok(Self { db: Arc::new(db) })
    }

    /// Constructs a new instance using the in-memory backend.
    pub fn new_temporary() -> Result<Self, Error> {
        let db =
            redb::Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;

        create_schema(&db)?;

        Ok(Self { db: Arc::new(db) })
    }
}

/// Ensures all tables are present.
fn create_schema(db: &redb::Database) -> Result<(), redb::Error> {
    let txn = db.begin_write()?;
    txn.open_table(RECORDS_TABLE)?;
    txn.open_table(GENERATIONS_TABLE)?;
    txn.commit()?;

    Ok(())
}

fn decode(data: &[u8]) -> Result<NodeRecord, Error> {
    NodeRecord::decode(data).map_err(|e| {
        warn!(err=%e, "failed to parse node record");
        Error::from(e)
    })
}

/// Collects the keys of all records below the prefix.
fn keys_below(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    prefix: &[u8],
) -> Result<Vec<Vec<u8>>, Error> {
    let mut keys = Vec::new();
    for entry in table.range(prefix..)? {
        let (key, _) = entry?;
        if !key.value().starts_with(prefix) {
            break;
        }
        keys.push(key.value().to_vec());
    }
    Ok(keys)
}

/// Removes all records below the prefix in one write transaction.
fn remove_below(db: &Database, prefix: &[u8]) -> Result<u64, Error> {
    let txn = db.begin_write()?;
    let removed = {
        let mut table = txn.open_table(RECORDS_TABLE)?;
        let keys = keys_below(&table, prefix)?;
        for key in &keys {
            table.remove(key.as_slice())?;
        }
        keys.len() as u64
    };
    txn.commit()?;

    Ok(removed)
}

#[async_trait]
impl TreeStore for RedbTreeStore {
    #[instrument(skip(self, tree), fields(tree = %tree))]
    async fn get(&self, tree: &TreeId, arrived: u64) -> Result<Option<NodeRecord>, Error> {
        let db = self.db.clone();
        let key = record_key(tree, arrived);

        tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let txn = db.begin_read()?;
            let table = txn.open_table(RECORDS_TABLE)?;

            let record = match table.get(key.as_slice())? {
                None => None,
                Some(data) => Some(decode(data.value())?),
            };
            Ok(record)
        })
        .await?
    }

    #[instrument(skip(self, tree), fields(tree = %tree))]
    async fn seek(&self, tree: &TreeId, from: u64, to: u64) -> Result<Option<NodeRecord>, Error> {
        if from > to {
            return Ok(None);
        }

        let db = self.db.clone();
        let (start, end) = (record_key(tree, from), record_key(tree, to));

        tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let txn = db.begin_read()?;
            let table = txn.open_table(RECORDS_TABLE)?;

            let record = match table.range(start.as_slice()..=end.as_slice())?.next() {
                None => None,
                Some(entry) => Some(decode(entry?.1.value())?),
            };
            Ok(record)
        })
        .await?
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

        let db = self.db.clone();
        let (start, end) = (record_key(tree, from), record_key(tree, to));

        // The whole range is read in a single read transaction.
        stream::once(async move {
            tokio::task::spawn_blocking(move || -> Result<_, Error> {
                let txn = db.begin_read()?;
                let table = txn.open_table(RECORDS_TABLE)?;

                let mut records: Vec<Result<NodeRecord, Error>> = Vec::new();
                for entry in table.range(start.as_slice()..=end.as_slice())? {
                    records.push(Ok(decode(entry?.1.value())?));
                }
                Ok(stream::iter(records))
            })
            .await?
        })
        .try_flatten()
        .boxed()
    }

    #[instrument(skip_all, fields(batch.len = records.len()))]
    async fn put_batch(&self, records: Vec<NodeRecord>) -> Result<(), Error> {
        tokio::task::spawn_blocking({
            let db = self.db.clone();
            move || -> Result<_, Error> {
                let txn = db.begin_write()?;
                {
                    let mut table = txn.open_table(RECORDS_TABLE)?;
                    for record in records {
                        let key = key_of(&record);
                        table.insert(key.as_slice(), record.encode_to_vec().as_slice())?;
                    }
                }
                txn.commit()?;

                Ok(())
            }
        })
        .await?
    }

    #[instrument(skip(self, tree, records), fields(tree = %tree, batch.len = records.len()))]
    async fn put_first_batch(
        &self,
        tree: &TreeId,
        records: Vec<NodeRecord>,
    ) -> Result<(), Error> {
        tokio::task::spawn_blocking({
            let db = self.db.clone();
            let tree = tree.clone();
            move || -> Result<_, Error> {
                let txn = db.begin_write()?;
                {
                    let mut table = txn.open_table(RECORDS_TABLE)?;
                    let root_key = record_key(&tree, 0);
                    // dropping txn without commit aborts it
                    if table.get(root_key.as_slice())?.is_some() {
                        return Err(already_exists(&tree));
                    }
                    for record in records {
                        let key = key_of(&record);
                        table.insert(key.as_slice(), record.encode_to_vec().as_slice())?;
                    }
                }
                txn.commit()?;

                Ok(())
            }
        })
        .await?
    }

    #[instrument(skip(self, node_id, content), fields(node_id = %node_id))]
    async fn update(&self, node_id: &NodeId, content: &Node) -> Result<NodeRecord, Error> {
        tokio::task::spawn_blocking({
            let db = self.db.clone();
            let node_id = node_id.clone();
            let content = content.clone();
            move || -> Result<_, Error> {
                let key = record_key(&node_id.tree_id(), node_id.in_tree_id());

                let txn = db.begin_write()?;
                let record = {
                    let mut table = txn.open_table(RECORDS_TABLE)?;
                    let stored = match table.get(key.as_slice())? {
                        None => None,
                        Some(data) => Some(decode(data.value())?),
                    };

                    // dropping txn without commit aborts it
                    let record = updated_record(stored, &node_id, &content)?;
                    table.insert(key.as_slice(), record.encode_to_vec().as_slice())?;
                    record
                };
                txn.commit()?;

                Ok(record)
            }
        })
        .await?
    }

    #[instrument(skip(self, tree), fields(tree = %tree))]
    async fn delete_tree(&self, tree: &TreeId) -> Result<u64, Error> {
        let db = self.db.clone();
        let prefix = tree_prefix(tree);

        tokio::task::spawn_blocking(move || remove_below(&db, &prefix)).await?
    }

    #[instrument(skip(self, digital_object_id), fields(digital_object_id = %digital_object_id))]
    async fn delete_all(&self, digital_object_id: &DigitalObjectId) -> Result<u64, Error> {
        let db = self.db.clone();
        let prefix = object_prefix(digital_object_id);

        tokio::task::spawn_blocking(move || remove_below(&db, &prefix)).await?
    }

    #[instrument(skip(self, digital_object_id), fields(digital_object_id = %digital_object_id))]
    async fn views(&self, digital_object_id: &DigitalObjectId) -> Result<Vec<String>, Error> {
        let db = self.db.clone();
        let prefix = object_prefix(digital_object_id);

        tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let txn = db.begin_read()?;
            let table = txn.open_table(RECORDS_TABLE)?;

            let mut views: Vec<String> = Vec::new();
            for key in keys_below(&table, &prefix)? {
                let view = view_of(&key, &prefix)?;
                if views.last() != Some(&view) {
                    views.push(view);
                }
            }
            Ok(views)
        })
        .await?
    }

    #[instrument(skip(self, tree), fields(tree = %tree))]
    async fn next_generation(&self, tree: &TreeId) -> Result<u32, Error> {
        let db = self.db.clone();
        let key = tree_prefix(tree);

        tokio::task::spawn_blocking(move || -> Result<_, Error> {
            let txn = db.begin_write()?;
            let generation = {
                let mut table = txn.open_table(GENERATIONS_TABLE)?;
                let current = table.get(key.as_slice())?.map(|g| g.value()).unwrap_or(0);
                let generation = next_generation(current)?;
                table.insert(key.as_slice(), generation)?;
                generation
            };
            txn.commit()?;

            Ok(generation)
        })
        .await?
    }
}
