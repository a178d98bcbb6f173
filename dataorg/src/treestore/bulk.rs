use std::num::NonZeroUsize;
use tracing::{debug, info, warn, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use super::TreeStore;
use crate::proto::NodeRecord;
use crate::{Error, TreeId};

/// Writes the records of a new tree to a [TreeStore], committing them in
/// batches of a fixed size.
///
/// The first batch is committed with [TreeStore::put_first_batch], so the
/// load fails with [Error::AlreadyExists] if the tree got a root in the
/// meantime. Records must be written in `arrived` order, root first.
///
/// Once a batch failed to commit, the loader refuses any further writes, so
/// a caller can't miss a lost batch. Records of batches committed before the
/// failure stay in the store.
///
/// Progress is reported on the span that was current when the loader was
/// started, one increment per committed record.
pub struct BulkLoader<'a, S: ?Sized> {
    store: &'a S,
    tree: TreeId,
    batch_size: NonZeroUsize,
    pending: Vec<NodeRecord>,

    written: u64,
    batches: u64,
    failed: bool,

    span: Span,
}

impl<'a, S> BulkLoader<'a, S>
where
    S: TreeStore + ?Sized,
{
    pub fn begin(store: &'a S, tree: TreeId, batch_size: NonZeroUsize) -> Self {
        Self {
            store,
            tree,
            batch_size,
            pending: Vec::with_capacity(batch_size.get()),
            written: 0,
            batches: 0,
            failed: false,
            span: Span::current(),
        }
    }

    /// Queues a record, committing the batch once it is full.
    pub async fn write(&mut self, record: NodeRecord) -> Result<(), Error> {
        self.check_usable()?;

        self.pending.push(record);
        if self.pending.len() >= self.batch_size.get() {
            self.commit().await?;
        }

        Ok(())
    }

    /// Commits the remaining records and returns the number of records
    /// written in total.
    pub async fn finish(mut self) -> Result<u64, Error> {
        self.check_usable()?;

        if !self.pending.is_empty() {
            self.commit().await?;
        }

        info!(
            records = self.written,
            batches = self.batches,
            "bulk load finished"
        );
        Ok(self.written)
    }

    fn check_usable(&self) -> Result<(), Error> {
        if self.failed {
            return Err(Error::StorageError(
                "bulk loader stopped after a failed batch".to_string(),
            ));
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), Error> {
        let batch = std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(self.batch_size.get()),
        );
        let len = batch.len() as u64;

        let committed = if self.batches == 0 {
            self.store.put_first_batch(&self.tree, batch).await
        } else {
            self.store.put_batch(batch).await
        };

        if let Err(e) = committed {
            warn!(err = %e, batch = self.batches + 1, "failed to commit batch");
            self.failed = true;
            return Err(e);
        }

        self.batches += 1;
        self.written += len;
        self.span.pb_inc(len);
        debug!(batch = self.batches, batch.len = len, "committed batch");

        Ok(())
    }
}
