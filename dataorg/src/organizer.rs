//! The entry point for callers: creates, reads, updates and deletes whole
//! trees, and addresses their nodes by [NodeId].
use std::num::NonZeroUsize;
use tracing::{debug, info, instrument, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::indexer::index_tree;
use crate::nodes::{DigitalObjectId, FileTree, Node, DEFAULT_VIEW};
use crate::treestore::{self, BulkLoader, TreeStore};
use crate::{Error, NodeId, TreeId};

/// A node together with the handle it can be addressed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    pub id: NodeId,
    /// The node content, without children.
    pub node: Node,
}

/// Stores trees in a [TreeStore], writing new trees in batches of
/// `batch_size` records.
pub struct DataOrganizer<S> {
    store: S,
    batch_size: NonZeroUsize,
}

impl<S> DataOrganizer<S>
where
    S: TreeStore,
{
    pub fn new(store: S, batch_size: NonZeroUsize) -> Self {
        Self { store, batch_size }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persists the whole tree and returns the handle of its root.
    ///
    /// Fails with [Error::AlreadyExists] if there already is a tree for the
    /// digital object and view, also when another create of the same tree
    /// wins the race. If writing fails halfway, the records written so far
    /// stay, the tree needs to be deleted before retrying.
    #[instrument(skip_all, fields(tree.digital_object_id = %tree.digital_object_id(), tree.view = tree.view(), indicatif.pb_show=1), err)]
    pub async fn create_tree(&self, tree: &FileTree) -> Result<NodeId, Error> {
        let mut records = index_tree(tree)?;
        let tree_id = TreeId::new(tree.digital_object_id().clone(), tree.view());

        if treestore::root(&self.store, &tree_id).await?.is_some() {
            return Err(treestore::already_exists(&tree_id));
        }

        let version = self.store.next_generation(&tree_id).await?;
        for record in records.iter_mut() {
            record.version = version;
        }

        let span = Span::current();
        span.pb_set_style(&dataorg_tracing::PB_PROGRESS_STYLE);
        span.pb_set_length(records.len() as u64);
        span.pb_set_message(&format!("Creating tree {}", tree_id));
        span.pb_start();

        // the check above is just a shortcut, the first batch (holding the
        // root) only gets written if there is still no root
        let mut loader = BulkLoader::begin(&self.store, tree_id.clone(), self.batch_size);
        for record in records {
            loader.write(record).await?;
        }
        let written = loader.finish().await?;

        info!(records = written, version, "created tree");

        Ok(NodeId::new(
            tree_id.digital_object_id().clone(),
            0,
            version,
            tree_id.view(),
        ))
    }

    /// Loads the whole tree of the digital object in the given view.
    #[instrument(skip(self, digital_object_id), fields(digital_object_id = %digital_object_id), err)]
    pub async fn load_tree(
        &self,
        digital_object_id: &DigitalObjectId,
        view: &str,
    ) -> Result<FileTree, Error> {
        let tree_id = TreeId::new(digital_object_id.clone(), view);
        let root = self.root_record(&tree_id).await?;
        let records = treestore::subtree(&self.store, &root, None).await?;

        Ok(FileTree::with_view(
            digital_object_id.clone(),
            view,
            treestore::assemble(records)?,
        ))
    }

    /// Loads the whole tree of the digital object in the [DEFAULT_VIEW].
    pub async fn load_default_tree(
        &self,
        digital_object_id: &DigitalObjectId,
    ) -> Result<FileTree, Error> {
        self.load_tree(digital_object_id, DEFAULT_VIEW).await
    }

    /// Returns the handle of the root of the tree.
    #[instrument(skip(self, digital_object_id), fields(digital_object_id = %digital_object_id), err)]
    pub async fn get_root_handle(
        &self,
        digital_object_id: &DigitalObjectId,
        view: &str,
    ) -> Result<NodeId, Error> {
        let tree_id = TreeId::new(digital_object_id.clone(), view);
        Ok(self.root_record(&tree_id).await?.node_id())
    }

    /// Returns a page of the direct children of the node, in order.
    /// At most `limit` children are returned, after skipping `offset` ones.
    #[instrument(skip(self, handle), fields(node_id = %handle))]
    pub async fn get_children(
        &self,
        handle: &NodeId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<NodeEntry>, Error> {
        let parent = treestore::resolve(&self.store, handle).await?;

        treestore::children(&self.store, &parent, offset, limit)
            .await?
            .into_iter()
            .map(|record| {
                Ok(NodeEntry {
                    node: record.to_node()?,
                    id: record.node_id(),
                })
            })
            .collect()
    }

    /// Returns the number of direct children of the node.
    #[instrument(skip(self, handle), fields(node_id = %handle))]
    pub async fn get_child_count(&self, handle: &NodeId) -> Result<u64, Error> {
        let parent = treestore::resolve(&self.store, handle).await?;
        treestore::child_count(&self.store, &parent).await
    }

    /// Loads the node with its descendants, down to `max_depth` levels
    /// below it. With [None], the whole subtree is loaded.
    #[instrument(skip(self, handle), fields(node_id = %handle))]
    pub async fn load_subtree(
        &self,
        handle: &NodeId,
        max_depth: Option<u32>,
    ) -> Result<Node, Error> {
        let node = treestore::resolve(&self.store, handle).await?;
        let records = treestore::subtree(&self.store, &node, max_depth).await?;
        treestore::assemble(records)
    }

    /// Loads just the node, without any children.
    #[instrument(skip(self, handle), fields(node_id = %handle))]
    pub async fn load_node(&self, handle: &NodeId) -> Result<Node, Error> {
        treestore::resolve(&self.store, handle).await?.to_node()
    }

    /// Replaces name, description, attributes and (for files) the logical
    /// file name of the node. Its position in the tree stays untouched, so
    /// all handles into the tree stay valid.
    ///
    /// Fails with [Error::TypeMismatch] if `content` is of another kind than
    /// the stored node. Children of `content` are ignored.
    #[instrument(skip(self, handle, content), fields(node_id = %handle))]
    pub async fn update_node_content(&self, handle: &NodeId, content: &Node) -> Result<(), Error> {
        match self.store.update(handle, content).await {
            Ok(_) => Ok(()),
            Err(e @ Error::InvalidHandle(_)) => {
                debug!("handle does not resolve");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Returns the handle of the parent of the node, or [None] for the root.
    #[instrument(skip(self, handle), fields(node_id = %handle))]
    pub async fn get_parent(&self, handle: &NodeId) -> Result<Option<NodeId>, Error> {
        let node = treestore::resolve(&self.store, handle).await?;
        Ok(treestore::parent(&self.store, &node)
            .await?
            .map(|record| record.node_id()))
    }

    /// Lists the views the digital object has trees in, sorted by name.
    /// The [DEFAULT_VIEW] is always part of the list.
    #[instrument(skip(self, digital_object_id), fields(digital_object_id = %digital_object_id), err)]
    pub async fn get_views(&self, digital_object_id: &DigitalObjectId) -> Result<Vec<String>, Error> {
        let mut views = self.store.views(digital_object_id).await?;
        if !views.iter().any(|v| v == DEFAULT_VIEW) {
            views.push(DEFAULT_VIEW.to_string());
        }
        views.sort();

        Ok(views)
    }

    /// Deletes the tree of the digital object in the given view, returning
    /// the number of removed nodes. All handles into it become invalid.
    #[instrument(skip(self, digital_object_id), fields(digital_object_id = %digital_object_id), err)]
    pub async fn delete_tree(
        &self,
        digital_object_id: &DigitalObjectId,
        view: &str,
    ) -> Result<u64, Error> {
        let removed = self
            .store
            .delete_tree(&TreeId::new(digital_object_id.clone(), view))
            .await?;
        info!(removed, "deleted tree");

        Ok(removed)
    }

    /// Deletes the trees of the digital object in all views.
    #[instrument(skip(self, digital_object_id), fields(digital_object_id = %digital_object_id), err)]
    pub async fn delete_all_trees(&self, digital_object_id: &DigitalObjectId) -> Result<u64, Error> {
        let removed = self.store.delete_all(digital_object_id).await?;
        info!(removed, "deleted all trees");

        Ok(removed)
    }

    async fn root_record(&self, tree_id: &TreeId) -> Result<crate::proto::NodeRecord, Error> {
        treestore::root(&self.store, tree_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                digital_object_id: tree_id.digital_object_id().clone(),
                view: tree_id.view().to_string(),
            })
    }
}
