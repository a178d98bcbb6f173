use std::io::Write;

use anyhow::Context;
use clap::Parser;
use dataorg::treestore::{self, TreeStore};
use dataorg::{DataOrganizer, DigitalObjectId, FileTree, NodeId};
use tracing::info;

mod args;

use args::{Cli, Commands};

/// Returns the handle of the node at the given position, or of the root.
/// Handles of other nodes carry the root's version, as all records of a
/// tree are written with the same one.
async fn handle_for<S: TreeStore>(
    organizer: &DataOrganizer<S>,
    digital_object_id: &DigitalObjectId,
    view: &str,
    node: Option<u64>,
) -> Result<NodeId, dataorg::Error> {
    let root = organizer.get_root_handle(digital_object_id, view).await?;

    Ok(match node {
        None => root,
        Some(position) => NodeId::new(
            digital_object_id.clone(),
            position,
            root.version(),
            view,
        ),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut tracing_builder = dataorg_tracing::TracingBuilder::default()
        .level(cli.log_level)
        .enable_progressbar();
    if cli.json {
        tracing_builder = tracing_builder.enable_json();
    }
    let tracing_handle = tracing_builder.build()?;
    let mut stdout = tracing_handle.get_stdout_writer();

    let organizer = DataOrganizer::new(
        treestore::from_addr(&cli.tree_store_addr).await?,
        cli.bulk_batch_size,
    );

    match cli.command {
        Commands::Import { path, view } => {
            let data = std::fs::read(&path)
                .with_context(|| format!("unable to read {}", path.display()))?;
            let mut tree: FileTree = serde_json::from_slice(&data)
                .with_context(|| format!("unable to parse tree from {}", path.display()))?;

            if let Some(view) = view {
                tree = FileTree::with_view(tree.digital_object_id().clone(), view, tree.into_root());
            }

            let root = organizer.create_tree(&tree).await?;
            info!(root = %root, nodes = tree.root().count_nodes(), "imported tree");

            serde_json::to_writer_pretty(&mut stdout, &root)?;
            writeln!(stdout)?;
        }
        Commands::Views { digital_object_id } => {
            for view in organizer.get_views(&digital_object_id.into()).await? {
                writeln!(stdout, "{}", view)?;
            }
        }
        Commands::Ls {
            digital_object_id,
            view,
            node,
            offset,
            limit,
        } => {
            let digital_object_id = digital_object_id.into();
            let handle = handle_for(&organizer, &digital_object_id, &view, node).await?;

            for entry in organizer.get_children(&handle, offset, limit).await? {
                writeln!(
                    stdout,
                    "{:>8} {:<10} {}",
                    entry.id.in_tree_id(),
                    if entry.node.is_collection() {
                        "collection"
                    } else {
                        "file"
                    },
                    entry.node.name().unwrap_or_default(),
                )?;
            }
        }
        Commands::Show {
            digital_object_id,
            view,
            node,
            depth,
        } => {
            let digital_object_id = digital_object_id.into();
            let handle = handle_for(&organizer, &digital_object_id, &view, node).await?;

            let subtree = organizer.load_subtree(&handle, depth).await?;
            serde_json::to_writer_pretty(&mut stdout, &subtree)?;
            writeln!(stdout)?;
        }
        Commands::Delete {
            digital_object_id,
            view,
            all_views,
        } => {
            let digital_object_id = digital_object_id.into();
            let removed = if all_views {
                organizer.delete_all_trees(&digital_object_id).await?
            } else {
                organizer.delete_tree(&digital_object_id, &view).await?
            };
            writeln!(stdout, "removed {} nodes", removed)?;
        }
    }

    Ok(())
}
