use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

/// Operates on data organization trees: imports them from JSON, lists and
/// shows their nodes, and deletes them.
///
/// Nodes are addressed by their position in the tree, as printed by `ls`.
#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// A global log level to use when printing logs.
    /// It's also possible to set `RUST_LOG` according to
    /// `tracing_subscriber::filter::EnvFilter`, which will always have
    /// priority.
    #[arg(long, default_value_t=Level::INFO)]
    pub log_level: Level,

    /// Whether to log in JSON
    #[arg(long)]
    pub json: bool,

    #[arg(long, env, default_value = "sled:///var/lib/dataorg/trees.sled")]
    pub tree_store_addr: String,

    /// Number of nodes written per transaction when importing a tree.
    #[arg(long, env, default_value = "4000")]
    pub bulk_batch_size: NonZeroUsize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Imports a tree from a JSON file, and prints the handle of its root.
    Import {
        #[clap(value_name = "PATH")]
        path: PathBuf,

        /// Overrides the view given in the file.
        #[arg(long)]
        view: Option<String>,
    },
    /// Lists the views a digital object has trees in.
    Views { digital_object_id: String },
    /// Lists the direct children of a node.
    Ls {
        digital_object_id: String,

        #[arg(long, default_value = "default")]
        view: String,

        /// Position of the node in the tree, the root if not given.
        #[arg(long)]
        node: Option<u64>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Prints a node and its descendants as JSON.
    Show {
        digital_object_id: String,

        #[arg(long, default_value = "default")]
        view: String,

        /// Position of the node in the tree, the root if not given.
        #[arg(long)]
        node: Option<u64>,

        /// How many levels below the node to include, all if not given.
        #[arg(long)]
        depth: Option<u32>,
    },
    /// Deletes the tree of one view, or with `--all-views` all trees of the
    /// digital object.
    Delete {
        digital_object_id: String,

        #[arg(long, default_value = "default", conflicts_with = "all_views")]
        view: String,

        #[arg(long)]
        all_views: bool,
    },
}
