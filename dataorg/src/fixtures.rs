use lazy_static::lazy_static;

use crate::nodes::{FileTree, Node};

pub const SCENARIO_OBJECT: &str = "obj-1";

lazy_static! {
    /// R
    /// ├── a.txt
    /// └── sub
    ///     └── b.txt
    pub static ref SCENARIO_ROOT: Node = Node::collection_with(
        "R",
        [
            Node::file("a.txt", "lfn://a"),
            Node::collection_with("sub", [Node::file("b.txt", "lfn://b")]),
        ],
    );

    pub static ref SCENARIO_TREE: FileTree =
        FileTree::new(SCENARIO_OBJECT, SCENARIO_ROOT.clone());

    /// Three levels, ten collections with ten files each on the second level,
    /// plus an empty collection and some attributes sprinkled in.
    pub static ref WIDE_ROOT: Node = Node::collection_with(
        "wide",
        (0..10)
            .map(|i| {
                Node::collection_with(
                    format!("dir-{}", i),
                    (0..10).map(move |j| {
                        Node::file(format!("file-{}-{}", i, j), format!("lfn://{}/{}", i, j))
                            .with_attribute(("row", i.to_string()))
                    }),
                )
                .with_description(format!("directory number {}", i))
            })
            .chain([Node::collection("empty")]),
    );

    /// A chain of collections, each level holding a file and the next one.
    ///
    /// deep
    /// ├── file-0
    /// └── level-1
    ///     ├── file-1
    ///     └── level-2
    ///         ├── file-2
    ///         └── level-3
    ///             └── file-3
    pub static ref DEEP_ROOT: Node = Node::collection_with(
        "deep",
        [
            Node::file("file-0", "lfn://0"),
            Node::collection_with(
                "level-1",
                [
                    Node::file("file-1", "lfn://1"),
                    Node::collection_with(
                        "level-2",
                        [
                            Node::file("file-2", "lfn://2"),
                            Node::collection_with("level-3", [Node::file("file-3", "lfn://3")]),
                        ],
                    ),
                ],
            ),
        ],
    );

    /// A single file without any children.
    pub static ref FILE_ROOT: Node =
        Node::file("lonely.dat", "lfn://lonely").with_attribute(("size", "42"));
}
