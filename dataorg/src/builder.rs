use crate::nodes::{Attribute, DigitalObjectId, FileTree, LogicalFileName, Node};

/// Builds a tree top-down, in the order its nodes appear in.
///
/// ```
/// use dataorg::builder::TreeBuilder;
///
/// let tree = TreeBuilder::create("R")
///     .add_file("lfn://a", "a.txt", [])
///     .create_and_enter_collection("sub")
///     .add_file("lfn://b", "b.txt", [("checksum", "abc").into()])
///     .leave_collection()
///     .build_tree("obj-1", "default");
///
/// assert_eq!(Some("R"), tree.root().name());
/// assert_eq!(2, tree.root().children().len());
/// ```
pub struct TreeBuilder {
    /// The collections entered so far, the root at the bottom. Each with the
    /// children added to it yet.
    stack: Vec<(Node, Vec<Node>)>,
}

impl TreeBuilder {
    /// Starts a tree with a root collection of the given name.
    pub fn create(name: impl Into<String>) -> Self {
        Self {
            stack: vec![(Node::collection(name), Vec::new())],
        }
    }

    /// Adds a file to the current collection.
    pub fn add_file(
        mut self,
        logical_file_name: impl Into<LogicalFileName>,
        name: impl Into<String>,
        attributes: impl IntoIterator<Item = Attribute>,
    ) -> Self {
        let mut file = Node::file(name, logical_file_name);
        file.set_attributes(attributes);
        self.push(file);
        self
    }

    /// Adds a collection to the current one, and makes it the current one.
    pub fn create_and_enter_collection(mut self, name: impl Into<String>) -> Self {
        self.stack.push((Node::collection(name), Vec::new()));
        self
    }

    /// Makes the parent of the current collection the current one again.
    /// Does nothing at the root.
    pub fn leave_collection(mut self) -> Self {
        if self.stack.len() > 1 {
            self.close();
        }
        self
    }

    /// Leaves all entered collections, and returns the root.
    pub fn build(mut self) -> Node {
        while self.stack.len() > 1 {
            self.close();
        }

        match self.stack.pop() {
            Some((mut root, children)) => {
                if let Some(slot) = root.children_mut() {
                    *slot = children;
                }
                root
            }
            None => Node::collection(""),
        }
    }

    /// Like [TreeBuilder::build], returning the tree of the digital object
    /// in the given view.
    pub fn build_tree(
        self,
        digital_object_id: impl Into<DigitalObjectId>,
        view: impl Into<String>,
    ) -> FileTree {
        FileTree::with_view(digital_object_id, view, self.build())
    }

    fn push(&mut self, node: Node) {
        if let Some((_, children)) = self.stack.last_mut() {
            children.push(node);
        }
    }

    fn close(&mut self) {
        if let Some((mut collection, children)) = self.stack.pop() {
            if let Some(slot) = collection.children_mut() {
                *slot = children;
            }
            self.push(collection);
        }
    }
}
