//! Node tree: canonical storage for cards, edges and tags.
//!
//! Parent references are ID lookups into the node map, never object
//! pointers, so the tree can be cloned for snapshots and serialized as-is.
//! The tree is exclusively owned and mutated by the
//! [`DocumentEngine`](crate::document::DocumentEngine); everything else
//! reads it.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TreeError;

/// Header height of a card in document units at scale 1.
pub const DEFAULT_HEADER_HEIGHT: f64 = 40.0;

/// Default size of a freshly placed card.
pub const DEFAULT_NODE_WIDTH: f64 = 200.0;
pub const DEFAULT_NODE_HEIGHT: f64 = 120.0;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Stable, peer-assignable card identifier.
    NodeId
);
id_type!(
    /// Edge identifier.
    EdgeId
);
id_type!(
    /// Tag identifier.
    TagId
);

/// Serializable RGBA8 color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    pub fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }
}

/// A card: a positioned, nestable document element that is itself a
/// coordinate space for its children.
///
/// `x`/`y` are local to the parent's content space; `scale` applies to the
/// card and everything nested inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// `None` only for the single root.
    pub parent: Option<NodeId>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
    /// Hides descendants from rendering and hit-testing.
    pub collapsed: bool,
    pub title: String,
    pub color: Color,
    pub border_color: Color,
    /// Reference to an attached image, resolved by the asset layer.
    pub image: Option<String>,
    /// Reference to an attached file, resolved by the asset layer.
    pub file: Option<String>,
    pub tags: HashSet<TagId>,
}

impl Node {
    /// Create a card at a local position inside `parent`.
    pub fn new(parent: NodeId, x: f64, y: f64) -> Self {
        Self {
            id: NodeId::new(),
            parent: Some(parent),
            x,
            y,
            width: DEFAULT_NODE_WIDTH,
            height: DEFAULT_NODE_HEIGHT,
            scale: 1.0,
            collapsed: false,
            title: String::new(),
            color: Color::white(),
            border_color: Color::black(),
            image: None,
            file: None,
            tags: HashSet::new(),
        }
    }

    fn root() -> Self {
        Self {
            id: NodeId::new(),
            parent: None,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            scale: 1.0,
            collapsed: false,
            title: String::new(),
            color: Color::transparent(),
            border_color: Color::transparent(),
            image: None,
            file: None,
            tags: HashSet::new(),
        }
    }
}

/// A connector between two cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub start: NodeId,
    pub end: NodeId,
    pub color: Color,
}

impl Edge {
    pub fn new(start: NodeId, end: NodeId) -> Self {
        Self {
            id: EdgeId::new(),
            start,
            end,
            color: Color::black(),
        }
    }
}

/// A document-wide label cards can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    /// Unique per document, enforced at commit validation.
    pub name: String,
    pub color: Color,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TagId::new(),
            name: name.into(),
            color: Color::black(),
        }
    }
}

/// Canonical mapping of node/edge/tag identities and their authored
/// properties.
///
/// Invariants: the parent graph is a single-rooted tree, and both endpoints
/// of every edge resolve to live nodes. Violations are surfaced by
/// [`NodeTree::check_integrity`] rather than repaired in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTree {
    root: NodeId,
    nodes: HashMap<NodeId, Node>,
    edges: HashMap<EdgeId, Edge>,
    tags: HashMap<TagId, Tag>,
    /// Header height shared by every card in this document.
    pub header_height: f64,
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTree {
    /// Create a tree containing only the root card.
    pub fn new() -> Self {
        let root = Node::root();
        let root_id = root.id;
        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        Self {
            root: root_id,
            nodes,
            edges: HashMap::new(),
            tags: HashMap::new(),
            header_height: DEFAULT_HEADER_HEIGHT,
        }
    }

    /// Id of the single root card.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Like [`NodeTree::node`] but reports the miss through the error
    /// channel.
    pub fn get_node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.nodes.get(&id).ok_or(TreeError::NodeNotFound(id))
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn tag(&self, id: TagId) -> Option<&Tag> {
        self.tags.get(&id)
    }

    pub fn tag_by_name(&self, name: &str) -> Option<&Tag> {
        self.tags.values().find(|t| t.name == name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Direct children of a card.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.parent == Some(id))
            .map(|n| n.id)
            .collect()
    }

    /// All descendants of a card, parents before children.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut frontier = self.children(id);
        while let Some(next) = frontier.pop() {
            frontier.extend(self.children(next));
            result.push(next);
        }
        result
    }

    /// Edges with either endpoint on the given card.
    pub fn edges_of(&self, id: NodeId) -> Vec<EdgeId> {
        self.edges
            .values()
            .filter(|e| e.start == id || e.end == id)
            .map(|e| e.id)
            .collect()
    }

    /// Scan for broken invariants: orphan nodes and dangling edges.
    ///
    /// Returns everything found so a repair action can be offered; an empty
    /// report means the tree is well-formed.
    pub fn check_integrity(&self) -> Vec<TreeError> {
        let mut report = Vec::new();
        for node in self.nodes.values() {
            match node.parent {
                Some(parent) if !self.nodes.contains_key(&parent) => {
                    report.push(TreeError::OrphanNode {
                        node: node.id,
                        parent,
                    });
                }
                None if node.id != self.root => {
                    // A second parentless node is an orphan with no
                    // recorded parent; report it against the root.
                    report.push(TreeError::OrphanNode {
                        node: node.id,
                        parent: self.root,
                    });
                }
                _ => {}
            }
        }
        for edge in self.edges.values() {
            for endpoint in [edge.start, edge.end] {
                if !self.nodes.contains_key(&endpoint) {
                    report.push(TreeError::DanglingEdge {
                        edge: edge.id,
                        node: endpoint,
                    });
                }
            }
        }
        report
    }

    // Raw mutators, restricted to the document engine's apply path.

    pub(crate) fn insert_node(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    pub(crate) fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub(crate) fn insert_edge(&mut self, edge: Edge) {
        self.edges.insert(edge.id, edge);
    }

    pub(crate) fn remove_edge(&mut self, id: EdgeId) -> Option<Edge> {
        self.edges.remove(&id)
    }

    pub(crate) fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(&id)
    }

    pub(crate) fn insert_tag(&mut self, tag: Tag) {
        self.tags.insert(tag.id, tag);
    }

    pub(crate) fn remove_tag(&mut self, id: TagId) -> Option<Tag> {
        self.tags.remove(&id)
    }

    pub(crate) fn tag_mut(&mut self, id: TagId) -> Option<&mut Tag> {
        self.tags.get_mut(&id)
    }
}
