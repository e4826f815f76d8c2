//! Selection state for cards and edges.

use std::collections::HashSet;

use crate::tree::{EdgeId, NodeId, NodeTree};

/// The single subject toolbars operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTarget {
    Node(NodeId),
    Edge(EdgeId),
}

/// Two selection sets plus a "last selected" pointer.
///
/// Selecting appends until an explicit [`Selection::clear`]; the last
/// pointer tracks the most recent addition and is dropped when that entity
/// is deselected.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    nodes: HashSet<NodeId>,
    edges: HashSet<EdgeId>,
    last: Option<SelectionTarget>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_node(&mut self, id: NodeId) {
        self.nodes.insert(id);
        self.last = Some(SelectionTarget::Node(id));
    }

    pub fn select_edge(&mut self, id: EdgeId) {
        self.edges.insert(id);
        self.last = Some(SelectionTarget::Edge(id));
    }

    pub fn deselect_node(&mut self, id: NodeId) {
        self.nodes.remove(&id);
        if self.last == Some(SelectionTarget::Node(id)) {
            self.last = None;
        }
    }

    pub fn deselect_edge(&mut self, id: EdgeId) {
        self.edges.remove(&id);
        if self.last == Some(SelectionTarget::Edge(id)) {
            self.last = None;
        }
    }

    /// Select every card (except the root) and every edge.
    pub fn select_all(&mut self, tree: &NodeTree) {
        for node in tree.nodes() {
            if node.id != tree.root() {
                self.nodes.insert(node.id);
            }
        }
        for edge in tree.edges() {
            self.edges.insert(edge.id);
        }
        self.last = None;
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.last = None;
    }

    pub fn nodes(&self) -> &HashSet<NodeId> {
        &self.nodes
    }

    pub fn edges(&self) -> &HashSet<EdgeId> {
        &self.edges
    }

    pub fn last(&self) -> Option<SelectionTarget> {
        self.last
    }

    pub fn is_node_selected(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn is_edge_selected(&self, id: EdgeId) -> bool {
        self.edges.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}
