//! Error types shared across the core.

use thiserror::Error;

use crate::tree::{EdgeId, NodeId, TagId};

/// Broken tree invariants.
///
/// These indicate data corruption and are *reported*, never silently
/// repaired: automatic repair could discard user intent. Consumers surface
/// them as a repair action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("node {node} references missing parent {parent}")]
    OrphanNode { node: NodeId, parent: NodeId },
    #[error("edge {edge} references missing node {node}")]
    DanglingEdge { edge: EdgeId, node: NodeId },
    #[error("parent chain of node {0} contains a cycle")]
    ParentCycle(NodeId),
}

/// Commit validation failures.
///
/// A failed commit leaves the authoritative tree untouched; the pending
/// batch is handed back to the caller so the transient preview can be
/// retried or discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error("session is read-only, commit rejected")]
    ReadOnly,
    #[error("empty batch")]
    EmptyBatch,
    #[error("op references missing node {0}")]
    MissingNode(NodeId),
    #[error("op references missing edge {0}")]
    MissingEdge(EdgeId),
    #[error("op references missing tag {0}")]
    MissingTag(TagId),
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),
    #[error("edge {0} already exists")]
    DuplicateEdge(EdgeId),
    #[error("tag {0} already exists")]
    DuplicateTag(TagId),
    #[error("tag name {0:?} already in use")]
    DuplicateTagName(String),
    #[error("inserted node {0} must declare a parent")]
    ParentRequired(NodeId),
    #[error("node {node} cannot be removed while it has children")]
    NodeHasChildren { node: NodeId },
    #[error("node {node} cannot be removed while edges connect to it")]
    NodeHasEdges { node: NodeId },
    #[error("the root node cannot be removed or re-parented")]
    RootImmutable,
    #[error("re-parenting node {node} under {parent} would create a cycle")]
    WouldCycle { node: NodeId, parent: NodeId },
    #[error(transparent)]
    Tree(#[from] TreeError),
}
