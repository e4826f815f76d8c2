//! Property-level operations and the change log record.
//!
//! A [`Change`] is one atomic, actor-attributed batch of [`Op`]s. `(actor,
//! seq)` is globally unique and totally ordered per actor; cross-actor
//! order is not guaranteed and consumers must not assume one.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tree::{Color, Edge, EdgeId, Node, NodeId, NodeTree, Tag, TagId};

/// Peer-assigned actor identity.
pub type ActorId = u64;

/// Identity of a change.
///
/// The derived ordering compares `seq` before `actor`, which is also the
/// total order used for last-writer-wins conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeId {
    pub seq: u64,
    pub actor: ActorId,
}

/// A single authored property write on a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum NodeField {
    Position { x: f64, y: f64 },
    Size { width: f64, height: f64 },
    Scale { scale: f64 },
    Collapsed { collapsed: bool },
    Title { title: String },
    Color { color: Color },
    BorderColor { color: Color },
    Image { image: Option<String> },
    File { file: Option<String> },
    Parent { parent: NodeId },
    Tags { tags: HashSet<TagId> },
}

impl NodeField {
    /// Stable field key used for same-field conflict detection.
    pub fn key(&self) -> &'static str {
        match self {
            NodeField::Position { .. } => "position",
            NodeField::Size { .. } => "size",
            NodeField::Scale { .. } => "scale",
            NodeField::Collapsed { .. } => "collapsed",
            NodeField::Title { .. } => "title",
            NodeField::Color { .. } => "color",
            NodeField::BorderColor { .. } => "border_color",
            NodeField::Image { .. } => "image",
            NodeField::File { .. } => "file",
            NodeField::Parent { .. } => "parent",
            NodeField::Tags { .. } => "tags",
        }
    }

    /// Read the current value of this field from a node.
    pub fn current(&self, node: &Node) -> NodeField {
        match self {
            NodeField::Position { .. } => NodeField::Position {
                x: node.x,
                y: node.y,
            },
            NodeField::Size { .. } => NodeField::Size {
                width: node.width,
                height: node.height,
            },
            NodeField::Scale { .. } => NodeField::Scale { scale: node.scale },
            NodeField::Collapsed { .. } => NodeField::Collapsed {
                collapsed: node.collapsed,
            },
            NodeField::Title { .. } => NodeField::Title {
                title: node.title.clone(),
            },
            NodeField::Color { .. } => NodeField::Color { color: node.color },
            NodeField::BorderColor { .. } => NodeField::BorderColor {
                color: node.border_color,
            },
            NodeField::Image { .. } => NodeField::Image {
                image: node.image.clone(),
            },
            NodeField::File { .. } => NodeField::File {
                file: node.file.clone(),
            },
            // Only non-root nodes are re-parented; validation guarantees a
            // parent is present here.
            NodeField::Parent { parent } => NodeField::Parent {
                parent: node.parent.unwrap_or(*parent),
            },
            NodeField::Tags { .. } => NodeField::Tags {
                tags: node.tags.clone(),
            },
        }
    }

    /// Write this field onto a node.
    pub fn apply(&self, node: &mut Node) {
        match self {
            NodeField::Position { x, y } => {
                node.x = *x;
                node.y = *y;
            }
            NodeField::Size { width, height } => {
                node.width = *width;
                node.height = *height;
            }
            NodeField::Scale { scale } => node.scale = *scale,
            NodeField::Collapsed { collapsed } => node.collapsed = *collapsed,
            NodeField::Title { title } => node.title = title.clone(),
            NodeField::Color { color } => node.color = *color,
            NodeField::BorderColor { color } => node.border_color = *color,
            NodeField::Image { image } => node.image = image.clone(),
            NodeField::File { file } => node.file = file.clone(),
            NodeField::Parent { parent } => node.parent = Some(*parent),
            NodeField::Tags { tags } => node.tags = tags.clone(),
        }
    }
}

/// One atomic mutation in the operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    InsertNode { node: Node },
    RemoveNode { id: NodeId },
    SetNodeField { id: NodeId, value: NodeField },
    InsertEdge { edge: Edge },
    RemoveEdge { id: EdgeId },
    SetEdgeColor { id: EdgeId, color: Color },
    InsertTag { tag: Tag },
    RemoveTag { id: TagId },
    RenameTag { id: TagId, name: String },
    SetTagColor { id: TagId, color: Color },
}

impl Op {
    /// `(entity, field)` pair two ops conflict on when equal.
    ///
    /// Inserts and removes share an "existence" slot per entity so that a
    /// later re-insert supersedes an earlier remove and vice versa.
    pub fn conflict_key(&self) -> (Uuid, &'static str) {
        match self {
            Op::InsertNode { node } => (node.id.0, "existence"),
            Op::RemoveNode { id } => (id.0, "existence"),
            Op::SetNodeField { id, value } => (id.0, value.key()),
            Op::InsertEdge { edge } => (edge.id.0, "existence"),
            Op::RemoveEdge { id } => (id.0, "existence"),
            Op::SetEdgeColor { id, .. } => (id.0, "color"),
            Op::InsertTag { tag } => (tag.id.0, "existence"),
            Op::RemoveTag { id } => (id.0, "existence"),
            Op::RenameTag { id, .. } => (id.0, "name"),
            Op::SetTagColor { id, .. } => (id.0, "color"),
        }
    }
}

/// A committed batch of ops attributed to one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub id: ChangeId,
    /// Human-readable action names ("add card", "move card") for history UI.
    pub action_names: Vec<String>,
    pub ops: Vec<Op>,
    /// Post-apply snapshot for fast history scrubbing. Local-only:
    /// receivers rebuild their own after merging.
    #[serde(skip)]
    pub snapshot: Option<Arc<NodeTree>>,
}
