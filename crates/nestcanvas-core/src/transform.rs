//! Absolute coordinate transforms across the nested card hierarchy.
//!
//! Every card is a coordinate space for its children, so a card's absolute
//! placement is a fold over its ancestor chain: each step scales the local
//! offset by the parent's accumulated scale, adds the parent's header
//! (drawn at the scale of the parent's own parent), multiplies scales and
//! ANDs visibility with "parent not collapsed". All functions are pure and
//! O(depth).

use kurbo::Point;

use crate::error::TreeError;
use crate::geometry::AbsBox;
use crate::tree::{NodeId, NodeTree};

/// Resolved placement of a card in document-absolute coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsoluteTransform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub visible: bool,
}

impl AbsoluteTransform {
    /// The root's transform: origin, unit scale, visible.
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        scale: 1.0,
        visible: true,
    };

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Ancestors of `id` ordered root-first, ending with `id` itself.
///
/// A missing parent is an orphan and is reported, not papered over with an
/// identity fallback: a silent fallback would hide data corruption.
pub fn ancestor_chain(tree: &NodeTree, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
    let mut chain = vec![id];
    let mut current = tree.get_node(id)?;
    while let Some(parent_id) = current.parent {
        let parent = tree
            .node(parent_id)
            .ok_or(TreeError::OrphanNode {
                node: current.id,
                parent: parent_id,
            })?;
        chain.push(parent_id);
        if chain.len() > tree.node_count() {
            return Err(TreeError::ParentCycle(id));
        }
        current = parent;
    }
    chain.reverse();
    Ok(chain)
}

/// Absolute position, scale and visibility of a card.
pub fn absolute_transform(tree: &NodeTree, id: NodeId) -> Result<AbsoluteTransform, TreeError> {
    let chain = ancestor_chain(tree, id)?;
    let mut abs = AbsoluteTransform::IDENTITY;
    // Scale the current node's parent is drawn at; 1 for the root.
    let mut parent_scale = 1.0;
    for pair in chain.windows(2) {
        let parent = tree.get_node(pair[0])?;
        let child = tree.get_node(pair[1])?;
        let next = AbsoluteTransform {
            x: abs.x + child.x * abs.scale,
            y: abs.y + tree.header_height * parent_scale + child.y * abs.scale,
            scale: abs.scale * child.scale,
            visible: abs.visible && !parent.collapsed,
        };
        parent_scale = abs.scale;
        abs = next;
    }
    Ok(abs)
}

/// Header height of a card in absolute units.
pub fn absolute_header_height(tree: &NodeTree, id: NodeId) -> Result<f64, TreeError> {
    let node = tree.get_node(id)?;
    let parent_scale = match node.parent {
        Some(parent) => absolute_transform(tree, parent)?.scale,
        None => 1.0,
    };
    Ok(tree.header_height * parent_scale)
}

/// Absolute bounding box of a card.
pub fn absolute_box(tree: &NodeTree, id: NodeId) -> Result<AbsBox, TreeError> {
    let node = tree.get_node(id)?;
    let t = absolute_transform(tree, id)?;
    Ok(AbsBox::from_origin_size(
        t.origin(),
        node.width * t.scale,
        node.height * t.scale,
    ))
}

/// Convert a document-absolute point into `parent`'s content space.
///
/// Inverse of the child step of [`absolute_transform`]; used to place new
/// cards and to drag existing ones in their parent's coordinates.
pub fn to_local(tree: &NodeTree, parent: NodeId, point: Point) -> Result<Point, TreeError> {
    let t = absolute_transform(tree, parent)?;
    let node = tree.get_node(parent)?;
    let parent_scale = match node.parent {
        Some(grandparent) => absolute_transform(tree, grandparent)?.scale,
        None => 1.0,
    };
    Ok(Point::new(
        (point.x - t.x) / t.scale,
        (point.y - t.y - tree.header_height * parent_scale) / t.scale,
    ))
}
