//! Edit modes, gestures and the pending-mutation protocol.
//!
//! The state machine reads the authoritative tree but never writes to it.
//! While a gesture is in flight it maintains transient preview copies of
//! the affected cards for the renderer; authoritative ops are queued with
//! [`InteractionStateMachine::add_dispatch`] and flushed atomically through
//! [`InteractionStateMachine::commit_dispatches`].

use std::collections::HashMap;

use kurbo::Point;

use crate::document::{CommitFailure, DocumentEngine};
use crate::error::TreeError;
use crate::ops::{ChangeId, NodeField, Op};
use crate::selection::Selection;
use crate::transform::{absolute_transform, to_local};
use crate::tree::{Edge, Node, NodeId, NodeTree};

/// Edit modes. `Navigate` is initial and terminal; every other mode
/// returns to it when its gesture ends or aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    Navigate,
    AddNode,
    MoveNode,
    AddEdge,
}

/// The gesture currently in flight, if any.
///
/// Exposed so the renderer can draw the live preview (the placed card, the
/// rubber-band edge).
#[derive(Debug, Clone, PartialEq)]
pub enum Gesture {
    Idle,
    /// A freshly created card following the pointer, not yet committed.
    PlacingNode { node: NodeId },
    /// An existing card being dragged; `grab` is the pointer offset from
    /// the card's absolute origin at drag start.
    MovingNode { node: NodeId, grab: (f64, f64) },
    /// An edge being drawn from `from` toward the pointer.
    DrawingEdge { from: NodeId, cursor: Point },
}

/// Turns gestures into batched pending mutations against the tree.
#[derive(Debug)]
pub struct InteractionStateMachine {
    mode: EditMode,
    selection: Selection,
    gesture: Gesture,
    /// Transient copies of cards being edited, keyed by id. Visible to the
    /// renderer for live preview, invisible to the document engine.
    preview: HashMap<NodeId, Node>,
    pending_ops: Vec<Op>,
    pending_actions: Vec<String>,
}

impl Default for InteractionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionStateMachine {
    pub fn new() -> Self {
        Self {
            mode: EditMode::Navigate,
            selection: Selection::new(),
            gesture: Gesture::Idle,
            preview: HashMap::new(),
            pending_ops: Vec::new(),
            pending_actions: Vec::new(),
        }
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    /// Set the mode unconditionally.
    pub fn set_mode(&mut self, mode: EditMode) {
        self.mode = mode;
    }

    /// Re-entrant toggle: switch to `mode` if different, otherwise back to
    /// `Navigate`.
    pub fn toggle_mode(&mut self, mode: EditMode) {
        self.mode = if self.mode == mode {
            EditMode::Navigate
        } else {
            mode
        };
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    // --- Preview ---

    /// Resolve a card for rendering, preferring the transient preview copy
    /// over the authoritative one.
    pub fn resolve<'a>(&'a self, tree: &'a NodeTree, id: NodeId) -> Option<&'a Node> {
        self.preview.get(&id).or_else(|| tree.node(id))
    }

    /// The transient copy of a card, if one is being edited.
    pub fn preview_node(&self, id: NodeId) -> Option<&Node> {
        self.preview.get(&id)
    }

    pub fn has_preview(&self) -> bool {
        !self.preview.is_empty()
    }

    /// Cards that exist only as previews (not yet in the tree).
    pub fn preview_only_nodes<'a>(
        &'a self,
        tree: &'a NodeTree,
    ) -> impl Iterator<Item = &'a Node> {
        self.preview
            .values()
            .filter(|n| tree.node(n.id).is_none())
    }

    // --- Gestures ---

    /// Start placing a new card under `parent` at a document-absolute
    /// point (`AddNode` mode). The card exists only as a preview until the
    /// gesture finishes and the batch commits.
    pub fn begin_place(
        &mut self,
        tree: &NodeTree,
        parent: NodeId,
        point: Point,
    ) -> Result<NodeId, TreeError> {
        let local = to_local(tree, parent, point)?;
        let node = Node::new(parent, local.x, local.y);
        let id = node.id;
        self.preview.insert(id, node);
        self.gesture = Gesture::PlacingNode { node: id };
        Ok(id)
    }

    /// Start dragging an existing card (`MoveNode` mode).
    pub fn begin_move(
        &mut self,
        tree: &NodeTree,
        id: NodeId,
        point: Point,
    ) -> Result<(), TreeError> {
        let abs = absolute_transform(tree, id)?;
        let node = tree.get_node(id)?.clone();
        self.preview.insert(id, node);
        self.gesture = Gesture::MovingNode {
            node: id,
            grab: (point.x - abs.x, point.y - abs.y),
        };
        Ok(())
    }

    /// Start drawing an edge from a card (`AddEdge` mode).
    pub fn begin_edge(&mut self, from: NodeId, point: Point) {
        self.gesture = Gesture::DrawingEdge {
            from,
            cursor: point,
        };
    }

    /// Feed pointer movement into the active gesture.
    pub fn update_pointer(&mut self, tree: &NodeTree, point: Point) -> Result<(), TreeError> {
        match self.gesture {
            Gesture::Idle => Ok(()),
            Gesture::PlacingNode { node } => {
                let parent = self
                    .preview
                    .get(&node)
                    .and_then(|n| n.parent)
                    .ok_or(TreeError::NodeNotFound(node))?;
                let local = to_local(tree, parent, point)?;
                if let Some(preview) = self.preview.get_mut(&node) {
                    preview.x = local.x;
                    preview.y = local.y;
                }
                Ok(())
            }
            Gesture::MovingNode { node, grab } => {
                let parent = tree
                    .get_node(node)?
                    .parent
                    .ok_or(TreeError::NodeNotFound(node))?;
                let local = to_local(
                    tree,
                    parent,
                    Point::new(point.x - grab.0, point.y - grab.1),
                )?;
                if let Some(preview) = self.preview.get_mut(&node) {
                    preview.x = local.x;
                    preview.y = local.y;
                }
                Ok(())
            }
            Gesture::DrawingEdge { from, .. } => {
                self.gesture = Gesture::DrawingEdge {
                    from,
                    cursor: point,
                };
                Ok(())
            }
        }
    }

    /// Finish the active gesture, queueing its authoritative ops. For an
    /// edge gesture, `target` is the card under the pointer at release.
    /// The mode returns to `Navigate`; the queued batch still needs
    /// [`InteractionStateMachine::commit_dispatches`].
    pub fn finish_gesture(&mut self, target: Option<NodeId>) {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Idle => {}
            Gesture::PlacingNode { node } => {
                if let Some(preview) = self.preview.get(&node) {
                    self.pending_ops.push(Op::InsertNode {
                        node: preview.clone(),
                    });
                    self.pending_actions.push("add card".to_string());
                }
            }
            Gesture::MovingNode { node, .. } => {
                if let Some(preview) = self.preview.get(&node) {
                    self.pending_ops.push(Op::SetNodeField {
                        id: node,
                        value: NodeField::Position {
                            x: preview.x,
                            y: preview.y,
                        },
                    });
                    self.pending_actions.push("move card".to_string());
                }
            }
            Gesture::DrawingEdge { from, .. } => {
                if let Some(to) = target {
                    if to != from {
                        self.pending_ops.push(Op::InsertEdge {
                            edge: Edge::new(from, to),
                        });
                        self.pending_actions.push("connect cards".to_string());
                    }
                }
            }
        }
        self.mode = EditMode::Navigate;
    }

    // --- Dispatch queue ---

    /// Queue an authoritative op directly (toolbar edits, deletions).
    pub fn add_dispatch(&mut self, op: Op, action_name: impl Into<String>) {
        self.pending_ops.push(op);
        self.pending_actions.push(action_name.into());
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_ops.is_empty()
    }

    /// Flush the queued batch atomically to the document engine.
    ///
    /// On success the queue and preview state are cleared. On failure both
    /// are retained untouched so the edit can be retried or discarded, and
    /// the failure is returned for the UI to surface.
    pub fn commit_dispatches(
        &mut self,
        engine: &mut DocumentEngine,
    ) -> Result<Option<ChangeId>, CommitFailure> {
        if self.pending_ops.is_empty() {
            return Ok(None);
        }
        let ops = std::mem::take(&mut self.pending_ops);
        let actions = std::mem::take(&mut self.pending_actions);
        match engine.commit(ops, actions) {
            Ok(id) => {
                self.preview.clear();
                Ok(Some(id))
            }
            Err(failure) => {
                self.pending_ops = failure.ops.clone();
                self.pending_actions = failure.action_names.clone();
                Err(failure)
            }
        }
    }

    /// Abort the in-progress edit: discard the gesture, the preview state
    /// and the dispatch queue, and return to `Navigate`. Nothing reaches
    /// the document engine.
    pub fn abort(&mut self) {
        self.gesture = Gesture::Idle;
        self.preview.clear();
        self.pending_ops.clear();
        self.pending_actions.clear();
        self.mode = EditMode::Navigate;
    }
}
