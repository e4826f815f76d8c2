//! Document engine: the authoritative tree, the operation log, undo/redo
//! and merge with remote peers.
//!
//! The engine is the only mutator of the [`NodeTree`]. Local commits apply
//! optimistically and are queued for the sync service; remote changes merge
//! in later. Per-actor order is preserved with a holdback buffer, repeated
//! merges are idempotent by `(actor, seq)`, and same-field conflicts
//! resolve last-writer-wins by the total order on [`ChangeId`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::CommitError;
use crate::ops::{ActorId, Change, ChangeId, NodeField, Op};
use crate::sync::{ConnectionState, SyncEvent, SyncSession};
use crate::tree::{NodeId, NodeTree};

/// Maximum number of undo entries to keep.
const MAX_UNDO_HISTORY: usize = 50;

/// A rejected commit: the untouched batch handed back with the reason, so
/// the caller can retry or discard its transient state.
#[derive(Debug)]
pub struct CommitFailure {
    pub ops: Vec<Op>,
    pub action_names: Vec<String>,
    pub error: CommitError,
}

/// Outcome of merging one remote change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Applied on top of the local state.
    Applied,
    /// Seen before (or our own echo); merging again is a no-op.
    AlreadyApplied,
    /// A per-actor predecessor is still missing; held back until it
    /// arrives.
    Deferred,
}

/// One undoable local commit.
#[derive(Debug, Clone)]
struct UndoEntry {
    action_names: Vec<String>,
    /// The committed ops, replayed on redo.
    forward_ops: Vec<Op>,
    /// Ops restoring the pre-commit state, in application order.
    inverse_ops: Vec<Op>,
}

pub struct DocumentEngine {
    tree: NodeTree,
    actor: ActorId,
    next_seq: u64,
    log: Vec<Change>,
    /// Highest contiguously applied seq per actor.
    applied: HashMap<ActorId, u64>,
    /// Remote changes waiting for their per-actor predecessors.
    holdback: HashMap<ActorId, BTreeMap<u64, Change>>,
    /// Last writer per `(entity, field)`, for same-field conflicts.
    field_writers: HashMap<(Uuid, &'static str), ChangeId>,
    undo_stack: Vec<UndoEntry>,
    redo_stack: Vec<UndoEntry>,
    sync: SyncSession,
}

impl DocumentEngine {
    /// Create an engine for a fresh document. Actor identity and write
    /// permission are explicit context, not ambient state.
    pub fn new(actor: ActorId, writeable: bool) -> Self {
        Self::with_tree(NodeTree::new(), actor, writeable)
    }

    /// Create an engine around an existing tree (loaded or received).
    pub fn with_tree(tree: NodeTree, actor: ActorId, writeable: bool) -> Self {
        Self {
            tree,
            actor,
            next_seq: 1,
            log: Vec::new(),
            applied: HashMap::new(),
            holdback: HashMap::new(),
            field_writers: HashMap::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            sync: SyncSession::new(writeable),
        }
    }

    /// Read access to the authoritative tree. All writes go through
    /// [`DocumentEngine::commit`].
    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn sync(&self) -> &SyncSession {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut SyncSession {
        &mut self.sync
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.sync.state()
    }

    pub fn is_writeable(&self) -> bool {
        self.sync.is_writeable()
    }

    // --- Local commits ---

    /// Atomically apply a batch of ops as one change.
    ///
    /// Validation runs against a scratch clone; if any op is invalid the
    /// authoritative tree is untouched and the whole batch comes back in
    /// the failure. On success the change is logged with a post-apply
    /// snapshot and queued for the sync service.
    pub fn commit(
        &mut self,
        ops: Vec<Op>,
        action_names: Vec<String>,
    ) -> Result<ChangeId, CommitFailure> {
        let forward_ops = ops.clone();
        let (id, inverse_ops) = self.commit_internal(ops, action_names.clone())?;

        self.undo_stack.push(UndoEntry {
            action_names,
            forward_ops,
            inverse_ops,
        });
        if self.undo_stack.len() > MAX_UNDO_HISTORY {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
        Ok(id)
    }

    /// Shared commit core: validates, applies, logs and queues. Returns the
    /// new change id and the inverse ops. Does not touch the undo/redo
    /// stacks (undo and redo reuse it).
    fn commit_internal(
        &mut self,
        ops: Vec<Op>,
        action_names: Vec<String>,
    ) -> Result<(ChangeId, Vec<Op>), CommitFailure> {
        if !self.sync.is_writeable() {
            return Err(CommitFailure {
                ops,
                action_names,
                error: CommitError::ReadOnly,
            });
        }
        if ops.is_empty() {
            return Err(CommitFailure {
                ops,
                action_names,
                error: CommitError::EmptyBatch,
            });
        }

        let mut scratch = self.tree.clone();
        let mut per_op_inverses = Vec::with_capacity(ops.len());
        for op in &ops {
            match apply_op(&mut scratch, op) {
                Ok(inverse) => per_op_inverses.push(inverse),
                Err(error) => {
                    return Err(CommitFailure {
                        ops,
                        action_names,
                        error,
                    });
                }
            }
        }

        let id = ChangeId {
            seq: self.next_seq,
            actor: self.actor,
        };
        self.next_seq += 1;
        self.tree = scratch;
        self.applied.insert(self.actor, id.seq);
        for op in &ops {
            self.field_writers.insert(op.conflict_key(), id);
        }
        // Later ops are reverted first.
        let inverse_ops: Vec<Op> = per_op_inverses.into_iter().rev().flatten().collect();

        let change = Change {
            id,
            action_names,
            ops,
            snapshot: Some(Arc::new(self.tree.clone())),
        };
        self.sync.queue_change(&change);
        self.log.push(change);
        Ok((id, inverse_ops))
    }

    // --- Undo/redo ---

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Undo the most recent local commit by committing its inverse ops.
    /// Returns false when there is nothing to undo or the session is
    /// read-only.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.undo_stack.pop() else {
            return false;
        };
        match self.commit_internal(entry.inverse_ops.clone(), vec!["undo".to_string()]) {
            Ok(_) => {
                self.redo_stack.push(entry);
                true
            }
            Err(failure) => {
                log::warn!("undo failed: {}", failure.error);
                self.undo_stack.push(entry);
                false
            }
        }
    }

    /// Redo the most recently undone commit.
    pub fn redo(&mut self) -> bool {
        let Some(entry) = self.redo_stack.pop() else {
            return false;
        };
        match self.commit_internal(entry.forward_ops.clone(), entry.action_names.clone()) {
            Ok(_) => {
                self.undo_stack.push(entry);
                true
            }
            Err(failure) => {
                log::warn!("redo failed: {}", failure.error);
                self.redo_stack.push(entry);
                false
            }
        }
    }

    // --- Merge ---

    /// Merge a change from a remote peer.
    ///
    /// Idempotent by `(actor, seq)`; per-actor issuing order is enforced
    /// with a holdback buffer. Any applied remote change invalidates the
    /// local undo/redo stacks: replaying stale intent on top of merged
    /// history could resurrect state the peer already moved past.
    pub fn merge(&mut self, change: Change) -> MergeOutcome {
        let ChangeId { seq, actor } = change.id;
        if actor == self.actor {
            // Our own change echoed back; it was applied optimistically.
            self.sync.finish_sync_round(true);
            return MergeOutcome::AlreadyApplied;
        }

        let next = self.applied.get(&actor).copied().unwrap_or(0) + 1;
        if seq < next {
            self.sync.finish_sync_round(true);
            return MergeOutcome::AlreadyApplied;
        }
        if seq > next {
            log::debug!("merge: holding back change {seq} from actor {actor} (expected {next})");
            self.holdback.entry(actor).or_default().insert(seq, change);
            return MergeOutcome::Deferred;
        }

        self.apply_remote(change);
        loop {
            let next_seq = self.applied.get(&actor).copied().unwrap_or(0) + 1;
            let buffered = self
                .holdback
                .get_mut(&actor)
                .and_then(|m| m.remove(&next_seq));
            match buffered {
                Some(change) => self.apply_remote(change),
                None => break,
            }
        }
        self.sync.finish_sync_round(true);
        MergeOutcome::Applied
    }

    fn apply_remote(&mut self, change: Change) {
        let id = change.id;
        for op in &change.ops {
            let key = op.conflict_key();
            if let Some(winner) = self.field_writers.get(&key) {
                if *winner > id {
                    // A later write in the total order owns this field.
                    continue;
                }
            }
            match apply_op(&mut self.tree, op) {
                Ok(_) => {
                    self.field_writers.insert(key, id);
                }
                Err(e) => log::warn!("merge: skipping op that no longer applies: {e}"),
            }
        }
        self.applied.insert(id.actor, id.seq);
        self.log.push(Change {
            snapshot: Some(Arc::new(self.tree.clone())),
            ..change
        });
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Feed an inbound frame through the session, merging any change it
    /// carries.
    pub fn handle_message(&mut self, json: &str) -> Option<SyncEvent> {
        let event = self.sync.handle_message(json)?;
        if let SyncEvent::ChangeReceived { change, .. } = &event {
            self.merge(change.clone());
        }
        Some(event)
    }

    // --- History ---

    pub fn change_log(&self) -> &[Change] {
        &self.log
    }

    /// Post-apply snapshot of a logged change, for history scrubbing.
    pub fn history_snapshot(&self, id: ChangeId) -> Option<Arc<NodeTree>> {
        self.log
            .iter()
            .rev()
            .find(|c| c.id == id)
            .and_then(|c| c.snapshot.clone())
    }
}

/// Validate and apply a single op, returning the ops that revert it (in
/// application order).
///
/// All checks run before any mutation, so a failed op leaves the tree
/// untouched.
fn apply_op(tree: &mut NodeTree, op: &Op) -> Result<Vec<Op>, CommitError> {
    match op {
        Op::InsertNode { node } => {
            if tree.node(node.id).is_some() {
                return Err(CommitError::DuplicateNode(node.id));
            }
            let parent = node.parent.ok_or(CommitError::ParentRequired(node.id))?;
            if tree.node(parent).is_none() {
                return Err(CommitError::MissingNode(parent));
            }
            for tag in &node.tags {
                if tree.tag(*tag).is_none() {
                    return Err(CommitError::MissingTag(*tag));
                }
            }
            let id = node.id;
            tree.insert_node(node.clone());
            Ok(vec![Op::RemoveNode { id }])
        }
        Op::RemoveNode { id } => {
            if tree.node(*id).is_none() {
                return Err(CommitError::MissingNode(*id));
            }
            if *id == tree.root() {
                return Err(CommitError::RootImmutable);
            }
            if !tree.children(*id).is_empty() {
                return Err(CommitError::NodeHasChildren { node: *id });
            }
            if !tree.edges_of(*id).is_empty() {
                return Err(CommitError::NodeHasEdges { node: *id });
            }
            let node = tree.remove_node(*id).ok_or(CommitError::MissingNode(*id))?;
            Ok(vec![Op::InsertNode { node }])
        }
        Op::SetNodeField { id, value } => {
            let node = tree.node(*id).ok_or(CommitError::MissingNode(*id))?;
            if let NodeField::Parent { parent } = value {
                if *id == tree.root() {
                    return Err(CommitError::RootImmutable);
                }
                if tree.node(*parent).is_none() {
                    return Err(CommitError::MissingNode(*parent));
                }
                if *parent == *id || is_ancestor(tree, *id, *parent) {
                    return Err(CommitError::WouldCycle {
                        node: *id,
                        parent: *parent,
                    });
                }
            }
            if let NodeField::Tags { tags } = value {
                for tag in tags {
                    if tree.tag(*tag).is_none() {
                        return Err(CommitError::MissingTag(*tag));
                    }
                }
            }
            let previous = value.current(node);
            let node = tree.node_mut(*id).ok_or(CommitError::MissingNode(*id))?;
            value.apply(node);
            Ok(vec![Op::SetNodeField {
                id: *id,
                value: previous,
            }])
        }
        Op::InsertEdge { edge } => {
            if tree.edge(edge.id).is_some() {
                return Err(CommitError::DuplicateEdge(edge.id));
            }
            for endpoint in [edge.start, edge.end] {
                if tree.node(endpoint).is_none() {
                    return Err(CommitError::MissingNode(endpoint));
                }
            }
            let id = edge.id;
            tree.insert_edge(edge.clone());
            Ok(vec![Op::RemoveEdge { id }])
        }
        Op::RemoveEdge { id } => {
            let edge = tree.remove_edge(*id).ok_or(CommitError::MissingEdge(*id))?;
            Ok(vec![Op::InsertEdge { edge }])
        }
        Op::SetEdgeColor { id, color } => {
            let edge = tree.edge_mut(*id).ok_or(CommitError::MissingEdge(*id))?;
            let previous = edge.color;
            edge.color = *color;
            Ok(vec![Op::SetEdgeColor {
                id: *id,
                color: previous,
            }])
        }
        Op::InsertTag { tag } => {
            if tree.tag(tag.id).is_some() {
                return Err(CommitError::DuplicateTag(tag.id));
            }
            if tree.tag_by_name(&tag.name).is_some() {
                return Err(CommitError::DuplicateTagName(tag.name.clone()));
            }
            let id = tag.id;
            tree.insert_tag(tag.clone());
            Ok(vec![Op::RemoveTag { id }])
        }
        Op::RemoveTag { id } => {
            let tag = tree.remove_tag(*id).ok_or(CommitError::MissingTag(*id))?;
            // Removing a tag also strips it from every card carrying it.
            // The inverse re-inserts the tag first so that restoring the
            // memberships validates.
            let mut inverse = vec![Op::InsertTag { tag }];
            let affected: Vec<NodeId> = tree
                .nodes()
                .filter(|n| n.tags.contains(id))
                .map(|n| n.id)
                .collect();
            for node_id in affected {
                if let Some(node) = tree.node_mut(node_id) {
                    inverse.push(Op::SetNodeField {
                        id: node_id,
                        value: NodeField::Tags {
                            tags: node.tags.clone(),
                        },
                    });
                    node.tags.remove(id);
                }
            }
            Ok(inverse)
        }
        Op::RenameTag { id, name } => {
            if tree.tags().any(|t| t.id != *id && t.name == *name) {
                return Err(CommitError::DuplicateTagName(name.clone()));
            }
            let tag = tree.tag_mut(*id).ok_or(CommitError::MissingTag(*id))?;
            let previous = std::mem::replace(&mut tag.name, name.clone());
            Ok(vec![Op::RenameTag {
                id: *id,
                name: previous,
            }])
        }
        Op::SetTagColor { id, color } => {
            let tag = tree.tag_mut(*id).ok_or(CommitError::MissingTag(*id))?;
            let previous = std::mem::replace(&mut tag.color, *color);
            Ok(vec![Op::SetTagColor {
                id: *id,
                color: previous,
            }])
        }
    }
}

/// Whether `ancestor` appears on `of`'s parent chain.
fn is_ancestor(tree: &NodeTree, ancestor: NodeId, of: NodeId) -> bool {
    let mut current = tree.node(of).and_then(|n| n.parent);
    let mut hops = 0;
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        hops += 1;
        if hops > tree.node_count() {
            // Already cyclic; treat as unsafe.
            return true;
        }
        current = tree.node(id).and_then(|n| n.parent);
    }
    false
}
