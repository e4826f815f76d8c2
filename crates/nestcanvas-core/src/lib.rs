//! NestCanvas Core Library
//!
//! Platform-agnostic document, geometry and collaboration engine for the
//! NestCanvas nested-card canvas. Rendering, transport and all UI chrome
//! live outside this crate and talk to it through the types re-exported
//! here.

pub mod document;
pub mod error;
pub mod geometry;
pub mod interaction;
pub mod ops;
pub mod presence;
pub mod selection;
pub mod sync;
pub mod transform;
pub mod tree;

pub use document::{CommitFailure, DocumentEngine, MergeOutcome};
pub use error::{CommitError, TreeError};
pub use geometry::{AbsBox, connector_anchors, edge_anchors};
pub use interaction::{EditMode, Gesture, InteractionStateMachine};
pub use ops::{ActorId, Change, ChangeId, NodeField, Op};
pub use presence::{Collaborator, PresenceChannel, PresenceEvent, PresenceState};
pub use selection::{Selection, SelectionTarget};
pub use sync::{ClientMessage, ConnectionState, ServerMessage, SyncEvent, SyncSession};
pub use transform::{AbsoluteTransform, absolute_transform, ancestor_chain};
pub use tree::{Color, Edge, EdgeId, Node, NodeId, NodeTree, Tag, TagId};
