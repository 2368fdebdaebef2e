//! Graph Nodes
//!
//! This module defines the identity handle and per-node metadata kept by the
//! registry for every tracked object.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable handle naming one tracked object.
///
/// A handle is a slot number plus a generation counter. When the host reuses
/// a slot for a new object it bumps the generation, so a handle kept by a
/// projection after its object died can never be mistaken for the newcomer.
///
/// Ordering is by slot first, then generation. Both projections sort by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    slot: u64,
    generation: u32,
}

impl NodeId {
    /// Create a handle from its raw parts.
    pub const fn new(slot: u64, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// The slot number (the "address" of the object).
    pub fn slot(&self) -> u64 {
        self.slot
    }

    /// The generation of the slot this handle was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl From<u64> for NodeId {
    fn from(slot: u64) -> Self {
        Self::new(slot, 0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}#{}", self.slot, self.generation)
    }
}

/// Lifecycle stage of a tracked node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStage {
    /// Accepted by the registry, creation not yet delivered to consumers.
    Pending,

    /// `created` has been emitted; consumers know about this node.
    Finalized,
}

/// Metadata for one tracked node.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,

    /// Current parent, by identity only. `None` for roots.
    parent: Option<NodeId>,

    /// Type descriptor. `None` until the host could tell us.
    type_tag: Option<Arc<str>>,

    stage: NodeStage,
}

impl Node {
    /// Create a pending node.
    pub fn new(id: NodeId, parent: Option<NodeId>, type_tag: Option<&str>) -> Self {
        Self {
            id,
            parent,
            type_tag: type_tag.map(Arc::from),
            stage: NodeStage::Pending,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    pub fn type_tag(&self) -> Option<&Arc<str>> {
        self.type_tag.as_ref()
    }

    pub fn set_type_tag(&mut self, type_tag: &str) {
        self.type_tag = Some(Arc::from(type_tag));
    }

    pub fn stage(&self) -> NodeStage {
        self.stage
    }

    /// Whether `created` has already been delivered for this node.
    pub fn is_finalized(&self) -> bool {
        self.stage == NodeStage::Finalized
    }

    pub fn mark_finalized(&mut self) {
        self.stage = NodeStage::Finalized;
    }
}
