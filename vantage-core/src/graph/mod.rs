//! Object Graph
//!
//! This module holds the registry's model of the target's object graph:
//! identity handles, per-node metadata, and the table of live nodes.
//!
//! # Overview
//!
//! The graph is a forest. Every node has at most one parent, recorded by
//! identity only; the registry never owns or dereferences the objects it
//! tracks. Children are not stored here. Projections derive child lists from
//! the events the registry emits.
//!
//! # Design Decisions
//!
//! 1. Identities are generation-tagged so a reused slot is a different node.
//!
//! 2. The table is indexed by identity for O(1) membership checks, which is
//!    the hot path of every notification.
//!
//! 3. Parent chains may be temporarily inconsistent (a parent reported after
//!    its child, or even a cycle while the host is mid-update), so every walk
//!    over them is bounded.

mod node;
mod table;

pub use node::{Node, NodeId, NodeStage};
pub use table::{AncestorChain, NodeTable};
