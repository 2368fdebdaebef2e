//! Parent-chain filtering.
//!
//! A node is filtered (never tracked) when it, or any of its ancestors, is
//! the tool's own root or carries one of the tool's internal type tags.
//!
//! The walk has to survive a host whose parent pointers form a cycle. It
//! counts its steps; past a threshold it starts remembering every node it
//! visits, and the first repeat ends the walk as a detected cycle.
//!
//! A walk may also stop early at a settled ancestor, one that was checked
//! when its own creation was announced.

use std::collections::HashSet;

use crate::graph::NodeId;

/// What the walk needs to know about each node on the chain.
pub(crate) trait ChainLookup {
    fn is_tool_root(&self, id: NodeId) -> bool;
    fn is_internal(&self, id: NodeId) -> bool;
    fn parent(&self, id: NodeId) -> Option<NodeId>;

    /// Whether `id` already passed the filter and nothing above it needs
    /// checking again.
    fn is_settled(&self, _id: NodeId) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FilterReason {
    ToolRoot(NodeId),
    InternalType(NodeId),
    /// The walk revisited this node.
    Cycle(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Tracked,
    Filtered(FilterReason),
}

/// Walk from `start` to the root and decide whether `start` is filtered.
pub(crate) fn walk<L: ChainLookup>(start: NodeId, lookup: &L, threshold: usize) -> Verdict {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut steps = 0usize;
    let mut current = Some(start);

    while let Some(id) = current {
        steps += 1;
        if steps > threshold && !visited.insert(id) {
            return Verdict::Filtered(FilterReason::Cycle(id));
        }
        if lookup.is_tool_root(id) {
            return Verdict::Filtered(FilterReason::ToolRoot(id));
        }
        if lookup.is_internal(id) {
            return Verdict::Filtered(FilterReason::InternalType(id));
        }
        if id != start && lookup.is_settled(id) {
            return Verdict::Tracked;
        }
        current = lookup.parent(id);
    }

    Verdict::Tracked
}
