//! Node Table
//!
//! The authoritative set of node identities the registry currently considers
//! live, together with their metadata. Membership in the table is what the
//! rest of the crate calls the "valid set".
//!
//! The table has no threading policy of its own; the registry guards it.

use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;

use super::node::{Node, NodeId};

/// Inline capacity for ancestor chains. Typical object trees are shallow.
pub type AncestorChain = SmallVec<[NodeId; 16]>;

/// All live nodes, indexed by identity.
#[derive(Debug, Default)]
pub struct NodeTable {
    nodes: HashMap<NodeId, Node>,
}

impl NodeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Insert a node. Returns `false` if the identity was already present,
    /// in which case the existing entry is left untouched.
    pub fn insert(&mut self, node: Node) -> bool {
        let id = node.id();
        if self.nodes.contains_key(&id) {
            return false;
        }
        self.nodes.insert(id, node);
        true
    }

    /// Remove a node, returning its metadata.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Parent of a tracked node. `None` both for roots and unknown nodes.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(Node::parent)
    }

    /// Whether `id` is valid but its creation has not been announced yet.
    pub fn is_pending(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|node| !node.is_finalized())
    }

    /// Every node below `id`, each one before its own children.
    ///
    /// Children are not indexed, so this scans the whole table. It only runs
    /// when a subtree has to be dropped at once.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for node in self.nodes.values() {
            if let Some(parent) = node.parent() {
                children.entry(parent).or_default().push(node.id());
            }
        }

        let mut found = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut stack = children.remove(&id).unwrap_or_default();
        while let Some(child) = stack.pop() {
            if !seen.insert(child) {
                continue;
            }
            found.push(child);
            if let Some(grandchildren) = children.remove(&child) {
                stack.extend(grandchildren);
            }
        }
        found
    }

    /// Tracked ancestors of `id` that are still pending, closest to the root
    /// first.
    ///
    /// The walk stops at the first untracked ancestor and after `limit` steps,
    /// so a corrupted parent chain cannot make it loop.
    pub fn pending_ancestors(&self, id: NodeId, limit: usize) -> AncestorChain {
        let mut chain = AncestorChain::new();
        let mut current = self.parent_of(id);
        let mut steps = 0;

        while let Some(ancestor) = current {
            steps += 1;
            if steps > limit {
                break;
            }
            let Some(node) = self.nodes.get(&ancestor) else {
                break;
            };
            if !node.is_finalized() {
                chain.push(ancestor);
            }
            current = node.parent();
        }

        chain.reverse();
        chain
    }

    /// Number of tracked nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
