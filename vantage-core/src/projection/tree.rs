//! Tree Projection
//!
//! The parent/child view of the visible nodes. Two maps are kept in step:
//!
//! - parent → children, each child list sorted by identity (roots live under
//!   the `None` key)
//! - child → parent
//!
//! The second is always the exact inverse of the first. When a node is
//! destroyed its remaining subtree leaves the tree with it, so no child is
//! ever left pointing at a parent the tree no longer holds.
//!
//! The tree also keeps a set of "marked" (favorite) nodes. Marking changes
//! data only, never structure.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::graph::NodeId;
use crate::observer::{Observers, SubscriberId};
use crate::registry::{Registry, RegistryEvent};

/// Bound on parent back-fill and ancestry walks inside the tree.
const MAX_TREE_DEPTH: usize = 4096;

/// A change to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeChange {
    /// A node was inserted at `row` under `parent`.
    Inserted { parent: Option<NodeId>, row: usize },

    /// The node at `row` under `parent` was removed, with its subtree.
    Removed { parent: Option<NodeId>, row: usize },

    /// A node moved as one operation.
    Moved {
        from_parent: Option<NodeId>,
        from_row: usize,
        to_parent: Option<NodeId>,
        to_row: usize,
    },

    /// Data of `id` changed (e.g. its marked state). No structural change.
    DataChanged { id: NodeId },
}

#[derive(Debug, Default)]
struct TreeState {
    parent_to_children: HashMap<Option<NodeId>, Vec<NodeId>>,
    child_to_parent: HashMap<NodeId, Option<NodeId>>,
    marked: HashSet<NodeId>,
}

impl TreeState {
    fn contains(&self, id: NodeId) -> bool {
        self.child_to_parent.contains_key(&id)
    }

    /// Insert `id` under `parent` at its sorted position. Returns the row, or
    /// `None` if `id` is already present.
    fn link(&mut self, id: NodeId, parent: Option<NodeId>) -> Option<usize> {
        if self.contains(id) {
            return None;
        }
        let children = self.parent_to_children.entry(parent).or_default();
        let row = match children.binary_search(&id) {
            Ok(_) => return None,
            Err(row) => row,
        };
        children.insert(row, id);
        self.child_to_parent.insert(id, parent);
        Some(row)
    }

    /// Detach `id` from its parent's child list. Returns its parent and the
    /// row it occupied.
    fn unlink(&mut self, id: NodeId) -> Option<(Option<NodeId>, usize)> {
        let parent = *self.child_to_parent.get(&id)?;
        let siblings = self.parent_to_children.get_mut(&parent)?;
        let row = siblings.binary_search(&id).ok()?;
        siblings.remove(row);
        if siblings.is_empty() {
            self.parent_to_children.remove(&parent);
        }
        self.child_to_parent.remove(&id);
        Some((parent, row))
    }

    /// Forget `id`'s descendants. `id` itself must already be unlinked.
    fn drop_subtree(&mut self, id: NodeId) {
        self.marked.remove(&id);
        let mut stack = self.parent_to_children.remove(&Some(id)).unwrap_or_default();
        while let Some(child) = stack.pop() {
            self.child_to_parent.remove(&child);
            self.marked.remove(&child);
            if let Some(grandchildren) = self.parent_to_children.remove(&Some(child)) {
                stack.extend(grandchildren);
            }
        }
    }

    /// Whether `candidate` is `id` or lies below it.
    fn is_within(&self, candidate: NodeId, id: NodeId) -> bool {
        let mut current = Some(candidate);
        let mut steps = 0;
        while let Some(node) = current {
            if node == id {
                return true;
            }
            steps += 1;
            if steps > MAX_TREE_DEPTH {
                return true;
            }
            current = self.child_to_parent.get(&node).copied().flatten();
        }
        false
    }
}

/// Parent/child view of visible nodes.
///
/// Clones share state and observers. Like the list, it is mutated on the
/// home thread by registry events.
#[derive(Clone, Default)]
pub struct TreeProjection {
    state: Arc<RwLock<TreeState>>,
    observers: Arc<Observers<TreeChange>>,
    registry: Weak<Registry>,
}

impl TreeProjection {
    /// Create an empty, detached tree. Without a registry it cannot recover
    /// parents it has not seen; children of unknown parents are skipped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree fed by `registry`'s events.
    pub fn attach(registry: &Arc<Registry>) -> Self {
        let tree = Self {
            registry: Arc::downgrade(registry),
            ..Self::default()
        };
        let handle = tree.clone();
        registry.subscribe(move |event| handle.apply(event));
        tree
    }

    /// Apply one registry event.
    pub fn apply(&self, event: &RegistryEvent) {
        match *event {
            RegistryEvent::Created { id, parent } => {
                self.insert(id, parent);
            }
            RegistryEvent::Destroyed { id } => self.remove(id),
            RegistryEvent::Reparented { id, parent } => self.reparent(id, parent),
            RegistryEvent::CycleDetected { .. } => {}
        }
    }

    // ------------------------------------------------------------------------
    // Marking
    // ------------------------------------------------------------------------

    /// Add `id` to the marked set. No-op unless `id` is in the tree.
    pub fn mark(&self, id: NodeId) -> bool {
        let changed = {
            let mut state = self.state.write();
            state.contains(id) && state.marked.insert(id)
        };
        if changed {
            self.observers.notify(&TreeChange::DataChanged { id });
        }
        changed
    }

    /// Remove `id` from the marked set.
    pub fn unmark(&self, id: NodeId) -> bool {
        let changed = {
            let mut state = self.state.write();
            state.contains(id) && state.marked.remove(&id)
        };
        if changed {
            self.observers.notify(&TreeChange::DataChanged { id });
        }
        changed
    }

    pub fn is_marked(&self, id: NodeId) -> bool {
        self.state.read().marked.contains(&id)
    }

    /// All marked nodes, sorted.
    pub fn marked(&self) -> Vec<NodeId> {
        let mut marked: Vec<NodeId> = self.state.read().marked.iter().copied().collect();
        marked.sort();
        marked
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.state.read().child_to_parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.state.read().contains(id)
    }

    /// Sorted children of `parent`; `None` lists the roots.
    pub fn children_of(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        self.state
            .read()
            .parent_to_children
            .get(&parent)
            .cloned()
            .unwrap_or_default()
    }

    /// Parent of `id`: `None` if `id` is not in the tree, `Some(None)` for a
    /// root.
    pub fn parent_of(&self, id: NodeId) -> Option<Option<NodeId>> {
        self.state.read().child_to_parent.get(&id).copied()
    }

    /// Row of `id` among its siblings.
    pub fn row_of(&self, id: NodeId) -> Option<usize> {
        let state = self.state.read();
        let parent = state.child_to_parent.get(&id)?;
        state.parent_to_children.get(parent)?.binary_search(&id).ok()
    }

    /// Check that the two maps are exact inverses and every child list is
    /// sorted.
    pub fn is_consistent(&self) -> bool {
        let state = self.state.read();
        let mut listed = 0;
        for (parent, children) in &state.parent_to_children {
            if children.is_empty() || children.windows(2).any(|w| w[0] >= w[1]) {
                return false;
            }
            for child in children {
                if state.child_to_parent.get(child) != Some(parent) {
                    return false;
                }
            }
            listed += children.len();
        }
        listed == state.child_to_parent.len()
    }

    /// Observe changes.
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&TreeChange) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.observers.unsubscribe(id)
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Insert `id` under `parent`, inserting a missing parent first. Returns
    /// `true` if `id` is in the tree afterwards.
    fn insert(&self, id: NodeId, parent: Option<NodeId>) -> bool {
        if self.contains(id) {
            return true;
        }
        if let Some(parent) = parent {
            if !self.ensure_present(parent) {
                debug!(%id, %parent, "tree parent unknown, child skipped");
                return false;
            }
        }
        self.link_and_notify(id, parent);
        true
    }

    /// Make sure `id` is in the tree, asking the registry where it and any
    /// unseen ancestors belong. Ancestors go in root first.
    fn ensure_present(&self, id: NodeId) -> bool {
        if self.contains(id) {
            return true;
        }
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };

        let mut missing = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if self.contains(node) {
                break;
            }
            if missing.len() >= MAX_TREE_DEPTH {
                warn!(%id, "tree back-fill too deep");
                return false;
            }
            if !registry.is_visible(node) {
                return false;
            }
            let parent = registry.parent_of(node);
            missing.push((node, parent));
            current = parent;
        }

        for (node, parent) in missing.into_iter().rev() {
            self.link_and_notify(node, parent);
        }
        true
    }

    fn link_and_notify(&self, id: NodeId, parent: Option<NodeId>) {
        let row = self.state.write().link(id, parent);
        if let Some(row) = row {
            debug!(%id, parent = ?parent, row, "tree node inserted");
            self.observers.notify(&TreeChange::Inserted { parent, row });
        }
    }

    fn remove(&self, id: NodeId) {
        let removed = {
            let mut state = self.state.write();
            let removed = state.unlink(id);
            if removed.is_some() {
                state.drop_subtree(id);
            }
            removed
        };
        if let Some((parent, row)) = removed {
            debug!(%id, row, "tree node removed");
            self.observers.notify(&TreeChange::Removed { parent, row });
        }
    }

    fn reparent(&self, id: NodeId, new_parent: Option<NodeId>) {
        let Some(old_parent) = self.parent_of(id) else {
            return;
        };
        if old_parent == new_parent {
            return;
        }
        if let Some(parent) = new_parent {
            if !self.ensure_present(parent) {
                debug!(%id, %parent, "tree move target unknown, move skipped");
                return;
            }
        }

        let moved = {
            let mut state = self.state.write();
            if new_parent.is_some_and(|p| state.is_within(p, id)) {
                warn!(%id, "tree move would create a cycle, skipped");
                return;
            }
            let Some((from_parent, from_row)) = state.unlink(id) else {
                return;
            };
            let children = state.parent_to_children.entry(new_parent).or_default();
            let to_row = children.binary_search(&id).unwrap_or_else(|row| row);
            children.insert(to_row, id);
            state.child_to_parent.insert(id, new_parent);
            TreeChange::Moved {
                from_parent,
                from_row,
                to_parent: new_parent,
                to_row,
            }
        };
        debug!(%id, ?moved, "tree node moved");
        self.observers.notify(&moved);
    }
}

impl std::fmt::Debug for TreeProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeProjection")
            .field("nodes", &self.len())
            .field("attached", &(self.registry.strong_count() > 0))
            .finish()
    }
}
