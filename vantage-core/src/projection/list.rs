//! List Projection
//!
//! A flat view of every visible node, sorted by identity. Lookups are binary
//! searches, so a row number is always the node's rank among live identities.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::graph::NodeId;
use crate::observer::{Observers, SubscriberId};
use crate::registry::{Registry, RegistryEvent};

/// A structural change to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListChange {
    /// One row was inserted at `row`.
    Inserted { row: usize },

    /// The row at `row` was removed.
    Removed { row: usize },
}

/// Identity-sorted list of visible nodes.
///
/// Clones share the same rows and observers. Mutation happens on the home
/// thread through registry events; reads are safe from anywhere but are only
/// guaranteed consistent with the registry on the home thread.
#[derive(Clone, Default)]
pub struct ListProjection {
    rows: Arc<RwLock<Vec<NodeId>>>,
    observers: Arc<Observers<ListChange>>,
}

impl ListProjection {
    /// Create an empty, detached list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a list fed by `registry`'s events.
    pub fn attach(registry: &Registry) -> Self {
        let list = Self::new();
        let handle = list.clone();
        registry.subscribe(move |event| handle.apply(event));
        list
    }

    /// Apply one registry event.
    pub fn apply(&self, event: &RegistryEvent) {
        match *event {
            RegistryEvent::Created { id, .. } => self.insert(id),
            RegistryEvent::Destroyed { id } => self.remove(id),
            RegistryEvent::Reparented { .. } | RegistryEvent::CycleDetected { .. } => {}
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// The node at `row`.
    pub fn at(&self, row: usize) -> Option<NodeId> {
        self.rows.read().get(row).copied()
    }

    /// Row of `id`, if it is in the list.
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.rows.read().binary_search(&id).ok()
    }

    /// Copy of all rows, in order.
    pub fn snapshot(&self) -> Vec<NodeId> {
        self.rows.read().clone()
    }

    /// Observe structural changes.
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&ListChange) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.observers.unsubscribe(id)
    }

    fn insert(&self, id: NodeId) {
        let row = {
            let mut rows = self.rows.write();
            match rows.binary_search(&id) {
                Ok(_) => return,
                Err(row) => {
                    rows.insert(row, id);
                    row
                }
            }
        };
        debug!(%id, row, "list row inserted");
        self.observers.notify(&ListChange::Inserted { row });
    }

    fn remove(&self, id: NodeId) {
        let row = {
            let mut rows = self.rows.write();
            let Ok(row) = rows.binary_search(&id) else {
                return;
            };
            rows.remove(row);
            row
        };
        debug!(%id, row, "list row removed");
        self.observers.notify(&ListChange::Removed { row });
    }
}

impl std::fmt::Debug for ListProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListProjection")
            .field("rows", &self.len())
            .finish()
    }
}
