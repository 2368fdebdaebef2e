//! Registry events.

use serde::Serialize;

use crate::graph::NodeId;

/// A change published by the registry. Delivered on the home thread only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// The node became visible. `parent` is its parent at emission time;
    /// when set, the parent's own `Created` was delivered earlier.
    Created {
        id: NodeId,
        parent: Option<NodeId>,
    },

    /// The node is gone. Terminal for this identity.
    Destroyed { id: NodeId },

    /// The node moved under `parent`.
    Reparented {
        id: NodeId,
        parent: Option<NodeId>,
    },

    /// A parent-chain walk starting at `id` ran into a cycle. The subtree
    /// was treated as filtered.
    CycleDetected { id: NodeId },
}

impl RegistryEvent {
    /// The node this event is about.
    pub fn id(&self) -> NodeId {
        match *self {
            RegistryEvent::Created { id, .. }
            | RegistryEvent::Destroyed { id }
            | RegistryEvent::Reparented { id, .. }
            | RegistryEvent::CycleDetected { id } => id,
        }
    }
}
