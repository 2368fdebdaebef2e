//! Discovery Walker
//!
//! When the registry attaches to a target that is already running, every
//! object created before the attach was never reported. The walker finds
//! those objects by asking the host for children, starting from known roots,
//! and reports each unknown one as a plain (non-construction) add.
//!
//! This is a fallback. Results are best effort: an object created or
//! destroyed mid-walk may be missed or reported stale, and the normal
//! notification path corrects either case.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::graph::NodeId;
use crate::registry::Registry;

/// Walks the host's object graph and registers what the registry missed.
#[derive(Debug, Clone)]
pub struct DiscoveryWalker {
    registry: Arc<Registry>,
}

impl DiscoveryWalker {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Register `id` and its unknown descendants. Known nodes are not
    /// descended into. Does nothing once discovery is complete.
    ///
    /// Returns the number of nodes that became valid.
    pub fn discover(&self, id: NodeId) -> usize {
        if !self.registry.needs_discovery() {
            return 0;
        }

        let provider = self.registry.provider();
        let max_depth = self.registry.config().max_ancestor_depth;
        let mut registered = 0;
        let mut stack = vec![(id, 0usize)];

        while let Some((id, depth)) = stack.pop() {
            if self.registry.is_valid(id) {
                continue;
            }
            if depth > max_depth {
                warn!(%id, depth, "discovery too deep, subtree skipped");
                continue;
            }

            let type_tag = provider.type_tag(id);
            self.registry
                .object_added(id, provider.parent(id), type_tag.as_deref(), false);
            if !self.registry.is_valid(id) {
                // Filtered, or gone. Its subtree is not ours to report.
                trace!(%id, "discovery skipped subtree");
                continue;
            }
            registered += 1;

            let children = provider.children(id);
            stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
        }

        registered
    }

    /// Discover everything reachable from `roots`, then mark discovery
    /// complete.
    pub fn discover_all(&self, roots: impl IntoIterator<Item = NodeId>) -> usize {
        if !self.registry.needs_discovery() {
            return 0;
        }
        let registered: usize = roots.into_iter().map(|root| self.discover(root)).sum();
        debug!(registered, "discovery walk finished");
        self.registry.mark_discovery_complete();
        registered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::host::{HomeLoop, ObjectArena};
    use crate::registry::RegistryEvent;
    use parking_lot::Mutex;

    fn late_registry(arena: &Arc<ObjectArena>, home: &Arc<HomeLoop>) -> Arc<Registry> {
        let config = RegistryConfig {
            attached_late: true,
            ..RegistryConfig::default()
        };
        let registry = Registry::new(config, arena.clone(), home.clone());
        registry.initialize();
        registry
    }

    #[test]
    fn walk_registers_parents_before_children() {
        let arena = Arc::new(ObjectArena::new());
        let home = HomeLoop::new();
        let app = arena.create(None, "Application");
        let window = arena.create(Some(app), "Window");
        let button = arena.create(Some(window), "Button");
        let timer = arena.create(Some(app), "Timer");

        let registry = late_registry(&arena, &home);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        registry.subscribe(move |event| sink.lock().push(*event));

        let walker = DiscoveryWalker::new(registry.clone());
        assert_eq!(walker.discover_all(arena.roots()), 4);
        assert!(!registry.needs_discovery());

        let created: Vec<NodeId> = events
            .lock()
            .iter()
            .filter(|e| matches!(e, RegistryEvent::Created { .. }))
            .map(RegistryEvent::id)
            .collect();
        assert_eq!(created, vec![app, window, button, timer]);
    }

    #[test]
    fn known_nodes_stop_the_walk() {
        let arena = Arc::new(ObjectArena::new());
        let home = HomeLoop::new();
        let app = arena.create(None, "Application");
        let child = arena.create(Some(app), "Window");

        let registry = late_registry(&arena, &home);
        registry.object_added(app, None, None, false);

        let walker = DiscoveryWalker::new(registry.clone());
        assert_eq!(walker.discover(app), 0);
        assert!(!registry.is_valid(child));
    }

    #[test]
    fn filtered_subtrees_are_skipped() {
        let arena = Arc::new(ObjectArena::new());
        let home = HomeLoop::new();
        let tool = arena.create(None, "InspectorWindow");
        let inner = arena.create(Some(tool), "Label");

        let registry = late_registry(&arena, &home);
        registry.set_tool_root(Some(tool));

        let walker = DiscoveryWalker::new(registry.clone());
        assert_eq!(walker.discover_all([tool]), 0);
        assert!(!registry.is_valid(inner));
    }

    #[test]
    fn host_cycles_terminate() {
        let arena = Arc::new(ObjectArena::new());
        let home = HomeLoop::new();
        let a = arena.create(None, "A");
        let b = arena.create(Some(a), "B");

        let registry = late_registry(&arena, &home);
        let walker = DiscoveryWalker::new(registry.clone());
        assert_eq!(walker.discover(a), 2);

        // b now also lists a as a child. The walk stops at known nodes.
        arena.set_parent(a, Some(b));
        assert_eq!(walker.discover(b), 0);
    }

    #[test]
    fn no_op_once_complete() {
        let arena = Arc::new(ObjectArena::new());
        let home = HomeLoop::new();
        let app = arena.create(None, "Application");

        let registry = Registry::new(RegistryConfig::default(), arena.clone(), home.clone());
        registry.initialize();

        let walker = DiscoveryWalker::new(registry.clone());
        assert_eq!(walker.discover_all([app]), 0);
        assert!(!registry.is_valid(app));
    }
}
