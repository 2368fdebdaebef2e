//! Registry Coordinator
//!
//! The registry is the single point through which the target's threads report
//! object lifecycle changes. It decides which notifications are worth
//! tracking, orders them, and publishes them as [`RegistryEvent`]s on the home
//! thread.
//!
//! # How It Works
//!
//! 1. `object_added` may arrive on any thread. The node is filtered once,
//!    then its unknown ancestors are collected from the host and registered
//!    root-first, then the node itself. Registration makes a node "valid".
//!
//! 2. If the node was reported from its constructor, from a thread other than
//!    home, or under a parent whose own creation is still queued, a `Create`
//!    is queued and a flush is scheduled. Otherwise the creation is finalized
//!    on the spot.
//!
//! 3. The flush runs on the home thread. It drains a snapshot of the queue in
//!    FIFO order, then delivers deferred reparent notifications.
//!
//! 4. Finalization re-checks the node: it may have died, or its now-complete
//!    parent chain may place it under the tool's own objects. Any pending
//!    ancestors are finalized first, so a parent's `Created` always precedes
//!    its children's.
//!
//! Every walk over a parent chain is a bounded loop.
//!
//! # Locking
//!
//! One re-entrant mutex guards all mutable state. Subscribers run while it
//! is held and may call back into the registry, including reporting new
//! objects. The state sits in a `RefCell` inside the mutex; borrows are kept
//! short and are never held across event delivery.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::ReentrantMutex;
use tracing::{debug, trace, warn};

use super::event::RegistryEvent;
use super::filter::{self, ChainLookup, FilterReason, Verdict};
use super::queue::{ChangeKind, ChangeQueue};
use super::scope::IgnoreScope;
use crate::config::RegistryConfig;
use crate::graph::{Node, NodeId, NodeTable};
use crate::host::{HostScheduler, Task, TypeInfoProvider};
use crate::observer::{Observers, SubscriberId};

/// What the registry was told about a node it has not registered yet.
#[derive(Debug, Clone)]
struct Reported {
    parent: Option<NodeId>,
    type_tag: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    initialized: bool,

    /// Adds received before startup, in arrival order. `None` marks an
    /// object removed again before startup.
    pre_init: IndexMap<NodeId, Option<Reported>>,

    /// The valid set, with metadata.
    table: NodeTable,

    /// Nodes whose `Created` went out and whose `Destroyed` has not.
    visible: HashSet<NodeId>,

    queue: ChangeQueue,

    /// Reparents waiting for the end of the next flush.
    deferred_reparents: IndexSet<NodeId>,

    /// Cycles detected off the home thread, reported at the next flush.
    deferred_cycles: Vec<NodeId>,

    flush_pending: bool,
    tool_root: Option<NodeId>,
}

/// How a removal resolved.
enum Removal {
    Ignored,
    StillBorn,
    Announce,
}

/// How a reparent resolved.
enum Move {
    Nothing,
    Deliver,
    Defer,
}

/// Parent-chain view used by the filter walk.
///
/// The node being added is not in the table yet, so its parent and type tag
/// can be supplied explicitly. Everything else comes from the table, then the
/// host.
struct ChainSource<'a> {
    state: &'a RegistryState,
    provider: &'a dyn TypeInfoProvider,
    config: &'a RegistryConfig,
    start: NodeId,
    start_parent: Option<Option<NodeId>>,
    start_tag: Option<&'a str>,
    /// Stop at announced nodes instead of walking to the root.
    trust_settled: bool,
}

impl ChainLookup for ChainSource<'_> {
    fn is_tool_root(&self, id: NodeId) -> bool {
        self.state.tool_root == Some(id)
    }

    fn is_internal(&self, id: NodeId) -> bool {
        if self.config.internal_type_tags.is_empty() {
            return false;
        }
        if let Some(tag) = self.state.table.get(id).and_then(Node::type_tag) {
            return self.config.is_internal_type(tag);
        }
        if id == self.start {
            if let Some(tag) = self.start_tag {
                return self.config.is_internal_type(tag);
            }
        }
        self.provider
            .type_tag(id)
            .is_some_and(|tag| self.config.is_internal_type(&tag))
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        if let Some(node) = self.state.table.get(id) {
            return node.parent();
        }
        if id == self.start {
            if let Some(parent) = self.start_parent {
                return parent;
            }
        }
        self.provider.parent(id)
    }

    fn is_settled(&self, id: NodeId) -> bool {
        // A node with an undelivered move may be headed into the tool.
        self.trust_settled
            && self.state.visible.contains(&id)
            && !self.state.deferred_reparents.contains(&id)
    }
}

/// The object lifecycle registry.
///
/// Create one per attached target with [`Registry::new`] and share the
/// returned `Arc` with every call site.
pub struct Registry {
    config: RegistryConfig,
    provider: Arc<dyn TypeInfoProvider>,
    scheduler: Arc<dyn HostScheduler>,
    state: ReentrantMutex<RefCell<RegistryState>>,
    subscribers: Observers<RegistryEvent>,
    needs_discovery: AtomicBool,
    me: Weak<Registry>,
}

impl Registry {
    /// Create a registry. It buffers notifications until [`initialize`] is
    /// called.
    ///
    /// [`initialize`]: Registry::initialize
    pub fn new(
        config: RegistryConfig,
        provider: Arc<dyn TypeInfoProvider>,
        scheduler: Arc<dyn HostScheduler>,
    ) -> Arc<Self> {
        let needs_discovery = config.attached_late;
        Arc::new_cyclic(|me| Self {
            config,
            provider,
            scheduler,
            state: ReentrantMutex::new(RefCell::new(RegistryState::default())),
            subscribers: Observers::new(),
            needs_discovery: AtomicBool::new(needs_discovery),
            me: me.clone(),
        })
    }

    /// Mark startup as complete and replay everything buffered before it.
    pub fn initialize(&self) {
        let _guard = self.state.lock();
        let buffered = self.with_state(|st| {
            if st.initialized {
                return None;
            }
            st.initialized = true;
            Some(std::mem::take(&mut st.pre_init))
        });
        let Some(buffered) = buffered else {
            return;
        };

        debug!(buffered = buffered.len(), "registry initialized");
        for (id, entry) in buffered {
            if let Some(entry) = entry {
                self.object_added(id, entry.parent, entry.type_tag.as_deref(), false);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Notifications (any thread)
    // ------------------------------------------------------------------------

    /// Report that an object exists.
    ///
    /// `type_tag` may be `None` when the type is not known yet, typically
    /// because the object is still being constructed; it is fetched from the
    /// host when the creation is finalized. `from_construction` marks reports
    /// raised from inside the object's constructor, which are always queued.
    pub fn object_added(
        &self,
        id: NodeId,
        parent: Option<NodeId>,
        type_tag: Option<&str>,
        from_construction: bool,
    ) {
        if IgnoreScope::is_active() {
            trace!(%id, "add ignored in tool scope");
            return;
        }

        let _guard = self.state.lock();
        let initialized = self.with_state(|st| {
            if st.initialized {
                return true;
            }
            let entry = st.pre_init.entry(id).or_insert(None);
            if entry.is_none() {
                *entry = Some(Reported {
                    parent,
                    type_tag: type_tag.map(str::to_string),
                });
            }
            false
        });
        if !initialized {
            trace!(%id, "buffered before initialization");
            return;
        }

        if self.with_state(|st| st.table.contains(id)) {
            trace!(%id, "add of known object");
            return;
        }

        // Ancestors share the tail of this chain, so one walk covers them.
        if self.filter_node(id, Some(parent), type_tag, true) {
            trace!(%id, "add filtered");
            return;
        }

        // A node's parent is always registered no later than the node.
        let Some(ancestors) = self.missing_ancestors(id, parent) else {
            return;
        };
        for (ancestor, reported) in ancestors {
            trace!(id = %ancestor, "back-filling ancestor");
            self.register(
                ancestor,
                reported.parent,
                reported.type_tag.as_deref(),
                from_construction,
            );
        }
        self.register(id, parent, type_tag, from_construction);
    }

    /// Report that an object is being destroyed.
    pub fn object_removed(&self, id: NodeId) {
        if IgnoreScope::is_active() {
            trace!(%id, "remove ignored in tool scope");
            return;
        }

        let _guard = self.state.lock();
        let removal = self.with_state(|st| {
            if !st.initialized {
                if let Some(entry) = st.pre_init.get_mut(&id) {
                    *entry = None;
                }
                return Removal::Ignored;
            }
            let Some(node) = st.table.remove(id) else {
                return Removal::Ignored;
            };
            st.deferred_reparents.shift_remove(&id);
            if !node.is_finalized() {
                st.queue.cancel_create(id);
                return Removal::StillBorn;
            }
            Removal::Announce
        });

        match removal {
            Removal::Ignored => trace!(%id, "remove of untracked object"),
            Removal::StillBorn => trace!(%id, "still-born object dropped"),
            Removal::Announce => {
                if self.scheduler.is_home_thread() {
                    self.announce_destroyed(id);
                } else {
                    self.with_state(|st| st.queue.push_destroy(id));
                    self.schedule_flush();
                }
            }
        }
    }

    /// Report that an object moved under `new_parent`.
    ///
    /// An unknown new parent is registered first. The notification goes out
    /// immediately when called on the home thread with nothing else pending;
    /// otherwise it waits for the end of the next flush.
    pub fn object_reparented(&self, id: NodeId, new_parent: Option<NodeId>) {
        if IgnoreScope::is_active() {
            return;
        }

        let _guard = self.state.lock();
        if !self.with_state(|st| st.initialized && st.table.contains(id)) {
            trace!(%id, "reparent of untracked object");
            return;
        }

        if let Some(parent) = new_parent {
            if !self.with_state(|st| st.table.contains(parent)) {
                self.backfill(parent);
            }
        }

        let on_home = self.scheduler.is_home_thread();
        let action = self.with_state(|st| {
            let Some(node) = st.table.get_mut(id) else {
                return Move::Nothing;
            };
            if node.parent() == new_parent {
                return Move::Nothing;
            }
            node.set_parent(new_parent);
            if !node.is_finalized() {
                // The pending `Created` will carry the new parent.
                return Move::Nothing;
            }
            if on_home && st.queue.is_empty() && st.deferred_reparents.is_empty() {
                Move::Deliver
            } else {
                st.deferred_reparents.insert(id);
                Move::Defer
            }
        });

        match action {
            Move::Nothing => {}
            Move::Deliver => self.deliver_reparent(id),
            Move::Defer => {
                trace!(%id, "reparent deferred");
                self.schedule_flush();
            }
        }
    }

    // ------------------------------------------------------------------------
    // Flush (home thread)
    // ------------------------------------------------------------------------

    /// Deliver everything queued so far. Home thread only; calls from other
    /// threads are ignored.
    pub fn process_queued_changes(&self) {
        if !self.scheduler.is_home_thread() {
            warn!("process_queued_changes called off the home thread");
            return;
        }

        let _guard = self.state.lock();
        let (changes, cycles) = self.with_state(|st| {
            st.flush_pending = false;
            (st.queue.take(), std::mem::take(&mut st.deferred_cycles))
        });

        if !changes.is_empty() {
            debug!(changes = changes.len(), "processing queued changes");
        }

        for id in cycles {
            self.emit(RegistryEvent::CycleDetected { id });
        }

        for change in changes {
            match change.kind {
                ChangeKind::Create => self.finalize_creation(change.id),
                ChangeKind::Destroy => self.announce_destroyed(change.id),
            }
        }

        let reparents = self.with_state(|st| std::mem::take(&mut st.deferred_reparents));
        for id in reparents {
            self.deliver_reparent(id);
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Whether `id` is in the valid set (accepted and not yet removed).
    pub fn is_valid(&self, id: NodeId) -> bool {
        self.read_state(|st| st.table.contains(id))
    }

    /// Whether consumers have seen `Created` for `id` and not yet `Destroyed`.
    pub fn is_visible(&self, id: NodeId) -> bool {
        self.read_state(|st| st.visible.contains(&id))
    }

    /// Recorded parent of a valid node.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.read_state(|st| st.table.parent_of(id))
    }

    /// Type tag of a valid node, asking the host if it is not known yet.
    pub fn type_tag(&self, id: NodeId) -> Option<String> {
        let _guard = self.state.lock();
        let (tracked, known) = self.read_state(|st| match st.table.get(id) {
            Some(node) => (true, node.type_tag().map(|t| t.to_string())),
            None => (false, None),
        });
        if !tracked || known.is_some() {
            return known;
        }

        let fetched = self.provider.type_tag(id)?;
        self.with_state(|st| {
            if let Some(node) = st.table.get_mut(id) {
                node.set_type_tag(&fetched);
            }
        });
        Some(fetched)
    }

    /// Run the full filter walk for `id`, up to the root.
    ///
    /// Returns `true` if `id` or one of its ancestors belongs to the tool. A
    /// cyclic parent chain also counts as filtered and is reported as
    /// [`RegistryEvent::CycleDetected`].
    pub fn is_filtered(&self, id: NodeId) -> bool {
        let _guard = self.state.lock();
        self.filter_node(id, None, None, false)
    }

    /// Number of valid nodes.
    pub fn len(&self) -> usize {
        self.read_state(|st| st.table.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of queued, undelivered changes.
    pub fn pending_changes(&self) -> usize {
        self.read_state(|st| st.queue.len())
    }

    pub fn is_initialized(&self) -> bool {
        self.read_state(|st| st.initialized)
    }

    /// Whether early creations may have been missed and a discovery walk is
    /// still required.
    pub fn needs_discovery(&self) -> bool {
        self.needs_discovery.load(Ordering::SeqCst)
    }

    pub fn mark_discovery_complete(&self) {
        if self.needs_discovery.swap(false, Ordering::SeqCst) {
            debug!("discovery complete");
        }
    }

    /// Designate the tool's own root object. It and its descendants are
    /// filtered from now on. Nodes already announced are not re-checked.
    pub fn set_tool_root(&self, root: Option<NodeId>) {
        self.with_state(|st| st.tool_root = root);
    }

    pub fn tool_root(&self) -> Option<NodeId> {
        self.read_state(|st| st.tool_root)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The host's reflection provider.
    pub fn provider(&self) -> &Arc<dyn TypeInfoProvider> {
        &self.provider
    }

    // ------------------------------------------------------------------------
    // Subscribers
    // ------------------------------------------------------------------------

    /// Receive every event the registry emits. Callbacks run on the home
    /// thread with the registry lock held. They may query the registry and
    /// report new changes; those land in the queue for the next flush.
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn with_state<R>(&self, f: impl FnOnce(&mut RegistryState) -> R) -> R {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    fn read_state<R>(&self, f: impl FnOnce(&RegistryState) -> R) -> R {
        let guard = self.state.lock();
        let state = guard.borrow();
        f(&state)
    }

    /// Unknown ancestors of a node about to be added, closest to the root
    /// first, as the host reports them.
    ///
    /// Returns `None` when the chain is longer than the configured bound or
    /// loops back on itself before reaching a known node or a root.
    fn missing_ancestors(
        &self,
        id: NodeId,
        parent: Option<NodeId>,
    ) -> Option<Vec<(NodeId, Reported)>> {
        let limit = self.config.max_ancestor_depth;
        let threshold = self.config.cycle_guard_threshold;
        let mut chain: Vec<(NodeId, Reported)> = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut current = parent;

        while let Some(ancestor) = current {
            if self.read_state(|st| st.table.contains(ancestor)) {
                break;
            }
            if chain.len() >= limit {
                warn!(%id, limit, "ancestor chain too deep, add dropped");
                return None;
            }
            if (chain.len() >= threshold && !visited.insert(ancestor)) || ancestor == id {
                warn!(%id, at = %ancestor, "ancestor chain loops, add dropped");
                return None;
            }

            let reported = Reported {
                parent: self.provider.parent(ancestor),
                type_tag: self.provider.type_tag(ancestor),
            };
            current = reported.parent;
            chain.push((ancestor, reported));
        }

        chain.reverse();
        Some(chain)
    }

    /// Insert one node whose parent is already valid, then queue or finalize
    /// its creation.
    fn register(
        &self,
        id: NodeId,
        parent: Option<NodeId>,
        type_tag: Option<&str>,
        from_construction: bool,
    ) {
        let on_home = self.scheduler.is_home_thread();
        let queued = self.with_state(|st| {
            if st.table.contains(id) {
                return None;
            }
            if parent.is_some_and(|p| !st.table.contains(p)) {
                return None;
            }
            let parent_pending = parent.is_some_and(|p| st.table.is_pending(p));
            st.table.insert(Node::new(id, parent, type_tag));
            let queued = from_construction || parent_pending || !on_home;
            if queued {
                st.queue.push_create(id);
            }
            Some(queued)
        });

        match queued {
            None => trace!(%id, parent = ?parent, "registration skipped"),
            Some(true) => {
                trace!(%id, parent = ?parent, "creation queued");
                self.schedule_flush();
            }
            Some(false) => {
                trace!(%id, parent = ?parent, "object added");
                self.finalize_creation(id);
            }
        }
    }

    /// Register an object the host told us about only indirectly.
    fn backfill(&self, id: NodeId) {
        let parent = self.provider.parent(id);
        let type_tag = self.provider.type_tag(id);
        trace!(%id, "back-filling object");
        self.object_added(id, parent, type_tag.as_deref(), false);
    }

    /// Make a queued creation visible, together with any pending ancestors.
    fn finalize_creation(&self, id: NodeId) {
        let _guard = self.state.lock();
        let chain = self.read_state(|st| {
            if !st.table.is_pending(id) {
                return None;
            }
            let mut chain = st
                .table
                .pending_ancestors(id, self.config.max_ancestor_depth);
            chain.push(id);
            Some(chain)
        });
        let Some(chain) = chain else {
            trace!(%id, "nothing to finalize");
            return;
        };

        for node in chain {
            self.finalize_one(node);
        }
    }

    /// Finalize a single node whose ancestors have been dealt with.
    fn finalize_one(&self, id: NodeId) {
        let needs_tag = match self.read_state(|st| {
            st.table
                .get(id)
                .map(|node| (node.is_finalized(), node.type_tag().is_none()))
        }) {
            None => {
                trace!(%id, "stale creation dropped");
                return;
            }
            Some((true, _)) => return,
            Some((false, needs_tag)) => needs_tag,
        };

        if needs_tag {
            if let Some(tag) = self.provider.type_tag(id) {
                self.with_state(|st| {
                    if let Some(node) = st.table.get_mut(id) {
                        node.set_type_tag(&tag);
                    }
                });
            }
        }

        // The parent may have been set only after construction started.
        if self.filter_node(id, None, None, true) {
            debug!(%id, "creation filtered at finalization");
            self.with_state(|st| {
                st.table.remove(id);
                st.queue.cancel_create(id);
            });
            return;
        }

        let outcome = self.with_state(|st| {
            let parent = st.table.get(id)?.parent();
            st.queue.cancel_create(id);
            // Parents are announced before their children or not at all.
            if parent.is_some_and(|p| !st.visible.contains(&p)) {
                st.table.remove(id);
                return Some(Err(parent));
            }
            if let Some(node) = st.table.get_mut(id) {
                node.mark_finalized();
            }
            st.visible.insert(id);
            Some(Ok(parent))
        });

        match outcome {
            None => {}
            Some(Err(parent)) => debug!(%id, parent = ?parent, "parent not announced, creation dropped"),
            Some(Ok(parent)) => self.emit(RegistryEvent::Created { id, parent }),
        }
    }

    fn announce_destroyed(&self, id: NodeId) {
        let _guard = self.state.lock();
        if self.with_state(|st| st.visible.remove(&id)) {
            self.emit(RegistryEvent::Destroyed { id });
        }
    }

    /// Drop `id` and every valid node below it, announcing each one that
    /// was visible, parents first.
    fn drop_subtree(&self, id: NodeId) {
        let _guard = self.state.lock();
        let announced = self.with_state(|st| {
            let mut ids = vec![id];
            ids.extend(st.table.descendants(id));

            let mut announced = Vec::new();
            for node in ids {
                if st.table.remove(node).is_none() {
                    continue;
                }
                st.queue.cancel_create(node);
                st.deferred_reparents.shift_remove(&node);
                if st.visible.remove(&node) {
                    announced.push(node);
                }
            }
            announced
        });

        debug!(%id, dropped = announced.len(), "subtree dropped");
        for node in announced {
            self.emit(RegistryEvent::Destroyed { id: node });
        }
    }

    fn deliver_reparent(&self, id: NodeId) {
        let _guard = self.state.lock();
        let parent = self.read_state(|st| {
            st.table
                .get(id)
                .filter(|node| node.is_finalized())
                .map(Node::parent)
        });
        let Some(parent) = parent else {
            return;
        };

        if self.filter_node(id, None, None, true) {
            debug!(%id, "reparented into a filtered subtree");
            self.drop_subtree(id);
            return;
        }

        if let Some(parent) = parent {
            if self.read_state(|st| st.table.is_pending(parent)) {
                self.finalize_creation(parent);
            }
            if !self.is_visible(parent) {
                debug!(%id, %parent, "reparented under an untracked object");
                self.drop_subtree(id);
                return;
            }
        }

        self.emit(RegistryEvent::Reparented { id, parent });
    }

    /// Run the filter walk for `id`. With `trust_settled`, the walk stops at
    /// the first announced ancestor instead of going up to the root.
    fn filter_node(
        &self,
        id: NodeId,
        parent: Option<Option<NodeId>>,
        type_tag: Option<&str>,
        trust_settled: bool,
    ) -> bool {
        let verdict = self.read_state(|st| {
            let source = ChainSource {
                state: st,
                provider: self.provider.as_ref(),
                config: &self.config,
                start: id,
                start_parent: parent,
                start_tag: type_tag,
                trust_settled,
            };
            filter::walk(id, &source, self.config.cycle_guard_threshold)
        });

        match verdict {
            Verdict::Tracked => false,
            Verdict::Filtered(FilterReason::Cycle(at)) => {
                warn!(%id, %at, "cycle in parent chain, treating as filtered");
                self.report_cycle(id);
                true
            }
            Verdict::Filtered(reason) => {
                trace!(%id, ?reason, "filtered");
                true
            }
        }
    }

    fn report_cycle(&self, id: NodeId) {
        if self.scheduler.is_home_thread() {
            self.emit(RegistryEvent::CycleDetected { id });
        } else {
            self.with_state(|st| st.deferred_cycles.push(id));
            self.schedule_flush();
        }
    }

    /// Make sure exactly one flush task is pending.
    fn schedule_flush(&self) {
        let _guard = self.state.lock();
        if self.with_state(|st| std::mem::replace(&mut st.flush_pending, true)) {
            return;
        }

        let me = self.me.clone();
        let task: Task = Box::new(move || {
            if let Some(registry) = me.upgrade() {
                registry.process_queued_changes();
            }
        });

        let scheduled = if self.scheduler.is_home_thread() {
            self.scheduler.schedule_once(task)
        } else {
            self.scheduler.run_on_home_thread(task)
        };

        if let Err(err) = scheduled {
            warn!(%err, "failed to schedule flush");
            self.with_state(|st| st.flush_pending = false);
        }
    }

    fn emit(&self, event: RegistryEvent) {
        trace!(?event, "emit");
        self.subscribers.notify(&event);
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("valid", &self.len())
            .field("pending_changes", &self.pending_changes())
            .field("initialized", &self.is_initialized())
            .field("needs_discovery", &self.needs_discovery())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HomeLoop, NoReflection, ObjectArena};
    use parking_lot::Mutex;
    use std::thread;

    struct Harness {
        arena: Arc<ObjectArena>,
        home: Arc<HomeLoop>,
        registry: Arc<Registry>,
        events: Arc<Mutex<Vec<RegistryEvent>>>,
    }

    impl Harness {
        fn new(config: RegistryConfig) -> Self {
            let arena = Arc::new(ObjectArena::new());
            let home = HomeLoop::new();
            let registry = Registry::new(config, arena.clone(), home.clone());
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = events.clone();
            registry.subscribe(move |event| sink.lock().push(*event));
            Self {
                arena,
                home,
                registry,
                events,
            }
        }

        fn started() -> Self {
            let harness = Self::new(RegistryConfig::default());
            harness.registry.initialize();
            harness
        }

        fn flush(&self) -> usize {
            self.home.run_pending().unwrap()
        }

        fn take_events(&self) -> Vec<RegistryEvent> {
            std::mem::take(&mut *self.events.lock())
        }

        /// Create in the arena and report it the way a constructor would.
        fn construct(&self, parent: Option<NodeId>, type_tag: &str) -> NodeId {
            let id = self.arena.create(parent, type_tag);
            self.registry.object_added(id, parent, None, true);
            id
        }
    }

    #[test]
    fn buffers_until_initialized() {
        let h = Harness::new(RegistryConfig::default());
        let id = h.arena.create(None, "Application");

        h.registry.object_added(id, None, Some("Application"), true);
        assert!(!h.registry.is_valid(id));
        assert!(h.take_events().is_empty());

        h.registry.initialize();
        assert!(h.registry.is_valid(id));
        assert_eq!(
            h.take_events(),
            vec![RegistryEvent::Created { id, parent: None }]
        );
    }

    #[test]
    fn removal_before_initialization_strikes_buffer() {
        let h = Harness::new(RegistryConfig::default());
        let id = h.arena.create(None, "Timer");

        h.registry.object_added(id, None, None, false);
        h.registry.object_removed(id);
        h.registry.initialize();

        assert!(!h.registry.is_valid(id));
        assert!(h.take_events().is_empty());
    }

    #[test]
    fn buffered_adds_replay_once_in_arrival_order() {
        let h = Harness::new(RegistryConfig::default());
        let ids: Vec<NodeId> = (0..3).map(|_| h.arena.create(None, "Timer")).collect();

        for id in ids.iter().rev() {
            h.registry.object_added(*id, None, None, false);
        }
        h.registry.object_added(ids[1], None, None, true);
        h.registry.object_removed(ids[0]);
        h.registry.object_added(ids[0], None, None, false);
        h.registry.initialize();

        let created: Vec<NodeId> = h.take_events().iter().map(RegistryEvent::id).collect();
        assert_eq!(created, vec![ids[2], ids[1], ids[0]]);
        assert_eq!(h.registry.len(), 3);
    }

    #[test]
    fn home_thread_add_finalizes_immediately() {
        let h = Harness::started();
        let id = h.arena.create(None, "Application");

        h.registry.object_added(id, None, Some("Application"), false);

        assert!(h.registry.is_visible(id));
        assert_eq!(h.registry.pending_changes(), 0);
        assert_eq!(
            h.take_events(),
            vec![RegistryEvent::Created { id, parent: None }]
        );
    }

    #[test]
    fn construction_add_waits_for_flush() {
        let h = Harness::started();
        let id = h.construct(None, "Application");

        assert!(h.registry.is_valid(id));
        assert!(!h.registry.is_visible(id));
        assert!(h.take_events().is_empty());

        h.flush();
        assert_eq!(
            h.take_events(),
            vec![RegistryEvent::Created { id, parent: None }]
        );
        assert_eq!(h.registry.type_tag(id).as_deref(), Some("Application"));
    }

    #[test]
    fn duplicate_add_is_a_no_op() {
        let h = Harness::started();
        let id = h.construct(None, "Application");
        h.registry.object_added(id, None, None, true);
        h.registry.object_added(id, None, None, false);

        assert_eq!(h.registry.pending_changes(), 1);
        h.flush();
        assert_eq!(h.take_events().len(), 1);
    }

    #[test]
    fn still_born_objects_emit_nothing() {
        let h = Harness::started();
        let id = h.construct(None, "Timer");
        h.registry.object_removed(id);

        assert_eq!(h.registry.pending_changes(), 0);
        h.flush();
        assert!(h.take_events().is_empty());
        assert!(!h.registry.is_valid(id));
    }

    #[test]
    fn removing_twice_is_idempotent() {
        let h = Harness::started();
        let id = h.arena.create(None, "Timer");
        h.registry.object_added(id, None, None, false);
        h.take_events();

        h.registry.object_removed(id);
        h.registry.object_removed(id);
        h.flush();

        assert_eq!(h.take_events(), vec![RegistryEvent::Destroyed { id }]);
    }

    #[test]
    fn foreign_thread_changes_are_queued_and_coalesced() {
        let h = Harness::started();
        let ids: Vec<NodeId> = (0..5).map(|_| h.arena.create(None, "Worker")).collect();

        thread::scope(|s| {
            s.spawn(|| {
                for id in &ids {
                    h.registry.object_added(*id, None, None, false);
                }
                h.registry.object_removed(ids[0]);
            });
        });

        // Four creations survive; one flush task for all of them.
        assert_eq!(h.registry.pending_changes(), 4);
        assert!(h.take_events().is_empty());
        assert_eq!(h.flush(), 1);

        let created: Vec<NodeId> = h.take_events().iter().map(RegistryEvent::id).collect();
        assert_eq!(created, ids[1..].to_vec());
    }

    #[test]
    fn foreign_thread_removal_of_visible_node_is_deferred() {
        let h = Harness::started();
        let id = h.arena.create(None, "Worker");
        h.registry.object_added(id, None, None, false);
        h.take_events();

        thread::scope(|s| {
            s.spawn(|| h.registry.object_removed(id));
        });

        assert!(h.take_events().is_empty());
        h.flush();
        assert_eq!(h.take_events(), vec![RegistryEvent::Destroyed { id }]);
    }

    #[test]
    fn unknown_parent_is_backfilled_first() {
        let h = Harness::started();
        let parent = h.arena.create(None, "Window");
        let child = h.arena.create(Some(parent), "Button");

        h.registry.object_added(child, Some(parent), None, false);

        assert_eq!(
            h.take_events(),
            vec![
                RegistryEvent::Created { id: parent, parent: None },
                RegistryEvent::Created { id: child, parent: Some(parent) },
            ]
        );
    }

    #[test]
    fn child_of_queued_parent_is_queued_too() {
        let h = Harness::started();
        let parent = h.construct(None, "Window");
        let child = h.arena.create(Some(parent), "Button");

        h.registry.object_added(child, Some(parent), None, false);
        assert!(h.take_events().is_empty());

        h.flush();
        let order: Vec<NodeId> = h.take_events().iter().map(RegistryEvent::id).collect();
        assert_eq!(order, vec![parent, child]);
    }

    #[test]
    fn tool_root_subtree_is_filtered() {
        let h = Harness::started();
        let tool = h.arena.create(None, "InspectorWindow");
        let inner = h.arena.create(Some(tool), "Label");
        h.registry.set_tool_root(Some(tool));

        h.registry.object_added(tool, None, None, false);
        h.registry.object_added(inner, Some(tool), None, false);

        assert!(!h.registry.is_valid(tool));
        assert!(!h.registry.is_valid(inner));
        assert!(h.registry.is_filtered(inner));
        assert!(h.take_events().is_empty());
    }

    #[test]
    fn internal_type_is_filtered_once_known() {
        let config = RegistryConfig::default().with_internal_type("InspectorAgent");
        let h = Harness::new(config);
        h.registry.initialize();

        // Still a plain object while its constructor runs.
        let agent = h.construct(None, "Object");
        assert!(h.registry.is_valid(agent));
        h.arena.set_type_tag(agent, "InspectorAgent");

        h.flush();
        assert!(!h.registry.is_valid(agent));
        assert!(h.take_events().is_empty());
    }

    #[test]
    fn reparent_on_home_thread_is_immediate() {
        let h = Harness::started();
        let p1 = h.arena.create(None, "P1");
        let p2 = h.arena.create(None, "P2");
        let c = h.arena.create(Some(p1), "C");
        h.registry.object_added(p1, None, None, false);
        h.registry.object_added(p2, None, None, false);
        h.registry.object_added(c, Some(p1), None, false);
        h.take_events();

        h.arena.set_parent(c, Some(p2));
        h.registry.object_reparented(c, Some(p2));

        assert_eq!(
            h.take_events(),
            vec![RegistryEvent::Reparented { id: c, parent: Some(p2) }]
        );
        assert_eq!(h.registry.parent_of(c), Some(p2));

        // Same parent again: nothing to say.
        h.registry.object_reparented(c, Some(p2));
        assert!(h.take_events().is_empty());
    }

    #[test]
    fn reparent_of_queued_node_is_folded_into_creation() {
        let h = Harness::started();
        let p1 = h.arena.create(None, "P1");
        let p2 = h.arena.create(None, "P2");
        h.registry.object_added(p1, None, None, false);
        h.registry.object_added(p2, None, None, false);
        h.take_events();

        let c = h.construct(Some(p1), "C");
        h.registry.object_reparented(c, Some(p2));
        h.flush();

        assert_eq!(
            h.take_events(),
            vec![RegistryEvent::Created { id: c, parent: Some(p2) }]
        );
    }

    #[test]
    fn reparent_into_tool_subtree_destroys() {
        let h = Harness::started();
        let tool = h.arena.create(None, "InspectorWindow");
        let c = h.arena.create(None, "Widget");
        let d = h.arena.create(Some(c), "Label");
        h.registry.set_tool_root(Some(tool));
        h.registry.object_added(c, None, None, false);
        h.registry.object_added(d, Some(c), None, false);
        h.take_events();

        h.arena.set_parent(c, Some(tool));
        h.registry.object_reparented(c, Some(tool));

        // The whole moved subtree goes, parent first.
        assert_eq!(
            h.take_events(),
            vec![
                RegistryEvent::Destroyed { id: c },
                RegistryEvent::Destroyed { id: d },
            ]
        );
        assert!(!h.registry.is_valid(c));
        assert!(!h.registry.is_valid(d));
        assert!(h.registry.is_empty());

        // The late removal of the descendant is a no-op.
        h.registry.object_removed(d);
        h.flush();
        assert!(h.take_events().is_empty());
    }

    #[test]
    fn deferred_reparent_into_tool_subtree_drops_queued_descendants() {
        let h = Harness::started();
        let tool = h.arena.create(None, "InspectorWindow");
        let c = h.arena.create(None, "Widget");
        h.registry.set_tool_root(Some(tool));
        h.registry.object_added(c, None, None, false);
        h.take_events();

        // d is still queued when c moves.
        let d = h.construct(Some(c), "Label");
        h.arena.set_parent(c, Some(tool));
        h.registry.object_reparented(c, Some(tool));
        h.flush();

        let events = h.take_events();
        assert!(!events.contains(&RegistryEvent::Created { id: d, parent: Some(c) }));
        assert_eq!(events.last(), Some(&RegistryEvent::Destroyed { id: c }));
        assert!(!h.registry.is_valid(d));
        assert_eq!(h.registry.pending_changes(), 0);
    }

    #[test]
    fn subscriber_may_report_during_emission() {
        let h = Harness::started();
        let first = h.construct(None, "Window");

        let reported = Arc::new(Mutex::new(None));
        let slot = reported.clone();
        let registry = Arc::downgrade(&h.registry);
        let arena = h.arena.clone();
        h.registry.subscribe(move |event| {
            let RegistryEvent::Created { id, .. } = *event else {
                return;
            };
            if id != first {
                return;
            }
            if let Some(registry) = registry.upgrade() {
                let child = arena.create(Some(id), "Button");
                registry.object_added(child, Some(id), None, true);
                *slot.lock() = Some(child);
            }
        });

        assert_eq!(h.flush(), 1);
        let child = reported.lock().take().expect("subscriber reported a child");
        assert_eq!(
            h.take_events(),
            vec![RegistryEvent::Created { id: first, parent: None }]
        );

        // The child went into a fresh queue with its own flush.
        assert!(h.registry.is_valid(child));
        assert!(!h.registry.is_visible(child));
        assert_eq!(h.registry.pending_changes(), 1);

        assert_eq!(h.flush(), 1);
        assert_eq!(
            h.take_events(),
            vec![RegistryEvent::Created { id: child, parent: Some(first) }]
        );
        assert_eq!(h.registry.pending_changes(), 0);
    }

    #[test]
    fn chain_beyond_depth_bound_is_dropped_whole() {
        let config = RegistryConfig {
            max_ancestor_depth: 8,
            ..RegistryConfig::default()
        };
        let h = Harness::new(config);
        h.registry.initialize();

        let mut chain = Vec::new();
        let mut parent = None;
        for _ in 0..20 {
            let id = h.arena.create(parent, "Item");
            chain.push(id);
            parent = Some(id);
        }

        h.registry.object_added(chain[19], Some(chain[18]), None, false);
        assert!(!h.registry.is_valid(chain[19]));
        assert!(h.registry.is_empty());
        assert!(h.take_events().is_empty());

        // A chain within the bound still resolves.
        h.registry.object_added(chain[5], Some(chain[4]), None, false);
        assert_eq!(h.registry.len(), 6);
        let order: Vec<NodeId> = h.take_events().iter().map(RegistryEvent::id).collect();
        assert_eq!(order, chain[..6].to_vec());
    }

    #[test]
    fn deep_chain_is_backfilled_without_recursion() {
        let h = Harness::started();
        let mut chain = Vec::new();
        let mut parent = None;
        for _ in 0..3000 {
            let id = h.arena.create(parent, "Item");
            chain.push(id);
            parent = Some(id);
        }

        // Worker threads get a much smaller stack than the main thread.
        thread::scope(|s| {
            thread::Builder::new()
                .stack_size(256 * 1024)
                .spawn_scoped(s, || {
                    h.registry.object_added(chain[2999], Some(chain[2998]), None, false);
                })
                .unwrap();
        });

        assert_eq!(h.registry.len(), 3000);
        assert_eq!(h.registry.pending_changes(), 3000);
        h.flush();

        let order: Vec<NodeId> = h.take_events().iter().map(RegistryEvent::id).collect();
        assert_eq!(order, chain);
    }

    #[test]
    fn child_of_parent_filtered_at_finalization_is_dropped() {
        let config = RegistryConfig::default().with_internal_type("InspectorAgent");
        let h = Harness::new(config);
        h.registry.initialize();

        let parent = h.construct(None, "Object");
        let child = h.construct(Some(parent), "Label");
        h.arena.set_type_tag(parent, "InspectorAgent");

        h.flush();
        assert!(!h.registry.is_valid(parent));
        assert!(!h.registry.is_valid(child));
        assert!(h.take_events().is_empty());
    }

    #[test]
    fn without_reflection_reported_parents_become_roots() {
        let home = HomeLoop::new();
        let registry = Registry::new(
            RegistryConfig::default(),
            Arc::new(NoReflection),
            home.clone(),
        );
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        registry.subscribe(move |event| sink.lock().push(*event));
        registry.initialize();

        let parent = NodeId::from(1);
        let child = NodeId::from(2);
        registry.object_added(child, Some(parent), None, false);

        assert_eq!(
            *events.lock(),
            vec![
                RegistryEvent::Created { id: parent, parent: None },
                RegistryEvent::Created { id: child, parent: Some(parent) },
            ]
        );
        assert_eq!(registry.type_tag(child), None);
    }

    #[test]
    fn ignore_scope_hides_notifications() {
        let h = Harness::started();
        let id = h.arena.create(None, "InspectorWindow");
        {
            let _scope = IgnoreScope::enter();
            h.registry.object_added(id, None, None, false);
        }
        assert!(!h.registry.is_valid(id));
    }

    #[test]
    fn flush_off_home_thread_is_ignored() {
        let h = Harness::started();
        let id = h.construct(None, "Timer");

        thread::scope(|s| {
            s.spawn(|| h.registry.process_queued_changes());
        });

        assert_eq!(h.registry.pending_changes(), 1);
        assert!(h.take_events().is_empty());
        h.flush();
        assert_eq!(h.take_events().len(), 1);
        assert!(h.registry.is_visible(id));
    }

    #[test]
    fn scheduling_failure_is_absorbed() {
        let h = Harness::started();
        h.home.close();

        let id = h.construct(None, "Timer");
        assert!(h.registry.is_valid(id));
        assert_eq!(h.registry.pending_changes(), 1);

        // A manual flush still delivers.
        h.registry.process_queued_changes();
        assert_eq!(h.take_events().len(), 1);
    }

    #[test]
    fn attached_late_needs_discovery_until_marked() {
        let config = RegistryConfig {
            attached_late: true,
            ..RegistryConfig::default()
        };
        let h = Harness::new(config);
        assert!(h.registry.needs_discovery());
        h.registry.mark_discovery_complete();
        assert!(!h.registry.needs_discovery());
    }
}
