//! Object Arena
//!
//! An in-memory model of a live object graph, used as the reference
//! [`TypeInfoProvider`]. Objects live in slots; destroying an object frees its
//! slot and the next object to reuse it gets a bumped generation, so handles
//! to the dead object stop resolving.
//!
//! The arena mirrors whatever the host tells it. It does not reject parent
//! cycles, which lets tests reproduce a host that is mid-update.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::TypeInfoProvider;
use crate::graph::NodeId;

#[derive(Debug, Clone)]
struct ObjectEntry {
    generation: u32,
    parent: Option<NodeId>,
    type_tag: String,
    children: Vec<NodeId>,
}

/// Concurrent slot-based object store.
#[derive(Debug)]
pub struct ObjectArena {
    objects: DashMap<u64, ObjectEntry>,
    /// Freed slots with the generation they last held.
    free_slots: Mutex<Vec<(u64, u32)>>,
    next_slot: AtomicU64,
}

impl ObjectArena {
    /// Create an empty arena. Slot numbers start at 1.
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            free_slots: Mutex::new(Vec::new()),
            next_slot: AtomicU64::new(1),
        }
    }

    /// Create an object. A dead or missing parent makes it a root.
    pub fn create(&self, parent: Option<NodeId>, type_tag: &str) -> NodeId {
        let recycled = self.free_slots.lock().pop();
        let id = match recycled {
            Some((slot, generation)) => NodeId::new(slot, generation.wrapping_add(1)),
            None => NodeId::new(self.next_slot.fetch_add(1, Ordering::Relaxed), 0),
        };

        let parent = parent.filter(|p| self.is_alive(*p));
        self.objects.insert(
            id.slot(),
            ObjectEntry {
                generation: id.generation(),
                parent,
                type_tag: type_tag.to_string(),
                children: Vec::new(),
            },
        );
        if let Some(p) = parent {
            if let Some(mut entry) = self.live_entry_mut(p) {
                entry.children.push(id);
            }
        }
        id
    }

    /// Destroy an object and its whole subtree.
    ///
    /// Returns the destroyed handles, each object before its children, which
    /// is the order a host reports destruction in.
    pub fn destroy(&self, id: NodeId) -> Vec<NodeId> {
        let mut destroyed = Vec::new();
        let Some(entry) = self.take_live(id) else {
            return destroyed;
        };

        if let Some(p) = entry.parent {
            if let Some(mut parent) = self.live_entry_mut(p) {
                parent.children.retain(|c| *c != id);
            }
        }

        destroyed.push(id);
        let mut stack: Vec<NodeId> = entry.children.into_iter().rev().collect();
        while let Some(child) = stack.pop() {
            if let Some(child_entry) = self.take_live(child) {
                destroyed.push(child);
                stack.extend(child_entry.children.into_iter().rev());
            }
        }
        destroyed
    }

    /// Move an object under a new parent. Returns `false` if the object is
    /// dead. A dead new parent makes the object a root.
    pub fn set_parent(&self, id: NodeId, new_parent: Option<NodeId>) -> bool {
        let new_parent = new_parent.filter(|p| self.is_alive(*p));

        let old_parent = match self.live_entry_mut(id) {
            Some(mut entry) => std::mem::replace(&mut entry.parent, new_parent),
            None => return false,
        };

        if let Some(old) = old_parent {
            if let Some(mut entry) = self.live_entry_mut(old) {
                entry.children.retain(|c| *c != id);
            }
        }
        if let Some(new) = new_parent {
            if let Some(mut entry) = self.live_entry_mut(new) {
                entry.children.push(id);
            }
        }
        true
    }

    /// Change the reported type of a live object. Constructors run from the
    /// base type up, so the type of an object under construction changes.
    pub fn set_type_tag(&self, id: NodeId, type_tag: &str) -> bool {
        match self.live_entry_mut(id) {
            Some(mut entry) => {
                entry.type_tag = type_tag.to_string();
                true
            }
            None => false,
        }
    }

    /// Whether `id` names a live object of the current generation.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.objects
            .get(&id.slot())
            .is_some_and(|entry| entry.generation == id.generation())
    }

    /// Live objects without a parent.
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .objects
            .iter()
            .filter(|entry| entry.parent.is_none())
            .map(|entry| NodeId::new(*entry.key(), entry.generation))
            .collect();
        roots.sort();
        roots
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn live_entry_mut(
        &self,
        id: NodeId,
    ) -> Option<dashmap::mapref::one::RefMut<'_, u64, ObjectEntry>> {
        self.objects
            .get_mut(&id.slot())
            .filter(|entry| entry.generation == id.generation())
    }

    fn take_live(&self, id: NodeId) -> Option<ObjectEntry> {
        let (_, entry) = self
            .objects
            .remove_if(&id.slot(), |_, entry| entry.generation == id.generation())?;
        self.free_slots.lock().push((id.slot(), id.generation()));
        Some(entry)
    }
}

impl Default for ObjectArena {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeInfoProvider for ObjectArena {
    fn type_tag(&self, id: NodeId) -> Option<String> {
        self.objects
            .get(&id.slot())
            .filter(|entry| entry.generation == id.generation())
            .map(|entry| entry.type_tag.clone())
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.objects
            .get(&id.slot())
            .filter(|entry| entry.generation == id.generation())
            .and_then(|entry| entry.parent)
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.objects
            .get(&id.slot())
            .filter(|entry| entry.generation == id.generation())
            .map(|entry| entry.children.clone())
            .unwrap_or_default()
    }
}
