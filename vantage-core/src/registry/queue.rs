//! Change Queue
//!
//! Creations and destructions reported off the home thread (or from inside a
//! constructor) wait here until the next flush delivers them in FIFO order.
//!
//! Two rules keep the queue small and correct:
//!
//! - At most one pending `Create` per identity.
//! - A destruction of an identity whose `Create` is still pending cancels the
//!   `Create` instead of queueing a `Destroy`; nobody has seen the node yet.
//!   The registry enforces the second rule; the queue provides
//!   [`ChangeQueue::cancel_create`].

use std::collections::{HashMap, VecDeque};

use crate::graph::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Destroy,
}

/// One queued change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingChange {
    pub id: NodeId,
    pub kind: ChangeKind,
}

/// FIFO of pending changes with an index of pending creations.
///
/// Cancelling a creation only drops it from the index. The entry stays in
/// the FIFO as a tombstone, recognised by its sequence number, and `take`
/// skips it.
#[derive(Debug, Default)]
pub struct ChangeQueue {
    entries: VecDeque<(u64, PendingChange)>,
    /// Pending creation of each identity, by sequence number.
    pending_creates: HashMap<NodeId, u64>,
    next_seq: u64,
    cancelled: usize,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a creation. Returns `false` if one is already pending.
    pub fn push_create(&mut self, id: NodeId) -> bool {
        if self.pending_creates.contains_key(&id) {
            return false;
        }
        let seq = self.push(id, ChangeKind::Create);
        self.pending_creates.insert(id, seq);
        true
    }

    /// Queue a destruction.
    pub fn push_destroy(&mut self, id: NodeId) {
        self.push(id, ChangeKind::Destroy);
    }

    /// Drop the pending creation of `id`, if any.
    pub fn cancel_create(&mut self, id: NodeId) -> bool {
        if self.pending_creates.remove(&id).is_none() {
            return false;
        }
        self.cancelled += 1;
        true
    }

    /// Move every live entry out, leaving an empty queue behind. Changes
    /// queued while the returned batch is being delivered land in the fresh
    /// queue.
    pub fn take(&mut self) -> Vec<PendingChange> {
        let pending_creates = std::mem::take(&mut self.pending_creates);
        self.cancelled = 0;
        self.entries
            .drain(..)
            .filter(|(seq, change)| match change.kind {
                ChangeKind::Create => pending_creates.get(&change.id) == Some(seq),
                ChangeKind::Destroy => true,
            })
            .map(|(_, change)| change)
            .collect()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len() - self.cancelled
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, id: NodeId, kind: ChangeKind) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back((seq, PendingChange { id, kind }));
        seq
    }
}
