//! Object Lifecycle Registry
//!
//! This module tracks the live objects of an attached target and publishes a
//! consistent, ordered stream of lifecycle events for them.
//!
//! # Concepts
//!
//! ## Valid set
//!
//! Every identity the registry accepted and has not yet seen destroyed. A
//! valid node is not necessarily visible to consumers: its creation may still
//! be waiting in the change queue.
//!
//! ## Change queue
//!
//! Creations reported from constructors or from foreign threads are queued
//! and delivered by a single coalesced flush on the home thread. A node that
//! dies before its flush is "still-born" and never produces any event.
//!
//! ## Filtering
//!
//! Objects that belong to the tool itself (its root object, or anything with
//! an internal type tag, and all their descendants) are never tracked.
//!
//! # Guarantees
//!
//! - `Created` for a parent precedes `Created` for its children.
//! - `Created` precedes any `Reparented` or `Destroyed` for the same node, and
//!   `Destroyed` is the last event for an identity.
//! - Every entry point is idempotent and silently ignores identities it does
//!   not know.

mod coordinator;
mod event;
mod filter;
mod queue;
mod scope;

pub use coordinator::Registry;
pub use event::RegistryEvent;
pub use queue::{ChangeKind, ChangeQueue, PendingChange};
pub use scope::IgnoreScope;
