//! Projections
//!
//! Views derived from the registry's event stream. They never look at the
//! target's objects, only at the events, so they can be rebuilt at any time by
//! replaying `Created` events for the visible set.
//!
//! - [`ListProjection`]: every visible node in one flat, identity-sorted list.
//! - [`TreeProjection`]: the same nodes arranged by parent, plus a set of
//!   marked nodes.
//!
//! Both are cheap to clone; clones share state. Each reports its own
//! structural changes to observers, which see the new state already applied.

mod list;
mod tree;

pub use list::{ListChange, ListProjection};
pub use tree::{TreeChange, TreeProjection};
