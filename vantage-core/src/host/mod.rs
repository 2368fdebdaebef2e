//! Host Collaborators
//!
//! The registry never touches the target's objects directly. Everything it
//! needs from the host environment goes through two small traits:
//!
//! - [`TypeInfoProvider`] answers reflection questions (type, parent,
//!   children) about a handle.
//! - [`HostScheduler`] runs tasks on the home thread.
//!
//! [`HomeLoop`] and [`ObjectArena`] are in-process implementations of the
//! two traits. They back the tests and serve as the reference host.

mod arena;
mod home_loop;

pub use arena::ObjectArena;
pub use home_loop::HomeLoop;

use crate::error::HostError;
use crate::graph::NodeId;

/// A unit of work handed to the home thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Reflection capabilities of the host.
///
/// Implementations must accept stale handles: a handle whose object is gone,
/// or whose slot now holds a newer generation, yields `None` or an empty list
/// instead of faulting.
pub trait TypeInfoProvider: Send + Sync {
    /// Type descriptor of the object, if it is alive and known.
    fn type_tag(&self, id: NodeId) -> Option<String>;

    /// Current parent of the object.
    fn parent(&self, id: NodeId) -> Option<NodeId>;

    /// Currently enumerable children of the object.
    fn children(&self, id: NodeId) -> Vec<NodeId>;
}

/// Provider for hosts without reflection. Knows nothing about anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReflection;

impl TypeInfoProvider for NoReflection {
    fn type_tag(&self, _id: NodeId) -> Option<String> {
        None
    }

    fn parent(&self, _id: NodeId) -> Option<NodeId> {
        None
    }

    fn children(&self, _id: NodeId) -> Vec<NodeId> {
        Vec::new()
    }
}

/// Access to the host's home thread.
pub trait HostScheduler: Send + Sync {
    /// Whether the calling thread is the home thread.
    fn is_home_thread(&self) -> bool;

    /// Queue `task` for execution on the home thread. Callable from any thread.
    fn run_on_home_thread(&self, task: Task) -> Result<(), HostError>;

    /// Queue `task` to run on the home thread at the next opportunity.
    /// Only valid when called from the home thread itself.
    fn schedule_once(&self, task: Task) -> Result<(), HostError>;
}
