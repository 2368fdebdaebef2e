//! Vantage Core
//!
//! This crate provides the object tracking core of the Vantage inspector.
//! It implements:
//!
//! - An object lifecycle registry fed from any thread
//! - Ordered, filtered event delivery on a single home thread
//! - Flat and hierarchical projections of the live object set
//! - A discovery walk for targets attached after startup
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Identity handles and the table of tracked nodes
//! - `registry`: Notification intake, change queue, filtering, events
//! - `projection`: List and tree views driven by registry events
//! - `host`: Traits the host implements, plus in-process reference versions
//! - `discovery`: Fallback walk over the host's object graph
//!
//! # Example
//!
//! ```rust,ignore
//! use vantage_core::{HomeLoop, ObjectArena, Registry, RegistryConfig, TreeProjection};
//!
//! let arena = Arc::new(ObjectArena::new());
//! let home = HomeLoop::new();
//! let registry = Registry::new(RegistryConfig::default(), arena.clone(), home.clone());
//! let tree = TreeProjection::attach(&registry);
//! registry.initialize();
//!
//! // Any thread:
//! let window = arena.create(None, "Window");
//! registry.object_added(window, None, None, true);
//!
//! // Home thread, from its event loop:
//! home.run_pending()?;
//! assert_eq!(tree.children_of(None), vec![window]);
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod host;
pub mod observer;
pub mod projection;
pub mod registry;

pub use config::RegistryConfig;
pub use discovery::DiscoveryWalker;
pub use error::{ConfigError, HostError};
pub use graph::NodeId;
pub use host::{HomeLoop, HostScheduler, NoReflection, ObjectArena, TypeInfoProvider};
pub use observer::SubscriberId;
pub use projection::{ListChange, ListProjection, TreeChange, TreeProjection};
pub use registry::{IgnoreScope, Registry, RegistryEvent};
