//! Registry Configuration
//!
//! Tunables for the registry. Every field has a default, so an empty JSON
//! object is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Iterations of a parent-chain walk before it starts tracking visited nodes.
pub const DEFAULT_CYCLE_GUARD_THRESHOLD: usize = 100;

/// Longest ancestor chain followed by back-fill and finalization.
pub const DEFAULT_MAX_ANCESTOR_DEPTH: usize = 4096;

/// Configuration for a [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Steps a filter walk takes before switching to cycle detection.
    pub cycle_guard_threshold: usize,

    /// Maximum ancestor depth followed by back-fill and finalization.
    pub max_ancestor_depth: usize,

    /// Type tags that belong to the tool itself. Nodes with one of these
    /// tags, and all their descendants, are never tracked.
    pub internal_type_tags: Vec<String>,

    /// The registry attached to a target that was already running, so
    /// early creations were missed and a discovery walk is required.
    pub attached_late: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cycle_guard_threshold: DEFAULT_CYCLE_GUARD_THRESHOLD,
            max_ancestor_depth: DEFAULT_MAX_ANCESTOR_DEPTH,
            internal_type_tags: Vec::new(),
            attached_late: false,
        }
    }
}

impl RegistryConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would disable the loop guards.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_guard_threshold == 0 {
            return Err(ConfigError::Invalid(
                "cycle_guard_threshold must be at least 1".into(),
            ));
        }
        if self.max_ancestor_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_ancestor_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Whether `type_tag` is one of the tool's internal types.
    pub fn is_internal_type(&self, type_tag: &str) -> bool {
        self.internal_type_tags.iter().any(|t| t == type_tag)
    }

    /// Builder-style helper for marking a type tag as internal.
    pub fn with_internal_type(mut self, type_tag: impl Into<String>) -> Self {
        self.internal_type_tags.push(type_tag.into());
        self
    }
}
