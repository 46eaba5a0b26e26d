//! Unique identifiers for submitted work.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier of a submitted work unit.
///
/// Assigned at submission and used for tracing and for cancelling a unit
/// that is still waiting in a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkId(Ulid);

impl WorkId {
    /// Generate a new WorkId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for WorkId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
