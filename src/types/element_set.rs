//! Orbital element set types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an element set (the object's catalogue number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementSetId(i64);

impl ElementSetId {
    /// Create a new ElementSetId.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw catalogue number.
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ElementSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ElementSetId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A two-line element set.
///
/// The lines are opaque to the scheduler and only interpreted by the
/// ephemeris engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSet {
    /// Element set identity.
    pub id: ElementSetId,
    /// Object name.
    pub object_name: String,
    /// First propagation line.
    pub line1: String,
    /// Second propagation line.
    pub line2: String,
}

impl ElementSet {
    /// Create a new element set.
    pub fn new(
        id: ElementSetId,
        object_name: impl Into<String>,
        line1: impl Into<String>,
        line2: impl Into<String>,
    ) -> Self {
        Self {
            id,
            object_name: object_name.into(),
            line1: line1.into(),
            line2: line2.into(),
        }
    }
}
