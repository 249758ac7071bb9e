//! Source positions, grounded the same way the teacher's `shared/models/span.rs`
//! pairs a small `Copy` position type with a richer range type, except what
//! this engine's tokens and diagnostics need is a single point, not a range
//! (cppcheck's own `CTU::Location`, not a `Span`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single point in a translation unit's source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub file_index: u32,
    pub line: u32,
    pub column: u32,
}

impl Location {
    #[inline]
    pub fn new(file_index: u32, line: u32, column: u32) -> Self {
        Self {
            file_index,
            line,
            column,
        }
    }

    /// A placeholder location for synthetic tokens that never reached real
    /// source text (internal-error diagnostics, test fixtures).
    #[inline]
    pub fn synthetic() -> Self {
        Self::new(0, 0, 0)
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::synthetic()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One hop in a diagnostic's call stack: a location plus a human-readable
/// hint about what happens there ("called from here", "condition is here").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationHint {
    pub location: Location,
    pub resolved_file: String,
    pub original_file: String,
    pub info: String,
}

impl LocationHint {
    pub fn new(location: Location, file: impl Into<String>, info: impl Into<String>) -> Self {
        let file = file.into();
        Self {
            location,
            resolved_file: file.clone(),
            original_file: file,
            info: info.into(),
        }
    }
}
