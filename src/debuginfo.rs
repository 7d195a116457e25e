//! Source location carried by config items.

use serde::{Deserialize, Serialize};

/// Path plus line/column span of the declaration that produced an item.
/// Embedded in error messages and in the persisted snapshot record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub path: String,
    pub first_line: u32,
    pub first_column: u32,
    pub last_line: u32,
    pub last_column: u32,
}

impl DebugInfo {
    pub fn new(
        path: impl Into<String>,
        first_line: u32,
        first_column: u32,
        last_line: u32,
        last_column: u32,
    ) -> Self {
        Self {
            path: path.into(),
            first_line,
            first_column,
            last_line,
            last_column,
        }
    }

    /// Location known only by file, e.g. generated items.
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

impl std::fmt::Display for DebugInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "in {}: {}:{}-{}:{}",
            self.path, self.first_line, self.first_column, self.last_line, self.last_column
        )
    }
}
