//! Persisted snapshot record emitted for every committed object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::debuginfo::DebugInfo;

/// One record per committed object, written to the compiler-context sink
/// for consumption by external tooling. `properties` holds the
/// configuration-mask fields; `debug_info` is the declaration span as a
/// `[path, first_line, first_column, last_line, last_column]` tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedItem {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    pub properties: Value,
    pub debug_hints: Value,
    pub debug_info: (String, u32, u32, u32, u32),
}

impl PersistedItem {
    pub(crate) fn debug_info_tuple(debug_info: &DebugInfo) -> (String, u32, u32, u32, u32) {
        (
            debug_info.path.clone(),
            debug_info.first_line,
            debug_info.first_column,
            debug_info.last_line,
            debug_info.last_column,
        )
    }
}
