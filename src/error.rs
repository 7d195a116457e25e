//! Typed error model for the lifecycle engine.
//!
//! Fatal per-commit failures (unknown type, duplicate definition, name
//! composition) and batch-level failures each map to exactly one variant.
//! Failures raised by external collaborators (evaluators, object hooks,
//! sinks) funnel through the transparent `Other` variant so they can cross
//! the work-queue boundary without losing their message.

use serde_json::Value;

use crate::debuginfo::DebugInfo;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A second, conflicting declaration for an already-registered
    /// (type, name) pair. Both source locations are part of the message.
    #[error("A configuration item of type '{type_name}' and name '{name}' already exists ({existing}), new declaration: {declaration}")]
    DuplicateDefinition {
        type_name: String,
        name: String,
        existing: DebugInfo,
        declaration: DebugInfo,
    },

    #[error("Type '{type_name}' does not exist ({debug_info})")]
    UnknownType {
        type_name: String,
        debug_info: DebugInfo,
    },

    /// A type with a name composer was handed an empty short name.
    #[error("Object name must not be empty ({debug_info})")]
    EmptyName { debug_info: DebugInfo },

    #[error("Could not determine name for object '{name}' of type '{type_name}'")]
    NameComposerFailure { type_name: String, name: String },

    /// Rejected by the item builder before registration.
    #[error("Invalid config item: {0}")]
    InvalidItem(String),

    #[error("Tried to access undefined script variable '{0}'")]
    UndefinedVariable(String),

    /// Produced by `ConfigObject::validate`. The commit pipeline attaches
    /// the debug hints collected during evaluation before propagating.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        debug_hints: Option<Value>,
    },

    /// The per-type finalization loop stalled: every remaining type still
    /// waits on another remaining type.
    #[error("Cyclic load dependency between types: {}", remaining.join(", "))]
    CyclicLoadDependency { remaining: Vec<String> },

    #[error("Callback failed to re-create object '{name}' of type '{type_name}'")]
    CallbackFailedToRecreate { type_name: String, name: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConfigError {
    /// Attach evaluation debug hints to a validation error; any other
    /// variant is passed through unchanged.
    pub(crate) fn with_debug_hints(self, hints: Value) -> Self {
        match self {
            ConfigError::Validation {
                message,
                debug_hints: None,
            } => ConfigError::Validation {
                message,
                debug_hints: Some(hints),
            },
            other => other,
        }
    }
}
