//! Configuration object lifecycle engine.
//!
//! The engine ingests parsed configuration *items* (declarative
//! descriptions of objects to be instantiated) and drives them through
//! commit, validation, registration, activation and (optionally)
//! reload/rollback, producing the live in-memory set of typed config
//! objects the rest of the platform consumes.
//!
//! ```text
//! compiler → ConfigItem → ItemRegistry
//!                              ↓
//!                    LifecycleEngine::commit_items
//!            (instantiate → evaluate → validate → loaded → snapshot)
//!                              ↓
//!                 per-type finalization (load-dependency order)
//!                              ↓
//!                    LifecycleEngine::activate_items
//!                              ↓
//!                          live objects
//! ```
//!
//! External collaborators (the expression evaluator, the config compiler,
//! the persistence serializer and the dependency graph) are reached only
//! through the traits in [`expression`] and [`ports`].

pub mod context;
pub mod debuginfo;
pub mod error;
pub mod expression;
pub mod globals;
pub mod item;
pub mod lifecycle;
pub mod object;
pub mod ports;
pub mod registry;
pub mod snapshot;
pub mod types;
pub mod workqueue;

/// Dynamic key/value mapping used for item scopes, object extensions,
/// debug hints and script globals.
pub type Dictionary = serde_json::Map<String, serde_json::Value>;

pub use context::ActivationContext;
pub use debuginfo::DebugInfo;
pub use error::{ConfigError, Result};
pub use expression::{DebugHints, Expression, ScriptFrame};
pub use globals::ScriptGlobals;
pub use item::{ConfigItem, ConfigItemBuilder, CreationKind};
pub use lifecycle::{EngineOptions, LifecycleEngine};
pub use object::{ConfigObject, ValidationUtils, CONFIG_OBJECT_DELETED};
pub use ports::{DependencyGraph, ExpressionCompiler, ReloadCallback, SnapshotSink};
pub use registry::ItemRegistry;
pub use snapshot::PersistedItem;
pub use types::{FieldAttributes, FieldInfo, NameComposer, ObjectType, TypeRegistry};
pub use workqueue::WorkQueue;
