//! Type descriptors and the type registry.
//!
//! An [`ObjectType`] describes one config object type: how to instantiate a
//! blank object, its field metadata, the load-dependency ordering it
//! declares, an optional name composer, and the lookup into the type's live
//! object store. Types are supplied by the host and held in an explicit
//! [`TypeRegistry`] value.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bitflags::bitflags;

use crate::object::ConfigObject;

bitflags! {
    /// Field attribute mask. Configuration fields participate in
    /// validation and snapshot serialization; state fields carry runtime
    /// data and are migrated across reloads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FieldAttributes: u32 {
        const CONFIG = 1 << 0;
        const STATE = 1 << 1;
    }
}

/// Metadata for one object field; the field id is its position in
/// [`ObjectType::fields`].
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub attributes: FieldAttributes,
}

impl FieldInfo {
    pub fn config(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: FieldAttributes::CONFIG,
        }
    }

    pub fn state(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: FieldAttributes::STATE,
        }
    }
}

/// Per-type capability that derives the canonical object name from a short
/// name plus the instance (e.g. service names composed from their host).
pub trait NameComposer: Send + Sync {
    /// Returns the composed name, or an empty string if composition failed.
    fn make_name(&self, short_name: &str, object: &Arc<dyn ConfigObject>) -> String;
}

/// Descriptor for one config object type.
pub trait ObjectType: Send + Sync {
    fn name(&self) -> &str;

    /// Plural form used in log statistics.
    fn plural_name(&self) -> String {
        format!("{}s", self.name())
    }

    /// Create a blank, unregistered instance of this type.
    fn instantiate(&self) -> Arc<dyn ConfigObject>;

    /// Field metadata, indexed by field id.
    fn fields(&self) -> Vec<FieldInfo> {
        Vec::new()
    }

    /// Names of types whose `on_all_config_loaded` must complete before
    /// this type's runs.
    fn load_dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn name_composer(&self) -> Option<&dyn NameComposer> {
        None
    }

    /// Look up a live (registered) object of this type by name.
    fn get_object(&self, name: &str) -> Option<Arc<dyn ConfigObject>>;
}

/// Explicit registry of the config object types known to the process.
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<dyn ObjectType>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, ty: Arc<dyn ObjectType>) {
        self.types
            .write()
            .unwrap()
            .insert(ty.name().to_string(), ty);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ObjectType>> {
        self.types.read().unwrap().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.read().unwrap().contains_key(name)
    }

    /// Snapshot of all registered types, sorted by name so batch
    /// processing is deterministic.
    pub fn all(&self) -> Vec<Arc<dyn ObjectType>> {
        let mut types: Vec<_> = self.types.read().unwrap().values().cloned().collect();
        types.sort_by(|a, b| a.name().cmp(b.name()));
        types
    }
}
