//! The live config object interface and field-mask helpers.

use std::sync::Arc;

use serde_json::Value;

use crate::context::ActivationContext;
use crate::debuginfo::DebugInfo;
use crate::error::Result;
use crate::item::CreationKind;
use crate::registry::ItemRegistry;
use crate::types::{FieldAttributes, ObjectType};
use crate::Dictionary;

/// Extension key marking an object that was deleted as part of a reload.
pub const CONFIG_OBJECT_DELETED: &str = "ConfigObjectDeleted";

/// Resolves attribute-level cross references during validation.
pub trait ValidationUtils {
    /// True if a committed, non-abstract item of the given type and name
    /// exists.
    fn validate_name(&self, type_name: &str, name: &str) -> bool;
}

/// Default cross-reference resolution against the item registry.
pub struct DefaultValidationUtils<'a> {
    items: &'a ItemRegistry,
}

impl<'a> DefaultValidationUtils<'a> {
    pub fn new(items: &'a ItemRegistry) -> Self {
        Self { items }
    }
}

impl ValidationUtils for DefaultValidationUtils<'_> {
    fn validate_name(&self, type_name: &str, name: &str) -> bool {
        match self.items.get_by_type_and_name(type_name, name) {
            Some(item) => !item.is_abstract(),
            None => false,
        }
    }
}

/// A live instantiated config object.
///
/// Implementations own their state behind interior mutability; every handle
/// the engine holds is an `Arc<dyn ConfigObject>`. The lifecycle hooks with
/// default implementations are optional; everything else reflects state the
/// engine reads back.
pub trait ConfigObject: Send + Sync {
    fn object_type(&self) -> Arc<dyn ObjectType>;

    fn name(&self) -> String;
    fn set_name(&self, name: &str);

    /// The pre-composition name for composite-named objects; empty when
    /// unset.
    fn short_name(&self) -> String;
    fn set_short_name(&self, name: &str);

    fn set_debug_info(&self, debug_info: &DebugInfo) {
        let _ = debug_info;
    }

    fn set_zone_name(&self, zone: &str) {
        let _ = zone;
    }

    fn set_package(&self, package: &str) {
        let _ = package;
    }

    fn creation_kind(&self) -> CreationKind;
    fn set_creation_kind(&self, kind: CreationKind);

    fn get_field(&self, id: usize) -> Value;
    fn set_field(&self, id: usize, value: Value);

    /// Validate the fields selected by `mask`; cross references are
    /// resolved through `utils`.
    fn validate(&self, mask: FieldAttributes, utils: &dyn ValidationUtils) -> Result<()> {
        let _ = (mask, utils);
        Ok(())
    }

    fn on_config_loaded(&self) -> Result<()> {
        Ok(())
    }

    fn on_all_config_loaded(&self) -> Result<()> {
        Ok(())
    }

    /// Create dependent objects of `child_type`. New items must be
    /// registered under `ctx` so they join the current batch.
    fn create_child_objects(
        &self,
        child_type: &Arc<dyn ObjectType>,
        ctx: &ActivationContext,
    ) -> Result<()> {
        let _ = (child_type, ctx);
        Ok(())
    }

    fn pre_activate(&self) -> Result<()> {
        Ok(())
    }

    fn activate(&self, runtime_created: bool) -> Result<()>;
    fn deactivate(&self, expected: bool);
    fn is_active(&self) -> bool;

    /// Insert this object into its type's live object store.
    fn register(&self);
    /// Remove this object from its type's live object store.
    fn unregister(&self);

    fn set_extension(&self, key: &str, value: Value);
    fn extension(&self, key: &str) -> Option<Value>;
}

/// Serialize the fields selected by `mask` into a dictionary keyed by
/// field name.
pub fn serialize_fields(object: &Arc<dyn ConfigObject>, mask: FieldAttributes) -> Value {
    let mut properties = Dictionary::new();

    for (id, field) in object.object_type().fields().iter().enumerate() {
        if field.attributes.intersects(mask) {
            properties.insert(field.name.clone(), object.get_field(id));
        }
    }

    Value::Object(properties)
}

/// Shallow-copy the fields selected by `mask` from `source` onto
/// `destination`. Both objects must share a type.
pub fn migrate_fields(
    source: &Arc<dyn ConfigObject>,
    destination: &Arc<dyn ConfigObject>,
    mask: FieldAttributes,
) {
    for (id, field) in source.object_type().fields().iter().enumerate() {
        if field.attributes.intersects(mask) {
            destination.set_field(id, source.get_field(id));
        }
    }
}
