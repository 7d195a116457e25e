//! Transactional object reload with snapshot restore.
//!
//! Reloading deletes the target plus every config object reachable as a
//! dependency parent, records the deleted graph, rebuilds through a
//! caller-supplied callback and, if anything goes wrong, re-executes
//! construction of the recorded snapshot. Atomicity is best effort: restore
//! replays registration and the lifecycle hooks against the saved objects
//! rather than rolling back a transaction log.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::context::ActivationContext;
use crate::error::{ConfigError, Result};
use crate::expression::{DebugHints, Expression, ScriptFrame};
use crate::item::{ConfigItem, ConfigItemBuilder, CreationKind};
use crate::object::{migrate_fields, ConfigObject, CONFIG_OBJECT_DELETED};
use crate::ports::ReloadCallback;
use crate::registry::ItemRegistry;
use crate::types::FieldAttributes;

use super::LifecycleEngine;

struct DeletedObject {
    object: Arc<dyn ConfigObject>,
    item: Option<Arc<ConfigItem>>,
}

impl LifecycleEngine {
    /// Replace a live object via `callback`.
    ///
    /// With `destroy_first` the callback runs inside a fresh activation
    /// context and must register the replacement items itself. Otherwise
    /// the engine compiles an ephemeral item of the same type and name
    /// whose expression imports the type's default templates, copies the
    /// source's configuration fields onto the object under construction
    /// and then invokes the callback with that object bound as `this`.
    ///
    /// If the rebuild fails, or no live object with the original type and
    /// name exists afterwards, the deleted graph is restored and the error
    /// is returned.
    pub fn reload_object(
        &self,
        object: &Arc<dyn ConfigObject>,
        destroy_first: bool,
        callback: Arc<dyn ReloadCallback>,
    ) -> Result<()> {
        let mut deleted = Vec::new();
        let mut visited = HashSet::new();

        self.delete_object(object, &mut deleted, &mut visited);

        match self.rebuild(object, destroy_first, callback) {
            Ok(()) => self.restore_objects(&deleted, false),
            Err(err) => {
                // apply-generated objects come back too: the failed rebuild
                // produced nothing that could have replaced them
                self.restore_objects(&deleted, true)?;
                Err(err)
            }
        }
    }

    /// Deepest-first delete of the object and its dependency parents.
    /// Each deleted object is marked, deactivated and unregistered (via
    /// its item when one exists); the visited set keeps cyclic dependency
    /// graphs from looping.
    fn delete_object(
        &self,
        object: &Arc<dyn ConfigObject>,
        deleted: &mut Vec<DeletedObject>,
        visited: &mut HashSet<usize>,
    ) {
        if !visited.insert(Arc::as_ptr(object) as *const u8 as usize) {
            return;
        }

        let ty = object.object_type();
        let name = object.name();
        let item = self.items.get_by_type_and_name(ty.name(), &name);

        deleted.push(DeletedObject {
            object: Arc::clone(object),
            item: item.clone(),
        });

        for parent in self.dependencies.parents(object) {
            self.delete_object(&parent, deleted, visited);
        }

        warn!("Deactivating object '{name}' of type '{}'.", ty.name());

        object.set_extension(CONFIG_OBJECT_DELETED, Value::Bool(true));
        object.deactivate(true);

        match item {
            Some(item) => self.items.unregister(&item),
            None => object.unregister(),
        }
    }

    fn rebuild(
        &self,
        object: &Arc<dyn ConfigObject>,
        destroy_first: bool,
        callback: Arc<dyn ReloadCallback>,
    ) -> Result<()> {
        let ty = object.object_type();
        let name = object.name();

        if destroy_first {
            self.run_with_activation_context(|ctx| {
                let mut frame = ScriptFrame::new();
                callback.invoke(&mut frame, ctx)
            })?;
        } else {
            let source = Arc::clone(object);

            self.run_with_activation_context(|ctx| {
                let expression = Arc::new(RebuildExpression {
                    items: Arc::clone(&self.items),
                    type_name: ty.name().to_string(),
                    source: Arc::clone(&source),
                    callback: Arc::clone(&callback),
                    context: ctx.clone(),
                });

                let item = ConfigItemBuilder::new()
                    .object_type(ty.name())
                    .name(name.as_str())
                    .creation(CreationKind::Object)
                    .expression(expression)
                    .compile()?;

                self.items.register(&item, ctx)
            })?;
        }

        if ty.get_object(&name).is_none() {
            return Err(ConfigError::CallbackFailedToRecreate {
                type_name: ty.name().to_string(),
                name,
            });
        }

        Ok(())
    }

    /// Walk the deletion snapshot. Where the rebuild produced a replacement
    /// with the same type and name, the runtime state fields migrate onto
    /// it. Where it did not, the old instance is resurrected: always on a
    /// failed rebuild, and for explicitly declared objects even on a
    /// successful one.
    fn restore_objects(&self, deleted: &[DeletedObject], recover_apply: bool) -> Result<()> {
        let ctx = ActivationContext::new();

        for entry in deleted {
            let object = &entry.object;
            let ty = object.object_type();
            let name = object.name();

            if let Some(replacement) = ty.get_object(&name) {
                warn!(
                    "Restoring state for newly-created object '{name}' of type '{}'.",
                    ty.name()
                );

                migrate_fields(object, &replacement, FieldAttributes::STATE);
            } else if recover_apply || object.creation_kind() == CreationKind::Object {
                warn!("Recovering object '{name}' of type '{}'.", ty.name());

                object.set_extension(CONFIG_OBJECT_DELETED, Value::Bool(false));

                if let Some(item) = &entry.item {
                    self.items.register(item, &ctx)?;
                }

                object.on_config_loaded()?;
                object.register();
                object.on_all_config_loaded()?;

                object.pre_activate()?;
                object.activate(true)?;
            }
        }

        Ok(())
    }
}

/// Expression of the ephemeral in-place reload item: default-template
/// import, configuration copy from the deleted source, then the caller's
/// callback against `this`.
struct RebuildExpression {
    items: Arc<ItemRegistry>,
    type_name: String,
    source: Arc<dyn ConfigObject>,
    callback: Arc<dyn ReloadCallback>,
    context: ActivationContext,
}

impl Expression for RebuildExpression {
    fn evaluate(&self, frame: &mut ScriptFrame, hints: &mut DebugHints) -> Result<Value> {
        for template in self.items.get_default_templates(&self.type_name) {
            if let Some(expression) = template.expression() {
                expression.evaluate(frame, hints)?;
            }
        }

        if let Some(this) = frame.this.clone() {
            migrate_fields(&self.source, &this, FieldAttributes::CONFIG);
        }

        self.callback.invoke(frame, &self.context)?;

        Ok(Value::Null)
    }
}
