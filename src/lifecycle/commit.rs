//! The staged commit pipeline.
//!
//! A batch runs in generations: collect the pending items of the context,
//! commit them in parallel, then finalize type by type in load-dependency
//! order (`on_all_config_loaded`, then `create_child_objects` on each
//! dependency's objects). Child creation may register further items under
//! the same context; those form the next generation until the registry
//! yields nothing new.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::context::ActivationContext;
use crate::error::{ConfigError, Result};
use crate::expression::{DebugHints, ScriptFrame};
use crate::item::ConfigItem;
use crate::object::{serialize_fields, ConfigObject, DefaultValidationUtils};
use crate::ports::SnapshotSink;
use crate::registry::ItemRegistry;
use crate::snapshot::PersistedItem;
use crate::types::{FieldAttributes, TypeRegistry};
use crate::workqueue::WorkQueue;

use super::LifecycleEngine;

impl LifecycleEngine {
    /// Drive the batch to its fixed point. `Ok(false)` means a queue task
    /// failed and the barrier aborted; a direct error means the pipeline
    /// itself cannot make progress (e.g. cyclic load dependencies).
    pub(super) fn commit_new_items(
        &self,
        ctx: &ActivationContext,
        queue: &WorkQueue,
        new_items: &mut Vec<Arc<ConfigItem>>,
    ) -> Result<bool> {
        loop {
            let batch = self.items.collect_candidates(ctx);

            if batch.is_empty() {
                return Ok(true);
            }

            for (item, discard) in &batch {
                new_items.push(Arc::clone(item));

                let types = Arc::clone(&self.types);
                let items = Arc::clone(&self.items);
                let snapshots = Arc::clone(&self.snapshots);
                let item = Arc::clone(item);
                let discard = *discard;

                queue.enqueue(move || {
                    commit_item(&types, &items, &snapshots, &item, discard)?;
                    Ok(())
                });
            }

            queue.join();

            if queue.has_errors() {
                return Ok(false);
            }

            if !self.finalize_generation(ctx, queue, &batch)? {
                return Ok(false);
            }
        }
    }

    /// Run `on_all_config_loaded` and `create_child_objects` over one
    /// generation, visiting each type only after every type it declares a
    /// load dependency on has completed.
    fn finalize_generation(
        &self,
        ctx: &ActivationContext,
        queue: &WorkQueue,
        batch: &[(Arc<ConfigItem>, bool)],
    ) -> Result<bool> {
        let types = self.types.all();
        let mut completed: HashSet<String> = HashSet::new();

        while completed.len() != types.len() {
            let mut progressed = false;

            for ty in &types {
                if completed.contains(ty.name()) {
                    continue;
                }

                let unresolved = ty
                    .load_dependencies()
                    .iter()
                    .any(|dep| self.types.contains(dep) && !completed.contains(dep.as_str()));

                if unresolved {
                    continue;
                }

                for (item, _) in batch {
                    if item.type_name() != ty.name() {
                        continue;
                    }

                    let Some(object) = item.object() else {
                        continue;
                    };

                    let items = Arc::clone(&self.items);
                    let item = Arc::clone(item);

                    queue.enqueue(move || run_all_config_loaded(&items, &item, &object));
                }

                completed.insert(ty.name().to_string());
                progressed = true;

                queue.join();

                if queue.has_errors() {
                    return Ok(false);
                }

                for dep in ty.load_dependencies() {
                    for (item, _) in batch {
                        if item.type_name() != dep {
                            continue;
                        }

                        let Some(object) = item.object() else {
                            continue;
                        };

                        let child_type = Arc::clone(ty);
                        let ctx = ctx.clone();

                        queue.enqueue(move || {
                            object.create_child_objects(&child_type, &ctx)?;
                            Ok(())
                        });
                    }
                }

                queue.join();

                if queue.has_errors() {
                    return Ok(false);
                }
            }

            if !progressed {
                let remaining = types
                    .iter()
                    .filter(|ty| !completed.contains(ty.name()))
                    .map(|ty| ty.name().to_string())
                    .collect();

                return Err(ConfigError::CyclicLoadDependency { remaining });
            }
        }

        Ok(true)
    }
}

/// Commit a single item: instantiate, evaluate, name, validate, notify,
/// snapshot, register. Returns `None` for abstract items and for items
/// skipped through ignore-on-error.
fn commit_item(
    types: &Arc<TypeRegistry>,
    items: &Arc<ItemRegistry>,
    snapshots: &Arc<dyn SnapshotSink>,
    item: &Arc<ConfigItem>,
    discard: bool,
) -> Result<Option<Arc<dyn ConfigObject>>> {
    debug!(
        "Committing config item '{}' of type '{}'.",
        item.name(),
        item.type_name()
    );

    // committing twice is a no-op
    if let Some(existing) = item.object() {
        return Ok(Some(existing));
    }

    let Some(ty) = types.get(item.type_name()) else {
        return Err(ConfigError::UnknownType {
            type_name: item.type_name().to_string(),
            debug_info: item.debug_info().clone(),
        });
    };

    if item.is_abstract() {
        return Ok(None);
    }

    let object = ty.instantiate();

    object.set_debug_info(item.debug_info());
    object.set_zone_name(item.zone());
    object.set_package(item.package());
    object.set_creation_kind(item.creation_kind());
    object.set_name(item.name());

    let expression = item.expression().ok_or_else(|| {
        ConfigError::InvalidItem(format!(
            "expression for item '{}' was already consumed",
            item.name()
        ))
    })?;

    let mut hints = DebugHints::default();
    let mut frame = ScriptFrame::for_object(Arc::clone(&object));
    frame.locals = item.scope().clone();

    if let Err(err) = expression.evaluate(&mut frame, &mut hints) {
        return skip_or_propagate(items, item, err);
    }

    if discard {
        item.discard_expression();
    }

    // evaluation may have assigned a short name; prefer it over the
    // declared one before composing the canonical name
    let short_name = object.short_name();
    let item_name = if short_name.is_empty() {
        item.name().to_string()
    } else {
        short_name
    };

    let mut name = item_name.clone();

    if let Some(composer) = ty.name_composer() {
        if name.is_empty() {
            return Err(ConfigError::EmptyName {
                debug_info: item.debug_info().clone(),
            });
        }

        name = composer.make_name(&name, &object);

        if name.is_empty() {
            return Err(ConfigError::NameComposerFailure {
                type_name: ty.name().to_string(),
                name: item.name().to_string(),
            });
        }
    }

    if name != item_name {
        object.set_short_name(&item_name);
    }

    object.set_name(&name);

    let utils = DefaultValidationUtils::new(items);

    if let Err(err) = object.validate(FieldAttributes::CONFIG, &utils) {
        return skip_or_propagate(items, item, err.with_debug_hints(hints.to_value()));
    }

    if let Err(err) = object.on_config_loaded() {
        return skip_or_propagate(items, item, err);
    }

    let record = PersistedItem {
        type_name: item.type_name().to_string(),
        name: item.name().to_string(),
        properties: serialize_fields(&object, FieldAttributes::CONFIG),
        debug_hints: hints.to_value(),
        debug_info: PersistedItem::debug_info_tuple(item.debug_info()),
    };

    snapshots.write_object(&record)?;

    object.register();
    item.attach_object(Arc::clone(&object));

    Ok(Some(object))
}

/// Ignore-on-error handling for the fallible commit stages: the item's
/// source path lands on the ignored list and the commit yields no object;
/// without the flag the error propagates and aborts the batch.
fn skip_or_propagate(
    items: &ItemRegistry,
    item: &Arc<ConfigItem>,
    err: ConfigError,
) -> Result<Option<Arc<dyn ConfigObject>>> {
    if !item.is_ignore_on_error() {
        return Err(err);
    }

    debug!(
        "Ignoring config object '{}' of type '{}' due to errors: {err:#}",
        item.name(),
        item.type_name()
    );

    items.push_ignored(item.debug_info().path.clone());

    Ok(None)
}

/// `on_all_config_loaded` task body; ignore-on-error additionally
/// unregisters the item, since its object is already live.
fn run_all_config_loaded(
    items: &Arc<ItemRegistry>,
    item: &Arc<ConfigItem>,
    object: &Arc<dyn ConfigObject>,
) -> anyhow::Result<()> {
    if let Err(err) = object.on_all_config_loaded() {
        if item.is_ignore_on_error() {
            debug!(
                "Ignoring config object '{}' of type '{}' due to errors: {err:#}",
                item.name(),
                item.type_name()
            );

            items.unregister(item);
            items.push_ignored(item.debug_info().path.clone());

            return Ok(());
        }

        return Err(err.into());
    }

    Ok(())
}
