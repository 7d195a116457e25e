//! Thread-safe item registry.
//!
//! One mutex guards all four pieces of state: the (type, name) index, the
//! unnamed-composite bucket, the default-template index and the
//! ignored-path list. Composite-named items (their type has a name
//! composer) cannot be uniqueness-checked before commit, so non-abstract
//! ones are appended to the unnamed bucket instead of the named index.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::context::ActivationContext;
use crate::error::{ConfigError, Result};
use crate::item::{ConfigItem, Registration};
use crate::types::TypeRegistry;

type ItemMap = HashMap<String, Arc<ConfigItem>>;

#[derive(Default)]
struct RegistryState {
    items: HashMap<String, ItemMap>,
    default_templates: HashMap<String, ItemMap>,
    unnamed_items: Vec<Arc<ConfigItem>>,
    ignored_paths: Vec<String>,
}

pub struct ItemRegistry {
    types: Arc<TypeRegistry>,
    state: Mutex<RegistryState>,
    sequence: AtomicU64,
}

impl ItemRegistry {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self {
            types,
            state: Mutex::new(RegistryState::default()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Register an item under the given activation context.
    ///
    /// Named items collide on (type, name) regardless of the abstract
    /// flag; the error message carries both declaration sites.
    pub fn register(&self, item: &Arc<ConfigItem>, ctx: &ActivationContext) -> Result<()> {
        let composite = self
            .types
            .get(item.type_name())
            .map(|ty| ty.name_composer().is_some())
            .unwrap_or(false);

        let mut state = self.state.lock().unwrap();

        if !item.is_abstract() && composite {
            state.unnamed_items.push(Arc::clone(item));
        } else {
            let items = state.items.entry(item.type_name().to_string()).or_default();

            if let Some(existing) = items.get(item.name()) {
                return Err(ConfigError::DuplicateDefinition {
                    type_name: item.type_name().to_string(),
                    name: item.name().to_string(),
                    existing: existing.debug_info().clone(),
                    declaration: item.debug_info().clone(),
                });
            }

            items.insert(item.name().to_string(), Arc::clone(item));

            if item.is_default_template() {
                state
                    .default_templates
                    .entry(item.type_name().to_string())
                    .or_default()
                    .insert(item.name().to_string(), Arc::clone(item));
            }
        }

        item.set_registration(Registration {
            context: ctx.clone(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        });

        Ok(())
    }

    /// Unregister an item. Idempotent. An attached object is unregistered
    /// from its type's store first and the attachment cleared.
    pub fn unregister(&self, item: &Arc<ConfigItem>) {
        if let Some(object) = item.detach_object() {
            object.unregister();
        }

        let mut state = self.state.lock().unwrap();

        state
            .unnamed_items
            .retain(|other| !Arc::ptr_eq(other, item));

        if let Some(items) = state.items.get_mut(item.type_name()) {
            if items
                .get(item.name())
                .is_some_and(|other| Arc::ptr_eq(other, item))
            {
                items.remove(item.name());
            }
        }

        if let Some(templates) = state.default_templates.get_mut(item.type_name()) {
            if templates
                .get(item.name())
                .is_some_and(|other| Arc::ptr_eq(other, item))
            {
                templates.remove(item.name());
            }
        }
    }

    /// Named-index lookup; never fails.
    pub fn get_by_type_and_name(&self, type_name: &str, name: &str) -> Option<Arc<ConfigItem>> {
        self.state
            .lock()
            .unwrap()
            .items
            .get(type_name)
            .and_then(|items| items.get(name))
            .cloned()
    }

    /// Snapshot of the named items of one type.
    pub fn get_items(&self, type_name: &str) -> Vec<Arc<ConfigItem>> {
        self.state
            .lock()
            .unwrap()
            .items
            .get(type_name)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the default templates of one type.
    pub fn get_default_templates(&self, type_name: &str) -> Vec<Arc<ConfigItem>> {
        self.state
            .lock()
            .unwrap()
            .default_templates
            .get(type_name)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Record the source path of an item skipped due to ignore-on-error.
    pub fn push_ignored(&self, path: impl Into<String>) {
        self.state.lock().unwrap().ignored_paths.push(path.into());
    }

    pub fn ignored_paths(&self) -> Vec<String> {
        self.state.lock().unwrap().ignored_paths.clone()
    }

    /// Best-effort cleanup of ignored item files below `prefix`: unlinks
    /// each matching path and drops it from the list; non-matching entries
    /// are kept.
    pub fn remove_ignored_items(&self, prefix: &str) {
        let mut state = self.state.lock().unwrap();

        state.ignored_paths.retain(|path| {
            if !path.starts_with(prefix) {
                return true;
            }

            debug!("Removing ignored item path '{path}'.");
            let _ = std::fs::remove_file(path);
            false
        });
    }

    /// Collect the items of one batch that are ready to commit: registered
    /// under `ctx`, non-abstract, no object attached. Unnamed items
    /// belonging to the context are drained from the bucket (single-use;
    /// the returned flag asks commit to discard their expression), items
    /// of other contexts stay. The result is in registration order.
    pub(crate) fn collect_candidates(
        &self,
        ctx: &ActivationContext,
    ) -> Vec<(Arc<ConfigItem>, bool)> {
        let mut state = self.state.lock().unwrap();
        let mut candidates = Vec::new();

        for items in state.items.values() {
            for item in items.values() {
                if item.is_abstract() || item.object().is_some() {
                    continue;
                }

                if item.activation_context().as_ref() != Some(ctx) {
                    continue;
                }

                candidates.push((Arc::clone(item), false));
            }
        }

        let mut kept = Vec::new();
        for item in state.unnamed_items.drain(..) {
            if item.activation_context().as_ref() != Some(ctx) {
                kept.push(item);
                continue;
            }

            if item.is_abstract() || item.object().is_some() {
                continue;
            }

            candidates.push((item, true));
        }
        state.unnamed_items = kept;

        candidates.sort_by_key(|(item, _)| item.registration_sequence());
        candidates
    }
}
