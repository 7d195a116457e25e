//! Two-phase activation of a committed batch.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::expression::{DebugHints, ScriptFrame};
use crate::item::ConfigItem;
use crate::object::ConfigObject;
use crate::workqueue::WorkQueue;

use super::LifecycleEngine;

impl LifecycleEngine {
    /// Activate the committed objects of a batch: a `pre_activate` barrier
    /// over every not-yet-active object, then an `activate` barrier over
    /// the same set. Aggregated failures in either phase are reported and
    /// abort the call.
    ///
    /// `with_mod_attrs` restores the persisted modified-attributes script
    /// first; failures there are logged but never fatal.
    pub fn activate_items(
        &self,
        queue: &WorkQueue,
        new_items: &[Arc<ConfigItem>],
        runtime_created: bool,
        silent: bool,
        with_mod_attrs: bool,
    ) -> bool {
        let _guard = self.activation_lock.lock().unwrap();

        if with_mod_attrs {
            self.restore_modified_attributes();
        }

        let pending: Vec<Arc<dyn ConfigObject>> = new_items
            .iter()
            .filter_map(|item| item.object())
            .filter(|object| !object.is_active())
            .collect();

        for object in &pending {
            debug!(
                "Preparing activation of object '{}' of type '{}'.",
                object.name(),
                object.object_type().name()
            );

            let object = Arc::clone(object);
            queue.enqueue(move || {
                object.pre_activate()?;
                Ok(())
            });
        }

        queue.join();

        if queue.has_errors() {
            queue.report_errors("activation");
            return false;
        }

        if !silent {
            info!("Activating {} config object(s).", pending.len());
        }

        for object in &pending {
            debug!(
                "Activating object '{}' of type '{}'.",
                object.name(),
                object.object_type().name()
            );

            let object = Arc::clone(object);
            queue.enqueue(move || {
                object.activate(runtime_created)?;
                Ok(())
            });
        }

        queue.join();

        if queue.has_errors() {
            queue.report_errors("activation");
            return false;
        }

        if !silent {
            info!("Activated all objects.");
        }

        true
    }

    /// One-shot compile-and-evaluate of the persisted modified-attributes
    /// script, if one is configured and present on disk.
    fn restore_modified_attributes(&self) {
        let Some(path) = self.options.mod_attrs_path.as_deref() else {
            return;
        };

        if !path.exists() {
            return;
        }

        let Some(compiler) = self.compiler.as_ref() else {
            error!(
                "Cannot restore modified attributes from '{}': no expression compiler configured.",
                path.display()
            );
            return;
        };

        let expression = match compiler.compile_file(path) {
            Ok(expression) => expression,
            Err(err) => {
                error!(
                    "Failed to compile modified attributes file '{}': {err:#}",
                    path.display()
                );
                return;
            }
        };

        let mut frame = ScriptFrame::new();
        let mut hints = DebugHints::default();

        if let Err(err) = expression.evaluate(&mut frame, &mut hints) {
            error!(
                "Failed to restore modified attributes from '{}': {err:#}",
                path.display()
            );
        }
    }
}
