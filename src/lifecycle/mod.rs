//! The lifecycle engine: commit, activate, reload.
//!
//! [`LifecycleEngine`] owns no configuration state of its own: it drives
//! the explicit [`ItemRegistry`] and [`TypeRegistry`] values it was built
//! with, and reaches persistence, the dependency graph and the compiler
//! through injected ports.

mod activate;
mod commit;
mod reload;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::context::ActivationContext;
use crate::error::Result;
use crate::item::ConfigItem;
use crate::ports::{
    DependencyGraph, ExpressionCompiler, NullDependencyGraph, NullSnapshotSink, SnapshotSink,
};
use crate::registry::ItemRegistry;
use crate::types::TypeRegistry;
use crate::workqueue::WorkQueue;

/// Tunables for batch processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Worker threads per work queue; defaults to the machine parallelism.
    pub concurrency: usize,
    /// Maximum queued tasks before enqueueing blocks.
    pub queue_depth: usize,
    /// Optional persisted modified-attributes script, evaluated once
    /// before activation when requested.
    pub mod_attrs_path: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            queue_depth: 25_000,
            mod_attrs_path: None,
        }
    }
}

pub struct LifecycleEngine {
    types: Arc<TypeRegistry>,
    items: Arc<ItemRegistry>,
    snapshots: Arc<dyn SnapshotSink>,
    dependencies: Arc<dyn DependencyGraph>,
    compiler: Option<Arc<dyn ExpressionCompiler>>,
    options: EngineOptions,
    /// Serializes activate_items invocations end-to-end: at most one
    /// activation runs in the process at a time.
    activation_lock: Mutex<()>,
}

impl LifecycleEngine {
    pub fn new(types: Arc<TypeRegistry>, items: Arc<ItemRegistry>) -> Self {
        Self {
            types,
            items,
            snapshots: Arc::new(NullSnapshotSink),
            dependencies: Arc::new(NullDependencyGraph),
            compiler: None,
            options: EngineOptions::default(),
            activation_lock: Mutex::new(()),
        }
    }

    pub fn with_snapshot_sink(mut self, snapshots: Arc<dyn SnapshotSink>) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn with_dependency_graph(mut self, dependencies: Arc<dyn DependencyGraph>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn ExpressionCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn items(&self) -> &Arc<ItemRegistry> {
        &self.items
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Commit every pending item of the batch `ctx` through `queue`,
    /// appending each processed item to `new_items` in registration order.
    ///
    /// Returns `false` after reporting errors and unregistering the
    /// partially-committed batch; the queue is drained and reusable either
    /// way.
    pub fn commit_items(
        &self,
        ctx: &ActivationContext,
        queue: &WorkQueue,
        new_items: &mut Vec<Arc<ConfigItem>>,
        silent: bool,
    ) -> bool {
        if !silent {
            info!("Committing config item(s).");
        }

        let committed = match self.commit_new_items(ctx, queue, new_items) {
            Ok(committed) => committed,
            Err(err) => {
                error!("Error while committing configuration: {err:#}");
                false
            }
        };

        if !committed {
            queue.report_errors("config");

            for item in new_items.iter() {
                self.items.unregister(item);
            }

            return false;
        }

        if !silent {
            self.log_commit_stats(new_items);
        }

        true
    }

    /// Open a fresh activation context, let `f` register items under it,
    /// then commit and activate the batch on a private work queue.
    ///
    /// `Ok(false)` signals a commit or activation failure; an error from
    /// `f` itself is passed through.
    pub fn run_with_activation_context<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&ActivationContext) -> Result<()>,
    {
        let ctx = ActivationContext::new();

        f(&ctx)?;

        let queue = WorkQueue::new(self.options.queue_depth, self.options.concurrency);
        let mut new_items = Vec::new();

        if !self.commit_items(&ctx, &queue, &mut new_items, true) {
            return Ok(false);
        }

        if !self.activate_items(&queue, &new_items, false, true, false) {
            return Ok(false);
        }

        Ok(true)
    }

    fn log_commit_stats(&self, new_items: &[Arc<ConfigItem>]) {
        let mut counts: HashMap<&str, usize> = HashMap::new();

        for item in new_items {
            if item.object().is_some() {
                *counts.entry(item.type_name()).or_default() += 1;
            }
        }

        let mut counts: Vec<_> = counts.into_iter().collect();
        counts.sort();

        for (type_name, count) in counts {
            let display_name = if count == 1 {
                type_name.to_string()
            } else {
                self.types
                    .get(type_name)
                    .map(|ty| ty.plural_name())
                    .unwrap_or_else(|| format!("{type_name}s"))
            };

            info!("Instantiated {count} {display_name}.");
        }
    }
}
