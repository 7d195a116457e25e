//! Ports to external collaborators.
//!
//! The engine depends on the persistence sink, the dependency graph, the
//! configuration compiler and reload callbacks only through these traits;
//! hosts inject implementations, tests inject doubles.

use std::path::Path;
use std::sync::Arc;

use crate::context::ActivationContext;
use crate::error::Result;
use crate::expression::{Expression, ScriptFrame};
use crate::object::ConfigObject;
use crate::snapshot::PersistedItem;

/// Receives one persisted snapshot record per committed object.
pub trait SnapshotSink: Send + Sync {
    fn write_object(&self, record: &PersistedItem) -> Result<()>;
}

/// Discards snapshot records; the default when the host runs without
/// persistence.
pub struct NullSnapshotSink;

impl SnapshotSink for NullSnapshotSink {
    fn write_object(&self, _record: &PersistedItem) -> Result<()> {
        Ok(())
    }
}

/// Parent-relation discovery used by the reload delete walk.
pub trait DependencyGraph: Send + Sync {
    /// Objects that depend on `object` and must be deleted with it.
    fn parents(&self, object: &Arc<dyn ConfigObject>) -> Vec<Arc<dyn ConfigObject>>;
}

/// A dependency graph with no edges.
pub struct NullDependencyGraph;

impl DependencyGraph for NullDependencyGraph {
    fn parents(&self, _object: &Arc<dyn ConfigObject>) -> Vec<Arc<dyn ConfigObject>> {
        Vec::new()
    }
}

/// Compiles an expression file, e.g. the persisted modified-attributes
/// script restored before activation.
pub trait ExpressionCompiler: Send + Sync {
    fn compile_file(&self, path: &Path) -> Result<Arc<dyn Expression>>;
}

/// User-supplied rebuild step for [`crate::LifecycleEngine::reload_object`].
///
/// For an in-place reload the callback runs with the object under
/// construction bound as `frame.this`; for a destroy-first reload it runs
/// with an empty frame and is expected to register replacement items under
/// `ctx` itself.
pub trait ReloadCallback: Send + Sync {
    fn invoke(&self, frame: &mut ScriptFrame, ctx: &ActivationContext) -> Result<()>;
}

impl<F> ReloadCallback for F
where
    F: Fn(&mut ScriptFrame, &ActivationContext) -> Result<()> + Send + Sync,
{
    fn invoke(&self, frame: &mut ScriptFrame, ctx: &ActivationContext) -> Result<()> {
        self(frame, ctx)
    }
}
