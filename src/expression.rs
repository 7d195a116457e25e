//! Seam to the external expression evaluator.
//!
//! The engine never interprets configuration expressions itself; it hands a
//! [`ScriptFrame`] (the object under construction plus local bindings) to an
//! [`Expression`] and collects [`DebugHints`] produced along the way.

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::object::ConfigObject;
use crate::Dictionary;

/// An evaluable configuration expression. Implemented by the expression
/// compiler's AST; closures implement it directly, which the engine uses
/// for internally synthesized expressions.
pub trait Expression: Send + Sync {
    fn evaluate(&self, frame: &mut ScriptFrame, hints: &mut DebugHints) -> Result<Value>;
}

impl<F> Expression for F
where
    F: Fn(&mut ScriptFrame, &mut DebugHints) -> Result<Value> + Send + Sync,
{
    fn evaluate(&self, frame: &mut ScriptFrame, hints: &mut DebugHints) -> Result<Value> {
        self(frame, hints)
    }
}

/// Evaluation frame: the receiver object (if any) and local variable
/// bindings seeded from the item's scope.
#[derive(Default)]
pub struct ScriptFrame {
    pub this: Option<Arc<dyn ConfigObject>>,
    pub locals: Dictionary,
}

impl ScriptFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_object(object: Arc<dyn ConfigObject>) -> Self {
        Self {
            this: Some(object),
            locals: Dictionary::new(),
        }
    }
}

/// Per-attribute hints recorded during evaluation, keyed by attribute path.
/// Persisted alongside the snapshot record and attached to validation
/// failures.
#[derive(Debug, Clone, Default)]
pub struct DebugHints {
    hints: Dictionary,
}

impl DebugHints {
    pub fn record(&mut self, attribute: impl Into<String>, hint: Value) {
        self.hints.insert(attribute.into(), hint);
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.hints.clone())
    }
}
