//! Activation contexts group items into commit/activate batches.

use uuid::Uuid;

/// Opaque token identifying one batch of pending commits. Items registered
/// under the same context are committed and activated together; contexts
/// are compared by identity only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivationContext {
    id: Uuid,
}

impl ActivationContext {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for ActivationContext {
    fn default() -> Self {
        Self::new()
    }
}
