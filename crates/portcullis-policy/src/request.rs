//! Access request type consumed by candidate retrieval and condition
//! evaluation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Access Request
// =============================================================================

/// A single access request as seen by the evaluation engine.
///
/// The store only inspects `subject`, `resource`, and `action` when narrowing
/// candidates; the `context` map is what condition labels index into when the
/// evaluation engine runs the full matching algorithm downstream. An empty
/// string field means "do not filter on this dimension".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessRequest {
    /// The subject requesting access, e.g. `users:ada` or `groups:editors`.
    #[serde(default)]
    pub subject: String,

    /// The resource being accessed, e.g. `rooms:101`.
    #[serde(default)]
    pub resource: String,

    /// The action being performed, e.g. `create` or `delete`.
    #[serde(default)]
    pub action: String,

    /// Request attributes keyed by condition label.
    #[serde(default)]
    pub context: HashMap<String, Value>,
}

impl AccessRequest {
    /// Create a request with the three matching dimensions set.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
            action: action.into(),
            context: HashMap::new(),
        }
    }

    /// Attach a context attribute.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}
