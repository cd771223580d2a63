//! Error types for the policy and event storage layers.
//!
//! All failures are returned to the immediate caller with the underlying
//! cause preserved for diagnostics. Nothing here is retried internally and
//! nothing is treated as process-fatal; retry policy belongs to the caller.

/// Boxed error type used to carry an arbitrary backend cause.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Policy Store Errors
// =============================================================================

/// Errors that can occur during policy storage operations.
#[derive(Debug, thiserror::Error)]
pub enum PolicyStoreError {
    /// The caller supplied a structurally invalid request.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the invalid parameter.
        message: String,
    },

    /// A point lookup or delete found no policy with the given ID.
    #[error("Policy not found: {id}")]
    PolicyNotFound {
        /// The ID that was looked up.
        id: String,
    },

    /// A filtered search returned an empty result set.
    ///
    /// Distinct from [`PolicyStoreError::PolicyNotFound`]: an empty query is
    /// not a lookup failure, it is signaled so callers can short-circuit.
    #[error("No policy found matching criteria")]
    NoPolicyFound,

    /// Deserialization encountered a condition tag absent from the registry.
    ///
    /// Either the stored document is corrupt or a condition variant was
    /// never registered.
    #[error("Unknown condition type: {name}")]
    UnknownConditionType {
        /// The unresolvable condition type tag.
        name: String,
    },

    /// The underlying store failed to execute an operation.
    #[error("Persistence failure: {message}")]
    Persistence {
        /// Description of the failed operation.
        message: String,
        /// The backend error that caused the failure, when available.
        #[source]
        source: Option<BoxedError>,
    },

    /// A document was retrieved but failed to parse into the entity shape.
    #[error("Failed decoding stored policy: {0}")]
    Decode(#[from] serde_json::Error),
}

impl PolicyStoreError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Create an `InvalidParameter` error.
    #[must_use]
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create a `PolicyNotFound` error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::PolicyNotFound { id: id.into() }
    }

    /// Create an `UnknownConditionType` error.
    #[must_use]
    pub fn unknown_condition_type(name: impl Into<String>) -> Self {
        Self::UnknownConditionType { name: name.into() }
    }

    /// Create a `Persistence` error without an underlying cause.
    #[must_use]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            source: None,
        }
    }

    /// Create a `Persistence` error wrapping a backend cause.
    #[must_use]
    pub fn persistence_with(
        message: impl Into<String>,
        source: impl Into<BoxedError>,
    ) -> Self {
        Self::Persistence {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    /// Returns `true` if this is an `InvalidParameter` error.
    #[must_use]
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, Self::InvalidParameter { .. })
    }

    /// Returns `true` if this is a `PolicyNotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PolicyNotFound { .. })
    }

    /// Returns `true` if this is a `NoPolicyFound` signal.
    #[must_use]
    pub fn is_no_policy_found(&self) -> bool {
        matches!(self, Self::NoPolicyFound)
    }

    /// Returns `true` if this is an `UnknownConditionType` error.
    #[must_use]
    pub fn is_unknown_condition_type(&self) -> bool {
        matches!(self, Self::UnknownConditionType { .. })
    }

    /// Returns `true` if this is a `Persistence` error.
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    /// Returns `true` if this is a `Decode` error.
    #[must_use]
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

/// Result type for policy storage operations.
pub type PolicyResult<T> = Result<T, PolicyStoreError>;

// =============================================================================
// Event Store Errors
// =============================================================================

/// Errors that can occur during event storage operations.
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// The underlying store failed to execute an operation.
    #[error("Persistence failure: {message}")]
    Persistence {
        /// Description of the failed operation.
        message: String,
        /// The backend error that caused the failure, when available.
        #[source]
        source: Option<BoxedError>,
    },

    /// A document was retrieved but failed to parse into the event shape.
    #[error("Failed decoding stored event: {0}")]
    Decode(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Create a `Persistence` error without an underlying cause.
    #[must_use]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            source: None,
        }
    }

    /// Create a `Persistence` error wrapping a backend cause.
    #[must_use]
    pub fn persistence_with(
        message: impl Into<String>,
        source: impl Into<BoxedError>,
    ) -> Self {
        Self::Persistence {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Result type for event storage operations.
pub type EventResult<T> = Result<T, EventStoreError>;

// =============================================================================
// Tests
// =============================================================================
