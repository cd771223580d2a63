//! Policy storage trait and candidate-narrowing helpers.
//!
//! This is the contract the evaluation engine consumes; it treats the store
//! purely through this interface and never inspects the document schema.
//!
//! # Candidate retrieval contract
//!
//! The finder operations are a conservative superset filter. A policy's
//! stored pattern may be a full delimited regex, but candidate selection
//! narrows with a cheaper test: the request literal is escaped, anchored,
//! and matched case-insensitively against each stored pattern, selecting
//! policies whose pattern *begins with* the literal. That approximates the
//! evaluation engine's own pattern-matching convention closely enough to
//! never produce a false negative; callers must still run the full matching
//! algorithm (including condition evaluation) over the returned candidates.
//! The store's role is performance: shrinking the candidate set before the
//! expensive predicate work.

use async_trait::async_trait;

use crate::error::PolicyResult;
use crate::policy::Policy;
use crate::request::AccessRequest;

// =============================================================================
// Candidate Narrowing Helpers
// =============================================================================

/// Build the anchored, case-insensitive-ready pattern for a request literal.
///
/// The literal is regex-escaped so it is inert inside the match; backends
/// that query a database hand this to the engine's case-insensitive regex
/// operator, in-process backends use [`pattern_begins_with`] which has the
/// same semantics.
#[must_use]
pub fn prefix_pattern(literal: &str) -> String {
    format!("^{}", regex::escape(literal))
}

/// In-process equivalent of matching [`prefix_pattern`] against a stored
/// pattern: a case-insensitive test that the pattern begins with the
/// literal.
#[must_use]
pub fn pattern_begins_with(pattern: &str, literal: &str) -> bool {
    pattern.to_uppercase().starts_with(&literal.to_uppercase())
}

// =============================================================================
// Policy Store Trait
// =============================================================================

/// CRUD and query operations over one tenant-scoped policy collection.
///
/// The store is stateless per call; safe concurrent use relies on the
/// underlying store's per-operation atomicity. `update` is not
/// compare-and-swap; concurrent updates race and the last writer wins.
///
/// # Example
///
/// ```ignore
/// use portcullis_policy::{AccessRequest, PolicyStore};
///
/// async fn candidates(store: &impl PolicyStore) {
///     let request = AccessRequest::new("groups:editors", "articles:42", "publish");
///     let policies = store.find_request_candidates(&request).await?;
///     // Hand the candidates to the evaluation engine for the full match.
/// }
/// ```
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Insert a new policy, assigning a fresh unique ID when the caller left
    /// it empty. Returns the stored policy.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` on any underlying write error, including
    /// duplicate-ID conflicts.
    async fn create(&self, policy: Policy) -> PolicyResult<Policy>;

    /// Replace the full document identified by `policy.id`.
    ///
    /// Every top-level field except `id` is overwritten; nothing is merged.
    /// Zero documents affected is not itself an error.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when `policy.id` is empty and
    /// `Persistence` wrapping any underlying error.
    async fn update(&self, policy: &Policy) -> PolicyResult<()>;

    /// Point lookup by ID.
    ///
    /// # Errors
    ///
    /// Returns `PolicyNotFound` when absent, `Persistence` or `Decode`
    /// otherwise.
    async fn get(&self, id: &str) -> PolicyResult<Policy>;

    /// Remove the policy with the given ID.
    ///
    /// # Errors
    ///
    /// Returns `PolicyNotFound` when zero documents were removed,
    /// `Persistence` on other errors.
    async fn delete(&self, id: &str) -> PolicyResult<()>;

    /// Return a page of policies in the store's natural order.
    ///
    /// No explicit sort key is applied; callers requiring stable ordering
    /// must not rely on this operation alone. A `limit <= 0` means no
    /// pagination bound.
    ///
    /// # Errors
    ///
    /// Returns `NoPolicyFound` when the page is empty.
    async fn get_all(&self, limit: i64, offset: i64) -> PolicyResult<Vec<Policy>>;

    /// Every policy with a subject pattern beginning with the given literal,
    /// case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `NoPolicyFound` when nothing matches.
    async fn find_policies_for_subject(&self, subject: &str) -> PolicyResult<Vec<Policy>>;

    /// Every policy with a resource pattern beginning with the given
    /// literal, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `NoPolicyFound` when nothing matches.
    async fn find_policies_for_resource(&self, resource: &str) -> PolicyResult<Vec<Policy>>;

    /// Candidate policies for a request: the conjunction of the subject
    /// predicate, the resource predicate, and exact action membership.
    ///
    /// An empty request field drops its conjunct entirely instead of
    /// filtering on that dimension. The result is a deliberate superset:
    /// attribute conditions are *not* evaluated here.
    ///
    /// # Errors
    ///
    /// Returns `NoPolicyFound` when nothing matches.
    async fn find_request_candidates(&self, request: &AccessRequest) -> PolicyResult<Vec<Policy>>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_pattern_escapes_and_anchors() {
        assert_eq!(prefix_pattern("rooms:5"), "^rooms:5");
        assert_eq!(prefix_pattern("a.b*c"), r"^a\.b\*c");
    }

    #[test]
    fn test_pattern_begins_with_is_case_insensitive() {
        assert!(pattern_begins_with("groups:administrators", "groups:admin"));
        assert!(pattern_begins_with("GROUPS:ADMINISTRATORS", "groups:admin"));
        assert!(!pattern_begins_with("groups:admin", "groups:administrators"));
    }

    #[test]
    fn test_pattern_begins_with_treats_literal_verbatim() {
        // The request literal carries regex metacharacters; they must not
        // widen the match.
        assert!(!pattern_begins_with("roomsX5", "rooms.5"));
        assert!(pattern_begins_with("rooms.5-east", "rooms.5"));
    }
}
