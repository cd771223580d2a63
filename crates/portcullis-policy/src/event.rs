//! Access events and the event storage trait.
//!
//! Events record user activity against a merchant (`register`, `login`,
//! door entries, …) and feed the audit surface of the gate service. The
//! store supports both an append-only history mode and a deduplicating
//! upsert mode keyed on `(user_id, merchant_id, action)`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::EventResult;

// =============================================================================
// Event
// =============================================================================

/// A single recorded event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Document identifier; assigned by the store on insert.
    #[serde(default)]
    pub id: String,

    /// The acting user.
    pub user_id: String,

    /// The merchant (tenant) the event belongs to.
    pub merchant_id: String,

    /// Action name, e.g. `register` or `login`.
    pub action: String,

    /// When the event happened, unix seconds.
    #[serde(default)]
    pub event_time: i64,

    /// Verbatim notes.
    #[serde(default)]
    pub notes: String,

    /// Searchable context attributes.
    #[serde(default)]
    pub meta: HashMap<String, Value>,

    /// Creation timestamp, unix seconds; set once on insert.
    #[serde(default)]
    pub created_at: i64,

    /// Last update timestamp, unix seconds; bumped by deduplicating emits.
    #[serde(default)]
    pub updated_at: i64,
}

impl Event {
    /// Create a new event stamped with the current time.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        merchant_id: impl Into<String>,
        action: impl Into<String>,
        notes: impl Into<String>,
        meta: HashMap<String, Value>,
    ) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            id: String::new(),
            user_id: user_id.into(),
            merchant_id: merchant_id.into(),
            action: action.into(),
            event_time: now,
            notes: notes.into(),
            meta,
            created_at: now,
            updated_at: 0,
        }
    }
}

// =============================================================================
// Event Query
// =============================================================================

/// Parameters for retrieving events.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// The user the events belong to.
    pub user_id: String,

    /// The merchant the events belong to.
    pub merchant_id: String,

    /// Restrict to these actions; empty means any action.
    pub actions: Vec<String>,

    /// Exact-match filters on meta attributes; empty means no meta filter.
    pub meta: HashMap<String, Value>,

    /// Maximum number of results; `<= 0` means no bound.
    pub limit: i64,

    /// Number of results to skip.
    pub skip: i64,
}

impl EventQuery {
    /// Create a query for one user/merchant pair.
    #[must_use]
    pub fn new(user_id: impl Into<String>, merchant_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            merchant_id: merchant_id.into(),
            ..Self::default()
        }
    }

    /// Restrict to the given actions.
    #[must_use]
    pub fn with_actions(mut self, actions: Vec<String>) -> Self {
        self.actions = actions;
        self
    }

    /// Require an exact-match meta attribute.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Set pagination parameters.
    #[must_use]
    pub fn with_pagination(mut self, limit: i64, skip: i64) -> Self {
        self.limit = limit;
        self.skip = skip;
        self
    }
}

// =============================================================================
// Event Store Trait
// =============================================================================

/// Persistence operations for events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Record an event.
    ///
    /// With `allow_duplicates` a new document is always inserted (fresh ID,
    /// `created_at` stamped now, `event_time` defaulted to now when unset).
    /// Without it, the store upserts keyed on
    /// `(user_id, merchant_id, action)`: only `event_time` and `updated_at`
    /// change on an existing document, while the creation-time fields
    /// (`notes`, `meta`, `created_at`) are preserved.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` on any underlying write error.
    async fn emit(&self, event: &Event, allow_duplicates: bool) -> EventResult<()>;

    /// Distinct merchant IDs the user has events with.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` on any underlying read error.
    async fn find_user_merchants(&self, user_id: &str) -> EventResult<Vec<String>>;

    /// Events for a user/merchant pair, newest first, honoring the query's
    /// action, meta, and pagination filters.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` or `Decode` on underlying failures. An empty
    /// result set is not an error.
    async fn retrieve(&self, query: &EventQuery) -> EventResult<Vec<Event>>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_event_is_stamped() {
        let event = Event::new(
            "users:ada",
            "merchant-1",
            "login",
            "first login",
            HashMap::new(),
        );
        assert!(event.id.is_empty());
        assert!(event.event_time > 0);
        assert_eq!(event.event_time, event.created_at);
        assert_eq!(event.updated_at, 0);
    }

    #[test]
    fn test_query_builder() {
        let query = EventQuery::new("users:ada", "merchant-1")
            .with_actions(vec!["login".to_string()])
            .with_meta("deals_id", json!(7))
            .with_pagination(10, 5);
        assert_eq!(query.user_id, "users:ada");
        assert_eq!(query.actions, vec!["login".to_string()]);
        assert_eq!(query.meta["deals_id"], json!(7));
        assert_eq!((query.limit, query.skip), (10, 5));
    }
}
