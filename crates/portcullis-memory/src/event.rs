//! In-memory implementation of the `EventStore` trait.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use portcullis_policy::{Event, EventQuery, EventResult, EventStore};

// =============================================================================
// In-Memory Event Store
// =============================================================================

/// In-memory event store.
///
/// Events are kept in insertion order; retrieval walks them newest first,
/// matching the PostgreSQL backend's ordering.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    data: Arc<RwLock<Vec<Event>>>,
}

impl InMemoryEventStore {
    /// Create an empty event store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Returns `true` if no events are stored.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

fn matches_query(event: &Event, query: &EventQuery) -> bool {
    if event.user_id != query.user_id || event.merchant_id != query.merchant_id {
        return false;
    }
    if !query.actions.is_empty() && !query.actions.contains(&event.action) {
        return false;
    }
    query
        .meta
        .iter()
        .all(|(key, value)| event.meta.get(key) == Some(value))
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn emit(&self, event: &Event, allow_duplicates: bool) -> EventResult<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let event_time = if event.event_time == 0 {
            now
        } else {
            event.event_time
        };

        let mut events = self.data.write().await;

        // Store all events - allow similar events to co-exist.
        if allow_duplicates {
            let mut stored = event.clone();
            stored.id = Uuid::new_v4().simple().to_string();
            stored.event_time = event_time;
            stored.created_at = now;
            events.push(stored);
            return Ok(());
        }

        // Allow only one similar event per user/merchant/action; later emits
        // touch the timing fields and preserve the creation-time fields.
        if let Some(existing) = events.iter_mut().find(|e| {
            e.user_id == event.user_id
                && e.merchant_id == event.merchant_id
                && e.action == event.action
        }) {
            existing.event_time = event_time;
            existing.updated_at = now;
            return Ok(());
        }

        let mut stored = event.clone();
        stored.id = Uuid::new_v4().simple().to_string();
        stored.event_time = event_time;
        stored.created_at = now;
        stored.updated_at = now;
        events.push(stored);
        Ok(())
    }

    async fn find_user_merchants(&self, user_id: &str) -> EventResult<Vec<String>> {
        let events = self.data.read().await;
        let mut merchants: Vec<String> = Vec::new();
        for event in events.iter().filter(|e| e.user_id == user_id) {
            if !merchants.contains(&event.merchant_id) {
                merchants.push(event.merchant_id.clone());
            }
        }
        Ok(merchants)
    }

    async fn retrieve(&self, query: &EventQuery) -> EventResult<Vec<Event>> {
        let events = self.data.read().await;
        let skip = query.skip.max(0) as usize;

        let filtered = events
            .iter()
            .rev()
            .filter(|event| matches_query(event, query))
            .skip(skip);

        let page: Vec<Event> = if query.limit > 0 {
            filtered.take(query.limit as usize).cloned().collect()
        } else {
            filtered.cloned().collect()
        };
        Ok(page)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use serde_json::json;

    fn seed_events(n: usize, duplicate: bool) -> Vec<Event> {
        (0..n)
            .map(|i| {
                let seq = if duplicate { i } else { 0 };
                let mut meta = HashMap::new();
                meta.insert("deals_id".to_string(), json!(seq));
                meta.insert("agenda_id".to_string(), json!(seq));
                Event::new(
                    "komang",
                    "merchant",
                    format!("action-{seq}"),
                    format!("this is a note of event-{i}"),
                    meta,
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_emit_historical_keeps_every_event() {
        let store = InMemoryEventStore::new();
        for event in seed_events(10, true) {
            store.emit(&event, true).await.unwrap();
        }
        assert_eq!(store.len().await, 10);

        let all = store
            .retrieve(&EventQuery::new("komang", "merchant"))
            .await
            .unwrap();
        assert_eq!(all.len(), 10);
        assert!(all.iter().all(|e| !e.id.is_empty()));
    }

    #[tokio::test]
    async fn test_emit_dedup_upserts_by_user_merchant_action() {
        let store = InMemoryEventStore::new();
        for event in seed_events(10, false) {
            store.emit(&event, false).await.unwrap();
        }
        assert_eq!(store.len().await, 1);

        let stored = store
            .retrieve(&EventQuery::new("komang", "merchant"))
            .await
            .unwrap();
        // The creation-time fields come from the first emit.
        assert_eq!(stored[0].notes, "this is a note of event-0");
        assert_eq!(stored[0].meta["deals_id"], json!(0));
        assert!(stored[0].updated_at > 0);
    }

    #[tokio::test]
    async fn test_retrieve_filters_by_action() {
        let store = InMemoryEventStore::new();
        for event in seed_events(10, true) {
            store.emit(&event, true).await.unwrap();
        }

        let query = EventQuery::new("komang", "merchant")
            .with_actions(vec!["action-1".to_string(), "action-3".to_string()]);
        let found = store.retrieve(&query).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_retrieve_filters_by_meta_exact_match() {
        let store = InMemoryEventStore::new();
        for event in seed_events(10, true) {
            store.emit(&event, true).await.unwrap();
        }

        let query = EventQuery::new("komang", "merchant").with_meta("deals_id", json!(7));
        let found = store.retrieve(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].action, "action-7");

        let query = EventQuery::new("komang", "merchant").with_meta("deals_id", json!("7"));
        let found = store.retrieve(&query).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_paginates_newest_first() {
        let store = InMemoryEventStore::new();
        for event in seed_events(10, true) {
            store.emit(&event, true).await.unwrap();
        }

        let query = EventQuery::new("komang", "merchant").with_pagination(4, 8);
        let found = store.retrieve(&query).await.unwrap();
        assert_eq!(found.len(), 2);
        // Newest first: the page tail holds the earliest events.
        assert_eq!(found[1].action, "action-0");
    }

    #[tokio::test]
    async fn test_retrieve_for_other_user_is_empty() {
        let store = InMemoryEventStore::new();
        for event in seed_events(3, true) {
            store.emit(&event, true).await.unwrap();
        }

        let found = store
            .retrieve(&EventQuery::new("somebody-else", "merchant"))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_find_user_merchants_is_distinct() {
        let store = InMemoryEventStore::new();
        let mut event = Event::new("komang", "merchant-a", "login", "", HashMap::new());
        store.emit(&event, true).await.unwrap();
        store.emit(&event, true).await.unwrap();
        event.merchant_id = "merchant-b".to_string();
        store.emit(&event, true).await.unwrap();
        event.user_id = "other".to_string();
        event.merchant_id = "merchant-c".to_string();
        store.emit(&event, true).await.unwrap();

        let merchants = store.find_user_merchants("komang").await.unwrap();
        assert_eq!(
            merchants,
            vec!["merchant-a".to_string(), "merchant-b".to_string()]
        );
    }
}
