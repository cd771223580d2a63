//! Event storage.
//!
//! Events live in one shared table. The deduplicating emit mode emulates the
//! upsert the gate service relies on: update timing fields by the
//! `(user_id, merchant_id, action)` key, insert the full document only when
//! no such event exists yet.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::Postgres;
use time::OffsetDateTime;
use uuid::Uuid;

use portcullis_policy::{Event, EventQuery, EventResult, EventStore, EventStoreError};

use crate::PgPool;
use crate::schema::{EVENT_TABLE, SchemaManager};

/// Row shape of the event table.
type EventRow = (
    String, // id
    String, // user_id
    String, // merchant_id
    String, // action
    i64,    // event_time
    String, // notes
    Value,  // meta
    i64,    // created_at
    i64,    // updated_at
);

fn row_to_event(row: EventRow) -> EventResult<Event> {
    let (id, user_id, merchant_id, action, event_time, notes, meta, created_at, updated_at) = row;
    let meta: HashMap<String, Value> = serde_json::from_value(meta)?;
    Ok(Event {
        id,
        user_id,
        merchant_id,
        action,
        event_time,
        notes,
        meta,
        created_at,
        updated_at,
    })
}

// =============================================================================
// Event Storage
// =============================================================================

/// Event storage operations.
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
    schema: SchemaManager,
}

impl PostgresEventStore {
    /// Create a new event store over the shared event table.
    #[must_use]
    pub fn new(pool: Arc<PgPool>, schema: SchemaManager) -> Self {
        Self { pool, schema }
    }

    async fn insert(&self, event: &Event, now: i64, event_time: i64) -> EventResult<()> {
        let meta = serde_json::to_value(&event.meta)?;
        let sql = format!(
            "INSERT INTO {EVENT_TABLE} \
             (id, user_id, merchant_id, action, event_time, notes, meta, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        );
        query(&sql)
            .bind(Uuid::new_v4().simple().to_string())
            .bind(&event.user_id)
            .bind(&event.merchant_id)
            .bind(&event.action)
            .bind(event_time)
            .bind(&event.notes)
            .bind(&meta)
            .bind(now)
            .bind(event.updated_at)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| {
                EventStoreError::persistence_with("failed creating new persistent event", e)
            })?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn emit(&self, event: &Event, allow_duplicates: bool) -> EventResult<()> {
        self.schema.ensure_event_table().await?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let event_time = if event.event_time == 0 {
            now
        } else {
            event.event_time
        };

        // Store all events - allow similar events to co-exist.
        if allow_duplicates {
            return self.insert(event, now, event_time).await;
        }

        // Allow only one similar event per user/merchant/action: update the
        // timing fields when the event exists, insert the full document
        // otherwise, preserving creation-time fields on later emits.
        let sql = format!(
            "UPDATE {EVENT_TABLE} SET event_time = $4, updated_at = $5 \
             WHERE user_id = $1 AND merchant_id = $2 AND action = $3"
        );
        let result = query(&sql)
            .bind(&event.user_id)
            .bind(&event.merchant_id)
            .bind(&event.action)
            .bind(event_time)
            .bind(now)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| EventStoreError::persistence_with("failed updating event", e))?;

        if result.rows_affected() == 0 {
            let mut fresh = event.clone();
            fresh.updated_at = now;
            return self.insert(&fresh, now, event_time).await;
        }
        Ok(())
    }

    async fn find_user_merchants(&self, user_id: &str) -> EventResult<Vec<String>> {
        self.schema.ensure_event_table().await?;

        let sql = format!("SELECT DISTINCT merchant_id FROM {EVENT_TABLE} WHERE user_id = $1");
        let rows: Vec<(String,)> = query_as(&sql)
            .bind(user_id)
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(|e| {
                EventStoreError::persistence_with("failed retrieving unique merchants", e)
            })?;

        Ok(rows.into_iter().map(|(merchant_id,)| merchant_id).collect())
    }

    async fn retrieve(&self, event_query: &EventQuery) -> EventResult<Vec<Event>> {
        self.schema.ensure_event_table().await?;

        let mut sql = format!(
            "SELECT id, user_id, merchant_id, action, event_time, notes, meta, \
             created_at, updated_at FROM {EVENT_TABLE} \
             WHERE user_id = $1 AND merchant_id = $2"
        );
        let mut next_param = 2;

        if !event_query.actions.is_empty() {
            next_param += 1;
            sql.push_str(&format!(" AND action = ANY(${next_param})"));
        }
        // JSONB containment gives exact matches on every filtered meta key.
        let meta = if event_query.meta.is_empty() {
            None
        } else {
            next_param += 1;
            sql.push_str(&format!(" AND meta @> ${next_param}"));
            Some(serde_json::to_value(&event_query.meta)?)
        };

        sql.push_str(" ORDER BY created_at DESC, id DESC");
        if event_query.limit > 0 {
            next_param += 1;
            sql.push_str(&format!(" LIMIT ${next_param}"));
        }
        next_param += 1;
        sql.push_str(&format!(" OFFSET ${next_param}"));

        let mut q = query_as::<Postgres, EventRow>(&sql)
            .bind(&event_query.user_id)
            .bind(&event_query.merchant_id);
        if !event_query.actions.is_empty() {
            q = q.bind(&event_query.actions);
        }
        if let Some(meta) = &meta {
            q = q.bind(meta);
        }
        if event_query.limit > 0 {
            q = q.bind(event_query.limit);
        }
        q = q.bind(event_query.skip);

        let rows = q.fetch_all(self.pool.as_ref()).await.map_err(|e| {
            EventStoreError::persistence_with("failed retrieving all events", e)
        })?;

        rows.into_iter().map(row_to_event).collect()
    }
}
