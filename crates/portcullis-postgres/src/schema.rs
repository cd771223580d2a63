//! Schema management for the PostgreSQL storage backend.
//!
//! Policy collections are tenant-scoped, so their tables are created
//! dynamically the first time a tenant's store touches them, following a
//! table-per-tenant pattern. Ensured tables are cached so the check runs
//! against the database only once per process.

use std::sync::Arc;

use dashmap::DashSet;
use sqlx_core::query::query;
use tracing::{debug, instrument};

use portcullis_policy::{EventResult, EventStoreError, PolicyResult, PolicyStoreError};

use crate::PgPool;

/// Name of the shared event table.
pub const EVENT_TABLE: &str = "event";

/// Manages the database schema for policy and event storage.
///
/// For each tenant the manager creates a `{tenant}_policies` table holding
/// the full policy document in a JSONB column, with a GIN index for the
/// pattern-array predicates used by candidate retrieval. The shared `event`
/// table is created on first use with an index on the deduplication key.
#[derive(Debug, Clone)]
pub struct SchemaManager {
    pool: Arc<PgPool>,
    /// Cache of tables that have been verified to exist.
    created_tables: Arc<DashSet<String>>,
}

impl SchemaManager {
    /// Creates a new `SchemaManager` with the given connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            created_tables: Arc::new(DashSet::new()),
        }
    }

    /// Ensure a tenant's policy table and its index exist.
    ///
    /// The table name must already be validated; it is interpolated into
    /// DDL verbatim.
    ///
    /// # Errors
    ///
    /// Returns a `Persistence` error if the DDL fails.
    #[instrument(skip(self))]
    pub async fn ensure_policy_table(&self, table: &str) -> PolicyResult<()> {
        if self.created_tables.contains(table) {
            return Ok(());
        }

        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                resource JSONB NOT NULL
            )
            "#
        );
        query(&ddl)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| {
                PolicyStoreError::persistence_with(
                    format!("failed creating policy table {table}"),
                    e,
                )
            })?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS {table}_resource_gin ON {table} USING GIN (resource)"
        );
        query(&index)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| {
                PolicyStoreError::persistence_with(
                    format!("failed indexing policy table {table}"),
                    e,
                )
            })?;

        self.created_tables.insert(table.to_string());
        debug!(table, "policy table ensured");
        Ok(())
    }

    /// Ensure the shared event table and its indexes exist.
    ///
    /// # Errors
    ///
    /// Returns a `Persistence` error if the DDL fails.
    #[instrument(skip(self))]
    pub async fn ensure_event_table(&self) -> EventResult<()> {
        if self.created_tables.contains(EVENT_TABLE) {
            return Ok(());
        }

        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {EVENT_TABLE} (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                merchant_id TEXT NOT NULL,
                action TEXT NOT NULL,
                event_time BIGINT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                meta JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL DEFAULT 0
            )
            "#
        );
        query(&ddl)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| {
                EventStoreError::persistence_with("failed creating event table", e)
            })?;

        // Deduplicating emits update by this key; not unique because the
        // historical mode allows similar events to co-exist.
        let index = format!(
            "CREATE INDEX IF NOT EXISTS {EVENT_TABLE}_dedup_key \
             ON {EVENT_TABLE} (user_id, merchant_id, action)"
        );
        query(&index)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| {
                EventStoreError::persistence_with("failed indexing event table", e)
            })?;

        self.created_tables.insert(EVENT_TABLE.to_string());
        debug!(table = EVENT_TABLE, "event table ensured");
        Ok(())
    }
}
