//! PostgreSQL storage backend for Portcullis.
//!
//! Provides persistent storage for:
//!
//! - Access policies (one JSONB document table per tenant)
//! - Access events (shared `event` table with a deduplicating emit mode)
//!
//! Policies are stored as full documents in a JSONB column; candidate
//! retrieval runs anchored, case-insensitive regex predicates over the
//! document's pattern arrays so the narrowing semantics match the in-memory
//! backend exactly. Tables are created dynamically by the [`SchemaManager`]
//! the first time a tenant's store touches them.
//!
//! # Example
//!
//! ```ignore
//! use portcullis_postgres::PostgresGateStorage;
//!
//! // Create storage with an already-authenticated pool
//! let storage = PostgresGateStorage::connect("postgres://localhost/gate").await?;
//!
//! // Use a tenant-scoped policy store
//! let policies = storage.policies("eliving")?;
//! let candidates = policies.find_request_candidates(&request).await?;
//! ```

pub mod event;
pub mod policy;
pub mod schema;

use std::sync::Arc;

use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

use portcullis_policy::{ConditionRegistry, PolicyResult, PolicyStoreError};

pub use event::PostgresEventStore;
pub use policy::PostgresPolicyStore;
pub use schema::SchemaManager;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

/// Suffix appended to the tenant name to form its policy table.
pub const POLICY_TABLE_SUFFIX: &str = "_policies";

/// Build the policy table name for a tenant, validating the tenant name
/// before it is interpolated into SQL.
///
/// Tenant names become part of an unquoted identifier, so only lowercase
/// ASCII letters, digits, and underscores are accepted, and the first
/// character must not be a digit.
///
/// # Errors
///
/// Returns [`PolicyStoreError::InvalidParameter`] for an unusable tenant
/// name.
pub fn policy_table_name(tenant: &str) -> PolicyResult<String> {
    let mut chars = tenant.chars();
    let valid_first = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_rest =
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid_first || !valid_rest || tenant.len() > 48 {
        return Err(PolicyStoreError::invalid_parameter(format!(
            "tenant name {tenant:?} is not a usable collection name"
        )));
    }
    Ok(format!("{tenant}{POLICY_TABLE_SUFFIX}"))
}

// =============================================================================
// PostgreSQL Gate Storage
// =============================================================================

/// PostgreSQL storage backend for the gate service.
///
/// Holds a connection pool and the condition registry, and hands out
/// tenant-scoped policy stores and the shared event store. The pool is
/// injected ready and already authenticated; this crate never manages
/// connection lifecycle beyond pooling.
#[derive(Debug, Clone)]
pub struct PostgresGateStorage {
    pool: Arc<PgPool>,
    registry: Arc<ConditionRegistry>,
    schema: SchemaManager,
}

impl PostgresGateStorage {
    /// Create new storage with an existing connection pool and registry.
    ///
    /// The registry must be fully populated before the first decode runs.
    #[must_use]
    pub fn new(pool: Arc<PgPool>, registry: Arc<ConditionRegistry>) -> Self {
        let schema = SchemaManager::new(Arc::clone(&pool));
        Self {
            pool,
            registry,
            schema,
        }
    }

    /// Create new storage by connecting to the database, with the built-in
    /// condition variants registered.
    ///
    /// # Errors
    ///
    /// Returns a `Persistence` error if the connection fails.
    pub async fn connect(database_url: &str) -> PolicyResult<Self> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new()
            .connect(database_url)
            .await
            .map_err(|e| {
                PolicyStoreError::persistence_with("failed connecting to postgres", e)
            })?;
        Ok(Self::new(
            Arc::new(pool),
            Arc::new(ConditionRegistry::builtin()),
        ))
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the condition registry.
    #[must_use]
    pub fn registry(&self) -> &ConditionRegistry {
        &self.registry
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    /// Policy store scoped to one tenant's collection.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an unusable tenant name.
    pub fn policies(&self, tenant: &str) -> PolicyResult<PostgresPolicyStore> {
        PostgresPolicyStore::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.registry),
            self.schema.clone(),
            tenant,
        )
    }

    /// The shared event store.
    #[must_use]
    pub fn events(&self) -> PostgresEventStore {
        PostgresEventStore::new(Arc::clone(&self.pool), self.schema.clone())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_table_name_appends_suffix() {
        assert_eq!(policy_table_name("eliving").unwrap(), "eliving_policies");
        assert_eq!(
            policy_table_name("shop_42").unwrap(),
            "shop_42_policies"
        );
    }

    #[test]
    fn test_policy_table_name_rejects_unsafe_tenants() {
        for tenant in ["", "Shop", "42shop", "shop;drop", "shop name", "a\"b"] {
            let err = policy_table_name(tenant).unwrap_err();
            assert!(err.is_invalid_parameter(), "accepted {tenant:?}");
        }
    }
}
