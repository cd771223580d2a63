//! Tenant-scoped policy storage.
//!
//! Stores each policy as a full JSONB document keyed by its ID, one table
//! per tenant. Candidate retrieval narrows with anchored, case-insensitive
//! regex predicates over the document's `subjects`/`resources` arrays plus
//! exact action membership: a conservative superset of the evaluation
//! engine's own pattern matching, never a false negative.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::Postgres;
use uuid::Uuid;

use portcullis_policy::{
    AccessRequest, ConditionRegistry, Policy, PolicyDocument, PolicyResult, PolicyStore,
    PolicyStoreError, prefix_pattern,
};

use crate::schema::SchemaManager;
use crate::{PgPool, policy_table_name};

// =============================================================================
// Query Construction
// =============================================================================

/// Build the candidate query for a request: the conjunction of the subject,
/// resource, and action predicates, each dropped entirely when its request
/// field is empty. Returns the SQL and the parameters to bind in order.
fn build_candidate_query(table: &str, request: &AccessRequest) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    if !request.subject.is_empty() {
        params.push(prefix_pattern(&request.subject));
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM jsonb_array_elements_text(resource->'subjects') \
             AS s(pattern) WHERE s.pattern ~* ${})",
            params.len()
        ));
    }

    if !request.resource.is_empty() {
        params.push(prefix_pattern(&request.resource));
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM jsonb_array_elements_text(resource->'resources') \
             AS r(pattern) WHERE r.pattern ~* ${})",
            params.len()
        ));
    }

    if !request.action.is_empty() {
        params.push(request.action.clone());
        clauses.push(format!(
            "jsonb_exists(resource->'actions', ${})",
            params.len()
        ));
    }

    let sql = if clauses.is_empty() {
        format!("SELECT resource FROM {table}")
    } else {
        format!("SELECT resource FROM {table} WHERE {}", clauses.join(" AND "))
    };
    (sql, params)
}

// =============================================================================
// Policy Storage
// =============================================================================

/// Policy storage operations against one tenant's collection.
pub struct PostgresPolicyStore {
    pool: Arc<PgPool>,
    registry: Arc<ConditionRegistry>,
    schema: SchemaManager,
    table: String,
}

impl PostgresPolicyStore {
    /// Create a store scoped to the given tenant.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an unusable tenant name.
    pub fn new(
        pool: Arc<PgPool>,
        registry: Arc<ConditionRegistry>,
        schema: SchemaManager,
        tenant: &str,
    ) -> PolicyResult<Self> {
        Ok(Self {
            pool,
            registry,
            schema,
            table: policy_table_name(tenant)?,
        })
    }

    /// The table this store reads and writes.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Decode a page of JSONB documents, mapping an empty page to the
    /// `NoPolicyFound` domain signal.
    fn decode_page(&self, rows: Vec<(Value,)>) -> PolicyResult<Vec<Policy>> {
        if rows.is_empty() {
            return Err(PolicyStoreError::NoPolicyFound);
        }
        rows.into_iter()
            .map(|(resource,)| {
                let document: PolicyDocument = serde_json::from_value(resource)?;
                Policy::from_document(document, &self.registry)
            })
            .collect()
    }

    async fn fetch_page(
        &self,
        sql: &str,
        params: &[String],
        context: &'static str,
    ) -> PolicyResult<Vec<Policy>> {
        let mut q = query_as::<Postgres, (Value,)>(sql);
        for param in params {
            q = q.bind(param);
        }
        let rows = q
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(|e| PolicyStoreError::persistence_with(context, e))?;
        self.decode_page(rows)
    }
}

#[async_trait]
impl PolicyStore for PostgresPolicyStore {
    async fn create(&self, policy: Policy) -> PolicyResult<Policy> {
        self.schema.ensure_policy_table(&self.table).await?;

        let mut policy = policy;
        if policy.id.is_empty() {
            policy.id = Uuid::new_v4().simple().to_string();
        }
        let document = policy.to_document()?;
        let resource = serde_json::to_value(&document)?;

        let sql = format!("INSERT INTO {} (id, resource) VALUES ($1, $2)", self.table);
        query(&sql)
            .bind(&policy.id)
            .bind(&resource)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| {
                PolicyStoreError::persistence_with("failed creating new policy", e)
            })?;

        Ok(policy)
    }

    async fn update(&self, policy: &Policy) -> PolicyResult<()> {
        if policy.id.is_empty() {
            return Err(PolicyStoreError::invalid_parameter(
                "update request requires id attribute",
            ));
        }
        self.schema.ensure_policy_table(&self.table).await?;

        let document = policy.to_document()?;
        let resource = serde_json::to_value(&document)?;

        // Full-document replacement; zero rows affected is not an error.
        let sql = format!("UPDATE {} SET resource = $2 WHERE id = $1", self.table);
        query(&sql)
            .bind(&policy.id)
            .bind(&resource)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| {
                PolicyStoreError::persistence_with(
                    format!("failed updating policy #{}", policy.id),
                    e,
                )
            })?;

        Ok(())
    }

    async fn get(&self, id: &str) -> PolicyResult<Policy> {
        self.schema.ensure_policy_table(&self.table).await?;

        let sql = format!("SELECT resource FROM {} WHERE id = $1", self.table);
        let row: Option<(Value,)> = query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(|e| {
                PolicyStoreError::persistence_with(
                    format!("failed retrieving policy #{id}"),
                    e,
                )
            })?;

        let Some((resource,)) = row else {
            return Err(PolicyStoreError::not_found(id));
        };

        let document: PolicyDocument = serde_json::from_value(resource)?;
        Policy::from_document(document, &self.registry)
    }

    async fn delete(&self, id: &str) -> PolicyResult<()> {
        self.schema.ensure_policy_table(&self.table).await?;

        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        let result = query(&sql)
            .bind(id)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| PolicyStoreError::persistence_with("failed deleting policy", e))?;

        if result.rows_affected() == 0 {
            return Err(PolicyStoreError::not_found(id));
        }
        Ok(())
    }

    async fn get_all(&self, limit: i64, offset: i64) -> PolicyResult<Vec<Policy>> {
        self.schema.ensure_policy_table(&self.table).await?;

        let rows: Vec<(Value,)> = if limit > 0 {
            let sql = format!("SELECT resource FROM {} LIMIT $1 OFFSET $2", self.table);
            query_as(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool.as_ref())
                .await
        } else {
            let sql = format!("SELECT resource FROM {} OFFSET $1", self.table);
            query_as(&sql)
                .bind(offset)
                .fetch_all(self.pool.as_ref())
                .await
        }
        .map_err(|e| {
            PolicyStoreError::persistence_with("failed retrieving all policies", e)
        })?;

        self.decode_page(rows)
    }

    async fn find_policies_for_subject(&self, subject: &str) -> PolicyResult<Vec<Policy>> {
        self.schema.ensure_policy_table(&self.table).await?;

        let sql = format!(
            "SELECT resource FROM {} WHERE EXISTS \
             (SELECT 1 FROM jsonb_array_elements_text(resource->'subjects') \
             AS s(pattern) WHERE s.pattern ~* $1)",
            self.table
        );
        self.fetch_page(
            &sql,
            &[prefix_pattern(subject)],
            "failed retrieving policies by subject",
        )
        .await
    }

    async fn find_policies_for_resource(&self, resource: &str) -> PolicyResult<Vec<Policy>> {
        self.schema.ensure_policy_table(&self.table).await?;

        let sql = format!(
            "SELECT resource FROM {} WHERE EXISTS \
             (SELECT 1 FROM jsonb_array_elements_text(resource->'resources') \
             AS r(pattern) WHERE r.pattern ~* $1)",
            self.table
        );
        self.fetch_page(
            &sql,
            &[prefix_pattern(resource)],
            "failed retrieving policies by resource",
        )
        .await
    }

    async fn find_request_candidates(&self, request: &AccessRequest) -> PolicyResult<Vec<Policy>> {
        self.schema.ensure_policy_table(&self.table).await?;

        let (sql, params) = build_candidate_query(&self.table, request);
        self.fetch_page(&sql, &params, "failed retrieving policies by request")
            .await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_query_full_conjunction() {
        let request = AccessRequest::new("groups:administrators", "room:5", "update");
        let (sql, params) = build_candidate_query("eliving_policies", &request);

        assert!(sql.starts_with("SELECT resource FROM eliving_policies WHERE "));
        assert_eq!(sql.matches(" AND ").count(), 2);
        assert_eq!(
            params,
            vec![
                "^groups:administrators".to_string(),
                "^room:5".to_string(),
                "update".to_string(),
            ]
        );
        assert!(sql.contains("resource->'subjects'"));
        assert!(sql.contains("resource->'resources'"));
        assert!(sql.contains("jsonb_exists(resource->'actions', $3)"));
    }

    #[test]
    fn test_candidate_query_drops_empty_dimensions() {
        let request = AccessRequest::new("groups:administrators", "", "");
        let (sql, params) = build_candidate_query("eliving_policies", &request);

        assert!(!sql.contains("resource->'resources'"));
        assert!(!sql.contains("resource->'actions'"));
        assert_eq!(params, vec!["^groups:administrators".to_string()]);
    }

    #[test]
    fn test_candidate_query_with_no_dimensions_selects_everything() {
        let request = AccessRequest::default();
        let (sql, params) = build_candidate_query("eliving_policies", &request);

        assert_eq!(sql, "SELECT resource FROM eliving_policies");
        assert!(params.is_empty());
    }

    #[test]
    fn test_candidate_query_escapes_request_literals() {
        let request = AccessRequest::new("", "room.5", "");
        let (_, params) = build_candidate_query("eliving_policies", &request);
        assert_eq!(params, vec![r"^room\.5".to_string()]);
    }
}
