//! In-memory implementation of the `PolicyStore` trait.

use std::sync::Arc;

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use uuid::Uuid;

use portcullis_policy::{
    AccessRequest, ConditionRegistry, Policy, PolicyDocument, PolicyResult, PolicyStore,
    PolicyStoreError, pattern_begins_with,
};

/// Mirror of the candidate query the PostgreSQL backend runs: conjunction of
/// the pattern predicates and action membership, empty request fields
/// dropping their conjunct.
fn matches_request(document: &PolicyDocument, request: &AccessRequest) -> bool {
    if !request.subject.is_empty()
        && !document
            .subjects
            .iter()
            .any(|pattern| pattern_begins_with(pattern, &request.subject))
    {
        return false;
    }
    if !request.resource.is_empty()
        && !document
            .resources
            .iter()
            .any(|pattern| pattern_begins_with(pattern, &request.resource))
    {
        return false;
    }
    if !request.action.is_empty() && !document.actions.contains(&request.action) {
        return false;
    }
    true
}

// =============================================================================
// In-Memory Policy Store
// =============================================================================

/// In-memory policy store over one tenant's collection.
///
/// Documents are held in a papaya lock-free HashMap in their persisted form
/// and decoded through the registry on every read. Iteration order is the
/// map's natural order, which is deliberately unspecified; callers of
/// `get_all` must not rely on it.
#[derive(Debug)]
pub struct InMemoryPolicyStore {
    tenant: String,
    registry: Arc<ConditionRegistry>,
    data: Arc<PapayaHashMap<String, PolicyDocument>>,
}

impl InMemoryPolicyStore {
    /// Create a store for the given tenant with the built-in condition
    /// variants registered.
    #[must_use]
    pub fn new(tenant: impl Into<String>) -> Self {
        Self::with_registry(tenant, Arc::new(ConditionRegistry::builtin()))
    }

    /// Create a store decoding conditions through the given registry.
    #[must_use]
    pub fn with_registry(tenant: impl Into<String>, registry: Arc<ConditionRegistry>) -> Self {
        Self {
            tenant: tenant.into(),
            registry,
            data: Arc::new(PapayaHashMap::new()),
        }
    }

    /// The tenant this store is scoped to.
    #[must_use]
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Number of stored policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.pin().len()
    }

    /// Returns `true` if no policies are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.pin().is_empty()
    }

    fn collect_documents<F>(&self, keep: F) -> Vec<PolicyDocument>
    where
        F: Fn(&PolicyDocument) -> bool,
    {
        let guard = self.data.pin();
        guard
            .iter()
            .filter(|(_, document)| keep(document))
            .map(|(_, document)| document.clone())
            .collect()
    }

    /// Decode a page of documents, mapping an empty page to the
    /// `NoPolicyFound` domain signal.
    fn decode_page(&self, documents: Vec<PolicyDocument>) -> PolicyResult<Vec<Policy>> {
        if documents.is_empty() {
            return Err(PolicyStoreError::NoPolicyFound);
        }
        documents
            .into_iter()
            .map(|document| Policy::from_document(document, &self.registry))
            .collect()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn create(&self, policy: Policy) -> PolicyResult<Policy> {
        let mut policy = policy;
        if policy.id.is_empty() {
            policy.id = Uuid::new_v4().simple().to_string();
        }
        let document = policy.to_document()?;

        let guard = self.data.pin();
        if guard.get(&policy.id).is_some() {
            return Err(PolicyStoreError::persistence(format!(
                "policy #{} already exists",
                policy.id
            )));
        }
        guard.insert(policy.id.clone(), document);
        Ok(policy)
    }

    async fn update(&self, policy: &Policy) -> PolicyResult<()> {
        if policy.id.is_empty() {
            return Err(PolicyStoreError::invalid_parameter(
                "update request requires id attribute",
            ));
        }
        let document = policy.to_document()?;

        // Full-document replacement; a missing ID is a no-op, not an error.
        let guard = self.data.pin();
        if guard.get(&policy.id).is_some() {
            guard.insert(policy.id.clone(), document);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> PolicyResult<Policy> {
        let document = {
            let guard = self.data.pin();
            guard.get(id).cloned()
        };
        let Some(document) = document else {
            return Err(PolicyStoreError::not_found(id));
        };
        Policy::from_document(document, &self.registry)
    }

    async fn delete(&self, id: &str) -> PolicyResult<()> {
        let guard = self.data.pin();
        if guard.remove(id).is_none() {
            return Err(PolicyStoreError::not_found(id));
        }
        Ok(())
    }

    async fn get_all(&self, limit: i64, offset: i64) -> PolicyResult<Vec<Policy>> {
        let documents = self.collect_documents(|_| true);
        let skip = offset.max(0) as usize;
        let page: Vec<PolicyDocument> = if limit > 0 {
            documents.into_iter().skip(skip).take(limit as usize).collect()
        } else {
            documents.into_iter().skip(skip).collect()
        };
        self.decode_page(page)
    }

    async fn find_policies_for_subject(&self, subject: &str) -> PolicyResult<Vec<Policy>> {
        let documents = self.collect_documents(|document| {
            document
                .subjects
                .iter()
                .any(|pattern| pattern_begins_with(pattern, subject))
        });
        self.decode_page(documents)
    }

    async fn find_policies_for_resource(&self, resource: &str) -> PolicyResult<Vec<Policy>> {
        let documents = self.collect_documents(|document| {
            document
                .resources
                .iter()
                .any(|pattern| pattern_begins_with(pattern, resource))
        });
        self.decode_page(documents)
    }

    async fn find_request_candidates(&self, request: &AccessRequest) -> PolicyResult<Vec<Policy>> {
        let documents = self.collect_documents(|document| matches_request(document, request));
        self.decode_page(documents)
    }
}

// =============================================================================
// Tests
// =============================================================================
