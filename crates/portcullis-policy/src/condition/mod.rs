//! Polymorphic policy conditions.
//!
//! A condition is a named predicate attached to a policy by label. The set of
//! condition types is open-ended: new variants are declared by implementing
//! [`Condition`] and registering the type in a [`ConditionRegistry`], without
//! the policy container or the storage layer ever learning their concrete
//! shape. Persistence uses a tagged-record scheme: each labeled condition is
//! stored as `{type, options}` and reconstructed through the registry at
//! decode time.
//!
//! # Example
//!
//! ```ignore
//! use portcullis_policy::condition::{ConditionRegistry, Conditions, StringPrefixCondition};
//!
//! let registry = ConditionRegistry::builtin();
//!
//! let mut conditions = Conditions::new();
//! conditions.insert("owner", Box::new(StringPrefixCondition {
//!     prefix: "users:".to_string(),
//!     case_sensitive: true,
//! }));
//!
//! let records = conditions.encode()?;
//! let restored = Conditions::decode(records, &registry)?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PolicyResult, PolicyStoreError};
use crate::request::AccessRequest;

mod string_list;
mod string_prefix;

pub use string_list::StringListCondition;
pub use string_prefix::StringPrefixCondition;

// =============================================================================
// Condition Trait
// =============================================================================

/// A pluggable predicate over one request attribute.
///
/// Variants are stateless: they are keyed only by their own configuration
/// fields and hold no reference to the owning policy or the store.
pub trait Condition: fmt::Debug + Send + Sync {
    /// Stable type name used as the serialization tag.
    fn name(&self) -> &'static str;

    /// Decide whether the condition is fulfilled by the given attribute
    /// value in the context of the request.
    fn fulfills(&self, value: &Value, request: &AccessRequest) -> bool;

    /// Generically encode the variant's configuration fields.
    ///
    /// The encoded value becomes the `options` half of the tagged record and
    /// must round-trip through the same field names the variant
    /// deserializes.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be represented as JSON.
    fn encode_options(&self) -> Result<Value, serde_json::Error>;
}

/// Owned, type-erased condition.
pub type BoxedCondition = Box<dyn Condition>;

// =============================================================================
// Condition Registry
// =============================================================================

/// Factory that reconstructs a condition variant from its encoded options.
pub type ConditionFactory = fn(Value) -> Result<BoxedCondition, serde_json::Error>;

fn decode_variant<C>(options: Value) -> Result<BoxedCondition, serde_json::Error>
where
    C: Condition + Default + DeserializeOwned + 'static,
{
    if options_are_empty(&options) {
        // Marker conditions carry no configuration; store the zero value.
        return Ok(Box::new(C::default()));
    }
    Ok(Box::new(serde_json::from_value::<C>(options)?))
}

fn options_are_empty(options: &Value) -> bool {
    match options {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Mapping from condition type name to reconstruction factory.
///
/// The registry is an explicit, injectable object rather than a process-wide
/// singleton so tests can build isolated instances. Registration is expected
/// to complete during process initialization; stores share the finished
/// registry behind an `Arc` and never mutate it while decodes are in flight.
#[derive(Debug, Clone)]
pub struct ConditionRegistry {
    factories: HashMap<String, ConditionFactory>,
}

impl ConditionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry pre-populated with the built-in variants.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register::<StringListCondition>();
        registry.register::<StringPrefixCondition>();
        registry
    }

    /// Register a condition variant under its own type name.
    ///
    /// Registration is idempotent; registering the same name twice replaces
    /// the earlier factory (last writer wins).
    pub fn register<C>(&mut self)
    where
        C: Condition + Default + DeserializeOwned + 'static,
    {
        let name = C::default().name().to_string();
        self.factories.insert(name, decode_variant::<C>);
    }

    /// Returns `true` if a variant is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Number of registered variants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if no variants are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Reconstruct a condition from its type name and encoded options.
    ///
    /// Invoked only during deserialization.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError::UnknownConditionType`] if no variant is
    /// registered under `name`, or [`PolicyStoreError::Decode`] if the
    /// options fail to decode into the variant.
    pub fn create(&self, name: &str, options: Value) -> PolicyResult<BoxedCondition> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PolicyStoreError::unknown_condition_type(name))?;
        factory(options).map_err(PolicyStoreError::from)
    }
}

impl Default for ConditionRegistry {
    /// The default registry knows the built-in variants.
    fn default() -> Self {
        Self::builtin()
    }
}

// =============================================================================
// Tagged Records
// =============================================================================

/// Persisted form of one labeled condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedCondition {
    /// Condition type name, resolvable through the registry.
    #[serde(rename = "type")]
    pub kind: String,

    /// Variant-specific encoded configuration fields.
    #[serde(default)]
    pub options: Value,
}

// =============================================================================
// Condition Container
// =============================================================================

/// Mapping from label to condition, owned by a policy.
///
/// Labels are arbitrary strings chosen by the policy author; at evaluation
/// time they are matched against attribute keys supplied in the request
/// context. Ordering is irrelevant.
#[derive(Debug, Default)]
pub struct Conditions {
    inner: BTreeMap<String, BoxedCondition>,
}

impl Conditions {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a condition under the given label, replacing any previous one.
    pub fn insert(&mut self, label: impl Into<String>, condition: BoxedCondition) {
        self.inner.insert(label.into(), condition);
    }

    /// Look up a condition by label.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&dyn Condition> {
        self.inner.get(label).map(|c| &**c)
    }

    /// Number of attached conditions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if no conditions are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate over labels and conditions.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Condition)> {
        self.inner.iter().map(|(label, c)| (label.as_str(), &**c))
    }

    /// Encode every labeled condition into its tagged record.
    ///
    /// # Errors
    ///
    /// Returns an error if a variant's configuration cannot be encoded.
    pub fn encode(&self) -> Result<BTreeMap<String, TaggedCondition>, serde_json::Error> {
        let mut out = BTreeMap::new();
        for (label, condition) in &self.inner {
            out.insert(
                label.clone(),
                TaggedCondition {
                    kind: condition.name().to_string(),
                    options: condition.encode_options()?,
                },
            );
        }
        Ok(out)
    }

    /// Reconstruct a container from tagged records through the registry.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError::UnknownConditionType`] if a record's tag
    /// was never registered, meaning the document is corrupt or a variant
    /// is missing. No partial state is produced in that case.
    pub fn decode(
        records: BTreeMap<String, TaggedCondition>,
        registry: &ConditionRegistry,
    ) -> PolicyResult<Self> {
        let mut inner = BTreeMap::new();
        for (label, record) in records {
            let condition = registry.create(&record.kind, record.options)?;
            inner.insert(label, condition);
        }
        Ok(Self { inner })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct MarkerCondition;

    impl Condition for MarkerCondition {
        fn name(&self) -> &'static str {
            "MarkerCondition"
        }

        fn fulfills(&self, _value: &Value, _request: &AccessRequest) -> bool {
            true
        }

        fn encode_options(&self) -> Result<Value, serde_json::Error> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_builtin_registry_knows_both_variants() {
        let registry = ConditionRegistry::builtin();
        assert!(registry.contains("StringListCondition"));
        assert!(registry.contains("StringPrefixCondition"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_create_unknown_type_fails() {
        let registry = ConditionRegistry::builtin();
        let err = registry
            .create("NoSuchCondition", Value::Null)
            .unwrap_err();
        assert!(err.is_unknown_condition_type());
    }

    #[test]
    fn test_create_with_options() {
        let registry = ConditionRegistry::builtin();
        let condition = registry
            .create(
                "StringPrefixCondition",
                serde_json::json!({"prefix": "PRE-", "case_sensitive": true}),
            )
            .unwrap();
        assert_eq!(condition.name(), "StringPrefixCondition");
        let request = AccessRequest::default();
        assert!(condition.fulfills(&serde_json::json!("PRE-5"), &request));
        assert!(!condition.fulfills(&serde_json::json!("pre-5"), &request));
    }

    #[test]
    fn test_empty_options_yield_default_instance() {
        let registry = ConditionRegistry::builtin();
        for options in [Value::Null, serde_json::json!({})] {
            let condition = registry.create("StringPrefixCondition", options).unwrap();
            let request = AccessRequest::default();
            // Default prefix is empty, so any string fulfills.
            assert!(condition.fulfills(&serde_json::json!("anything"), &request));
        }
    }

    #[test]
    fn test_register_is_last_writer_wins() {
        #[derive(Debug, Default, Serialize, Deserialize)]
        struct ShadowingPrefix;

        impl Condition for ShadowingPrefix {
            fn name(&self) -> &'static str {
                "StringPrefixCondition"
            }

            fn fulfills(&self, _value: &Value, _request: &AccessRequest) -> bool {
                false
            }

            fn encode_options(&self) -> Result<Value, serde_json::Error> {
                Ok(Value::Null)
            }
        }

        let mut registry = ConditionRegistry::builtin();
        registry.register::<ShadowingPrefix>();
        assert_eq!(registry.len(), 2);

        let condition = registry
            .create("StringPrefixCondition", Value::Null)
            .unwrap();
        let request = AccessRequest::default();
        assert!(!condition.fulfills(&serde_json::json!("anything"), &request));
    }

    #[test]
    fn test_container_round_trip() {
        let mut registry = ConditionRegistry::builtin();
        registry.register::<MarkerCondition>();

        let mut conditions = Conditions::new();
        conditions.insert(
            "clearance",
            Box::new(StringListCondition {
                options: vec!["alpha".to_string(), "beta".to_string()],
            }),
        );
        conditions.insert(
            "badge",
            Box::new(StringPrefixCondition {
                prefix: "EMP-".to_string(),
                case_sensitive: false,
            }),
        );
        conditions.insert("flagged", Box::new(MarkerCondition));

        let records = conditions.encode().unwrap();
        assert_eq!(records["clearance"].kind, "StringListCondition");
        assert_eq!(records["badge"].kind, "StringPrefixCondition");

        let restored = Conditions::decode(records.clone(), &registry).unwrap();
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.encode().unwrap(), records);
    }

    #[test]
    fn test_decode_unknown_tag_fails() {
        let registry = ConditionRegistry::builtin();
        let mut records = BTreeMap::new();
        records.insert(
            "mystery".to_string(),
            TaggedCondition {
                kind: "VanishedCondition".to_string(),
                options: Value::Null,
            },
        );
        let err = Conditions::decode(records, &registry).unwrap_err();
        assert!(err.is_unknown_condition_type());
    }
}
