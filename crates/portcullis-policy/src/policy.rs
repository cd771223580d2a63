//! The policy entity and its persisted document form.
//!
//! A [`Policy`] carries live, boxed condition instances and is what callers
//! and the evaluation engine work with. A [`PolicyDocument`] is the
//! serde-friendly shape that actually round-trips through the document
//! store, with conditions held as tagged records. Conversion between the two
//! is the explicit two-phase codec: stable entity fields map directly, the
//! condition container goes through the registry-resolved tagged scheme.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::condition::{ConditionRegistry, Conditions, TaggedCondition};
use crate::error::PolicyResult;

// =============================================================================
// Effect
// =============================================================================

/// Whether a policy grants or denies access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// The policy grants access.
    Allow,
    /// The policy denies access.
    Deny,
}

impl Effect {
    /// Wire value of the effect.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl Default for Effect {
    /// Denying is the safe default for an unspecified effect.
    fn default() -> Self {
        Self::Deny
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Policy
// =============================================================================

/// A stored access-control rule.
///
/// Subject and resource entries are pattern strings: either literals or
/// delimited-regex patterns bounded by [`Policy::start_delimiter`] /
/// [`Policy::end_delimiter`]. The store never compiles those patterns; they
/// are interpreted by the evaluation engine during the full match.
#[derive(Debug, Default)]
pub struct Policy {
    /// Unique identifier within the tenant collection. Generated on create
    /// when empty, immutable thereafter.
    pub id: String,

    /// Free-text description.
    pub description: String,

    /// Subject patterns this policy applies to.
    pub subjects: Vec<String>,

    /// Whether matching requests are allowed or denied.
    pub effect: Effect,

    /// Resource patterns this policy applies to.
    pub resources: Vec<String>,

    /// Exact-match action names.
    pub actions: Vec<String>,

    /// Labeled attribute conditions, evaluated downstream.
    pub conditions: Conditions,

    /// Opaque caller-defined payload; never inspected by the store.
    pub meta: Vec<u8>,
}

impl Policy {
    /// Returns `true` if the policy effect is allow.
    #[must_use]
    pub fn allow_access(&self) -> bool {
        self.effect == Effect::Allow
    }

    /// Delimiter identifying the beginning of a regex inside a pattern.
    #[must_use]
    pub fn start_delimiter(&self) -> char {
        '<'
    }

    /// Delimiter identifying the end of a regex inside a pattern.
    #[must_use]
    pub fn end_delimiter(&self) -> char {
        '>'
    }

    /// Parse the opaque `meta` payload as JSON into the requested type.
    ///
    /// # Errors
    ///
    /// Returns an error if `meta` is not valid JSON for `T`.
    pub fn meta_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.meta)
    }

    /// Encode into the persisted document shape.
    ///
    /// # Errors
    ///
    /// Returns an error if a condition's configuration cannot be encoded.
    pub fn to_document(&self) -> Result<PolicyDocument, serde_json::Error> {
        Ok(PolicyDocument {
            id: self.id.clone(),
            description: self.description.clone(),
            subjects: self.subjects.clone(),
            effect: self.effect,
            resources: self.resources.clone(),
            actions: self.actions.clone(),
            conditions: self.conditions.encode()?,
            meta: self.meta.clone(),
        })
    }

    /// Decode from the persisted document shape, reconstructing conditions
    /// through the registry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PolicyStoreError::UnknownConditionType`] when a
    /// condition tag is not registered, or a decode error when the options
    /// do not fit the registered variant.
    pub fn from_document(
        document: PolicyDocument,
        registry: &ConditionRegistry,
    ) -> PolicyResult<Self> {
        let conditions = Conditions::decode(document.conditions, registry)?;
        Ok(Self {
            id: document.id,
            description: document.description,
            subjects: document.subjects,
            effect: document.effect,
            resources: document.resources,
            actions: document.actions,
            conditions,
            meta: document.meta,
        })
    }
}

// =============================================================================
// Policy Document
// =============================================================================

/// Persisted form of a [`Policy`].
///
/// This is the exact shape written to the document store:
/// `{_id, description, subjects, effect, resources, actions, conditions,
/// meta}` with conditions as tagged records and `meta` as base64 text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Document identifier.
    #[serde(rename = "_id")]
    pub id: String,

    /// Free-text description.
    #[serde(default)]
    pub description: String,

    /// Subject patterns.
    #[serde(default)]
    pub subjects: Vec<String>,

    /// Allow or deny.
    #[serde(default)]
    pub effect: Effect,

    /// Resource patterns.
    #[serde(default)]
    pub resources: Vec<String>,

    /// Exact-match action names.
    #[serde(default)]
    pub actions: Vec<String>,

    /// Tagged condition records keyed by label.
    #[serde(default)]
    pub conditions: BTreeMap<String, TaggedCondition>,

    /// Opaque payload, base64-encoded in the document.
    #[serde(default, with = "meta_bytes")]
    pub meta: Vec<u8>,
}

/// Base64 codec for the opaque meta payload. JSON has no byte-string type;
/// base64 keeps the document compact and inert to the query layer.
mod meta_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{StringListCondition, StringPrefixCondition};

    fn make_policy() -> Policy {
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
                case_sensitive: true,
            }),
        );

        Policy {
            id: "policy-1".to_string(),
            description: "employees may enter rooms".to_string(),
            subjects: vec!["groups:employees".to_string(), "users:<.*>".to_string()],
            effect: Effect::Allow,
            resources: vec!["rooms:<[0-9]+>".to_string()],
            actions: vec!["enter".to_string(), "leave".to_string()],
            conditions,
            meta: br#"{"owner":"facilities"}"#.to_vec(),
        }
    }

    #[test]
    fn test_effect_wire_values() {
        assert_eq!(
            serde_json::to_string(&Effect::Allow).unwrap(),
            r#""allow""#
        );
        assert_eq!(serde_json::to_string(&Effect::Deny).unwrap(), r#""deny""#);
        assert_eq!(
            serde_json::from_str::<Effect>(r#""allow""#).unwrap(),
            Effect::Allow
        );
    }

    #[test]
    fn test_document_round_trip_preserves_everything() {
        let registry = ConditionRegistry::builtin();
        let policy = make_policy();

        let document = policy.to_document().unwrap();
        let json = serde_json::to_string(&document).unwrap();
        let reread: PolicyDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(reread, document);

        let restored = Policy::from_document(reread, &registry).unwrap();
        assert_eq!(restored.id, policy.id);
        assert_eq!(restored.description, policy.description);
        assert_eq!(restored.subjects, policy.subjects);
        assert_eq!(restored.effect, policy.effect);
        assert_eq!(restored.resources, policy.resources);
        assert_eq!(restored.actions, policy.actions);
        assert_eq!(restored.meta, policy.meta);
        // Condition variant types and configuration survive the trip.
        assert_eq!(
            restored.conditions.encode().unwrap(),
            policy.conditions.encode().unwrap()
        );
    }

    #[test]
    fn test_document_uses_underscore_id_and_base64_meta() {
        let document = make_policy().to_document().unwrap();
        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(value["_id"], "policy-1");
        assert!(value["meta"].is_string());
        assert_eq!(value["conditions"]["badge"]["type"], "StringPrefixCondition");
    }

    #[test]
    fn test_from_document_with_unknown_condition_fails() {
        let registry = ConditionRegistry::builtin();
        let mut document = make_policy().to_document().unwrap();
        document.conditions.insert(
            "mystery".to_string(),
            TaggedCondition {
                kind: "VanishedCondition".to_string(),
                options: serde_json::Value::Null,
            },
        );
        let err = Policy::from_document(document, &registry).unwrap_err();
        assert!(err.is_unknown_condition_type());
    }

    #[test]
    fn test_meta_as_parses_payload() {
        #[derive(Debug, Deserialize)]
        struct Meta {
            owner: String,
        }

        let policy = make_policy();
        let meta: Meta = policy.meta_as().unwrap();
        assert_eq!(meta.owner, "facilities");
    }

    #[test]
    fn test_delimiters() {
        let policy = make_policy();
        assert_eq!(policy.start_delimiter(), '<');
        assert_eq!(policy.end_delimiter(), '>');
    }
}
