//! Case-configurable prefix condition.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::Condition;
use crate::request::AccessRequest;

/// Matches string values that begin with a pre-defined prefix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringPrefixCondition {
    /// The prefix the value must start with.
    #[serde(default)]
    pub prefix: String,

    /// Whether the prefix test is case sensitive. When `false`, both sides
    /// are uppercased before comparing.
    #[serde(default)]
    pub case_sensitive: bool,
}

impl Condition for StringPrefixCondition {
    fn name(&self) -> &'static str {
        "StringPrefixCondition"
    }

    fn fulfills(&self, value: &Value, _request: &AccessRequest) -> bool {
        let Some(s) = value.as_str() else {
            return false;
        };
        if self.case_sensitive {
            s.starts_with(&self.prefix)
        } else {
            s.to_uppercase().starts_with(&self.prefix.to_uppercase())
        }
    }

    fn encode_options(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_case_sensitive_prefix() {
        let condition = StringPrefixCondition {
            prefix: "PRE-5".to_string(),
            case_sensitive: true,
        };
        let request = AccessRequest::default();
        assert!(condition.fulfills(&json!("PRE-5-suffix"), &request));
        assert!(!condition.fulfills(&json!("pre-5-suffix"), &request));
    }

    #[test]
    fn test_case_insensitive_prefix() {
        let condition = StringPrefixCondition {
            prefix: "PRE-5".to_string(),
            case_sensitive: false,
        };
        let request = AccessRequest::default();
        assert!(condition.fulfills(&json!("PRE-5-suffix"), &request));
        assert!(condition.fulfills(&json!("pre-5-suffix"), &request));
    }

    #[test]
    fn test_non_string_value_fails() {
        let condition = StringPrefixCondition {
            prefix: "1".to_string(),
            case_sensitive: true,
        };
        let request = AccessRequest::default();
        assert!(!condition.fulfills(&json!(12), &request));
        assert!(!condition.fulfills(&json!(["1"]), &request));
        assert!(!condition.fulfills(&Value::Null, &request));
    }
}
