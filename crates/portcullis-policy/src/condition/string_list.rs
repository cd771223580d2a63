//! Exact-set membership condition.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::Condition;
use crate::request::AccessRequest;

/// Requires every configured option to be present in the supplied value.
///
/// The input is normalized into a sequence: a bare string becomes a
/// one-element sequence, an all-string array is used as-is, and anything
/// else fails fulfillment. The check then runs in the *option → present in
/// input* direction: the condition holds iff each configured option appears
/// somewhere in the normalized input. The direction is asymmetric on
/// purpose; downstream behavior depends on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringListCondition {
    /// Accepted option strings, all of which must appear in the input.
    #[serde(default)]
    pub options: Vec<String>,
}

impl Condition for StringListCondition {
    fn name(&self) -> &'static str {
        "StringListCondition"
    }

    fn fulfills(&self, value: &Value, _request: &AccessRequest) -> bool {
        let given: Vec<&str> = match value {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => out.push(s.as_str()),
                        _ => return false,
                    }
                }
                out
            }
            _ => return false,
        };

        if given.is_empty() {
            return false;
        }

        self.options.iter().all(|opt| given.contains(&opt.as_str()))
    }

    fn encode_options(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_condition() -> StringListCondition {
        StringListCondition {
            options: vec!["a".to_string(), "b".to_string()],
        }
    }

    #[test]
    fn test_every_option_present_fulfills() {
        let condition = make_condition();
        let request = AccessRequest::default();
        assert!(condition.fulfills(&json!(["a", "b", "c"]), &request));
        assert!(condition.fulfills(&json!(["b", "a"]), &request));
    }

    #[test]
    fn test_missing_option_fails() {
        let condition = make_condition();
        let request = AccessRequest::default();
        assert!(!condition.fulfills(&json!(["a"]), &request));
        assert!(!condition.fulfills(&json!(["a", "c"]), &request));
    }

    #[test]
    fn test_empty_input_fails() {
        let condition = make_condition();
        let request = AccessRequest::default();
        assert!(!condition.fulfills(&json!([]), &request));
        assert!(!condition.fulfills(&json!(""), &request));
    }

    #[test]
    fn test_bare_string_is_one_element_sequence() {
        let condition = StringListCondition {
            options: vec!["solo".to_string()],
        };
        let request = AccessRequest::default();
        assert!(condition.fulfills(&json!("solo"), &request));
        assert!(!condition.fulfills(&json!("duo"), &request));
    }

    #[test]
    fn test_non_string_input_fails() {
        let condition = make_condition();
        let request = AccessRequest::default();
        assert!(!condition.fulfills(&json!(42), &request));
        assert!(!condition.fulfills(&json!({"a": 1}), &request));
        assert!(!condition.fulfills(&json!(["a", 1]), &request));
        assert!(!condition.fulfills(&Value::Null, &request));
    }

    #[test]
    fn test_no_options_with_nonempty_input_fulfills() {
        let condition = StringListCondition { options: vec![] };
        let request = AccessRequest::default();
        assert!(condition.fulfills(&json!("anything"), &request));
    }
}
