//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::cache::CallArgs;

/// Maximum accepted length of a function name or cache name.
pub const MAX_NAME_LENGTH: usize = 256;

/// Request body naming one call of a cached function
/// (POST /calls/invalidate, POST /calls/key)
///
/// # Fields
/// - `name`: Effective prefix of the function (qualified name, custom
///   cache name or `entity:{type}`)
/// - `args`: Positional arguments
/// - `kwargs`: Named arguments
#[derive(Debug, Clone, Deserialize)]
pub struct CallRequest {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: BTreeMap<String, Value>,
}

impl CallRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_name(&self.name)
    }

    pub fn call_args(&self) -> CallArgs {
        CallArgs {
            positional: self.args.clone(),
            named: self.kwargs.clone(),
        }
    }
}

/// Checks a function or entity name taken from a request.
pub fn validate_name(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("Name cannot be empty".to_string());
    }
    if name.len() > MAX_NAME_LENGTH {
        return Some(format!(
            "Name exceeds maximum length of {} characters",
            MAX_NAME_LENGTH
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_request_deserialize() {
        let json = r#"{"name": "app.get_user", "args": [1], "kwargs": {"verbose": true}}"#;
        let req: CallRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.name, "app.get_user");

        let args = req.call_args();
        assert_eq!(args.positional, vec![json!(1)]);
        assert_eq!(args.named.get("verbose"), Some(&json!(true)));
    }

    #[test]
    fn test_call_request_defaults() {
        let req: CallRequest = serde_json::from_str(r#"{"name": "app.list"}"#).unwrap();
        assert!(req.call_args().is_empty());
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_validate_empty_name() {
        let req = CallRequest {
            name: "".to_string(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_long_name() {
        assert!(validate_name(&"x".repeat(MAX_NAME_LENGTH + 1)).is_some());
        assert!(validate_name("entity:user").is_none());
    }
}
