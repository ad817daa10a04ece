//! Typed access to opaque plugin parameters

use serde_json::{Map, Value};

/// Read-only view over a plugin's parameter map
///
/// String values of the form `${VAR}` are resolved from the environment.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    /// Raw value, treating JSON null as absent
    pub fn value(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    pub fn string(&self, key: &str) -> Option<String> {
        match self.value(key)? {
            Value::String(s) => Some(expand_env(s)),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.string(key).unwrap_or_else(|| default.to_string())
    }

    /// Required string parameter
    pub fn require(&self, key: &str) -> anyhow::Result<String> {
        self.string(key)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required parameter '{}'", key))
    }

    /// Unsigned integer, accepting numeric strings
    pub fn u64(&self, key: &str) -> Option<u64> {
        match self.value(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => expand_env(s).trim().parse().ok(),
            _ => None,
        }
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        match self.value(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => expand_env(s).trim().parse().ok(),
            _ => None,
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.value(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.as_str(), "true" | "1" | "yes"),
            _ => default,
        }
    }

    pub fn array(&self, key: &str) -> Option<&'a Vec<Value>> {
        self.value(key)?.as_array()
    }

    pub fn object(&self, key: &str) -> Option<Params<'a>> {
        self.value(key)?.as_object().map(Params::new)
    }

    /// Non-empty list of strings
    pub fn strings(&self, key: &str) -> Vec<String> {
        self.array(key)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(expand_env)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Resolve a whole-value `${VAR}` reference from the environment
///
/// Unset variables resolve to an empty string; anything else is returned as is.
pub fn expand_env(raw: &str) -> String {
    match raw.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        Some(var) => std::env::var(var).unwrap_or_default(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_numbers_accept_strings() {
        let m = map(json!({ "a": 5, "b": "7", "c": "x", "d": null }));
        let p = Params::new(&m);
        assert_eq!(p.u64("a"), Some(5));
        assert_eq!(p.u64("b"), Some(7));
        assert_eq!(p.u64("c"), None);
        assert_eq!(p.u64("d"), None);
        assert_eq!(p.u64("missing"), None);
    }

    #[test]
    fn test_require_rejects_empty() {
        let m = map(json!({ "name": "", "other": "ok" }));
        let p = Params::new(&m);
        assert!(p.require("name").is_err());
        assert_eq!(p.require("other").unwrap(), "ok");
    }

    #[test]
    fn test_expand_env() {
        // SAFETY: test-local variable name not read elsewhere
        unsafe { std::env::set_var("TRIAGE_TEST_SECRET", "s3cr3t") };
        assert_eq!(expand_env("${TRIAGE_TEST_SECRET}"), "s3cr3t");
        assert_eq!(expand_env("plain"), "plain");
        assert_eq!(expand_env("${TRIAGE_TEST_UNSET_VAR}"), "");
    }

    #[test]
    fn test_bool_and_strings() {
        let m = map(json!({ "on": true, "flag": "yes", "list": ["a", 1, "b"] }));
        let p = Params::new(&m);
        assert!(p.bool_or("on", false));
        assert!(p.bool_or("flag", false));
        assert!(p.bool_or("missing", true));
        assert_eq!(p.strings("list"), vec!["a", "b"]);
    }
}
