//! Argument binding and cache key derivation.
//!
//! Calls are normalized against the tool's declared parameter names so that
//! equivalent calls share a key. A JSON array binds positionally, which
//! means `["rust"]` and `{"query": "rust"}` produce the same key.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use threadbot_core::error::ToolError;
use threadbot_core::store::CacheKey;

/// Arguments bound to parameter names, sorted by name.
pub type BoundArguments = BTreeMap<String, Value>;

/// Decode a raw argument buffer. An empty buffer means "no arguments".
pub fn decode_arguments(raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw)
        .map_err(|e| ToolError::InvalidArguments(format!("{e} in {raw:?}")))
}

/// Bind decoded arguments to `parameter_names`.
///
/// Objects bind by name (undeclared keys are kept as-is). Arrays and bare
/// scalars bind positionally; positions past the declared names are kept
/// under `_<index>`.
pub fn bind_arguments(parameter_names: &[String], args: Value) -> BoundArguments {
    match args {
        Value::Object(map) => map.into_iter().collect(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (positional_name(parameter_names, i), v))
            .collect(),
        Value::Null => BoundArguments::new(),
        scalar => BoundArguments::from([(positional_name(parameter_names, 0), scalar)]),
    }
}

fn positional_name(parameter_names: &[String], index: usize) -> String {
    parameter_names
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("_{index}"))
}

/// Normalized signature, e.g. `search(query="rust")`.
pub fn signature(tool: &str, args: &BoundArguments) -> String {
    let params: Vec<String> = args
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    format!("{tool}({})", params.join(", "))
}

/// Build the cache key for a bound call.
pub fn cache_key(tool: &str, args: &BoundArguments) -> CacheKey {
    let signature = signature(tool, args);
    let digest = hex::encode(Sha256::digest(signature.as_bytes()));
    CacheKey {
        tool: tool.to_string(),
        signature,
        digest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_buffer_is_empty_object() {
        assert_eq!(decode_arguments("").unwrap(), json!({}));
        assert_eq!(decode_arguments("  ").unwrap(), json!({}));
        assert!(matches!(
            decode_arguments("{\"query\":"),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[test]
    fn signature_sorts_names() {
        let bound = bind_arguments(&[], json!({"b": 2, "a": "x"}));
        assert_eq!(signature("search", &bound), r#"search(a="x", b=2)"#);
    }

    #[test]
    fn positional_and_keyword_calls_collide() {
        let params = names(&["query"]);
        let positional = cache_key("search", &bind_arguments(&params, json!(["rust"])));
        let keyword = cache_key("search", &bind_arguments(&params, json!({"query": "rust"})));
        assert_eq!(positional, keyword);
        assert_eq!(positional.digest.len(), 64);
    }

    #[test]
    fn different_tools_or_values_differ() {
        let bound = bind_arguments(&[], json!({"query": "rust"}));
        let other = bind_arguments(&[], json!({"query": "go"}));
        assert_ne!(cache_key("search", &bound).digest, cache_key("pdf", &bound).digest);
        assert_ne!(cache_key("search", &bound).digest, cache_key("search", &other).digest);
    }

    #[test]
    fn extra_positionals_and_scalars() {
        let params = names(&["url"]);
        let bound = bind_arguments(&params, json!(["a", "b"]));
        assert_eq!(bound["url"], json!("a"));
        assert_eq!(bound["_1"], json!("b"));

        let bound = bind_arguments(&params, json!("https://example.com"));
        assert_eq!(bound["url"], json!("https://example.com"));
        assert!(bind_arguments(&params, Value::Null).is_empty());
    }
}
