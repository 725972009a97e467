//! Tool-parameter map helpers.
//!
//! Tool invocations carry an opaque string-keyed parameter map. The core
//! never assumes a schema; risk heuristics and whitelist matching only
//! inspect the stringified values of the keys they care about (`command`,
//! `path`, `url`, `script`, `recursive`).

use serde_json::Value;
use std::collections::BTreeMap;

/// Opaque string-keyed parameter map for a tool invocation.
///
/// `BTreeMap` keeps iteration deterministic, which keeps risk factors and
/// whitelist matching order-stable.
pub type ToolParams = BTreeMap<String, Value>;

/// Stringify a parameter value the way matching and heuristics see it.
///
/// String values are taken verbatim (no surrounding quotes); everything
/// else renders as compact JSON.
#[must_use]
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Look up a parameter and stringify it, if present.
#[must_use]
pub fn param_str(params: &ToolParams, key: &str) -> Option<String> {
    params.get(key).map(stringify_value)
}
