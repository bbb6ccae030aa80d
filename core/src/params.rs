//! Params - Models and URL Parameter Space
//!
//! A model is the application data a segment resolves to; params are the
//! URL-space projection of that data. Diffing compares models by identity
//! (the same `Model` clone is the same context) and params key-by-key.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A resolved (or caller-supplied) model for one route segment.
///
/// Identity is pointer identity: two `Model` handles are "the same context"
/// exactly when they are clones of one another. Diffing never looks inside.
pub type Model = Arc<Value>;

/// URL parameters for one segment, keyed by dynamic-segment name.
pub type Params = BTreeMap<String, String>;

/// Wrap a JSON value as a model.
pub fn model(value: Value) -> Model {
    Arc::new(value)
}

/// Whether a value passed to a named transition is a raw parameter value
/// rather than a context object.
///
/// Strings, numbers and booleans count as params, and take precedence over
/// context consumption during intent diffing.
pub fn is_param(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Number(_) | Value::Bool(_)
    )
}

/// Stringify a param-looking value the way it would appear in a URL.
pub fn param_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Default model-to-params serialization, used when a route supplies no
/// custom `serialize` hook.
///
/// A primitive model maps onto the first param name directly. A structured
/// model with exactly one param name maps to its `id` field when the name
/// ends in `_id`, otherwise to its compact JSON form. With zero or multiple
/// param names and no custom serializer, params are omitted entirely.
pub fn default_serialize(model: &Value, param_names: &[String]) -> Params {
    let mut params = Params::new();
    let Some(first) = param_names.first() else {
        return params;
    };

    if is_param(model) {
        params.insert(first.clone(), param_to_string(model));
        return params;
    }

    if param_names.len() == 1 {
        if first.ends_with("_id") {
            if let Some(id) = model.get("id") {
                params.insert(first.clone(), param_to_string(id));
            }
        } else {
            params.insert(first.clone(), model.to_string());
        }
    }

    params
}

/// Key-by-key param comparison.
///
/// Every key of `a` must be present in `b` with the same string value. Keys
/// only present in `b` are ignored; in practice both maps are produced from
/// the same param-name list, so the asymmetry never shows.
pub fn params_match(a: &Params, b: &Params) -> bool {
    a.iter().all(|(k, v)| b.get(k) == Some(v))
}
