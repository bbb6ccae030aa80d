//! Query - Query-Parameter Reconciliation
//!
//! Query params live on the whole route chain rather than on one segment.
//! Changing them alone never re-resolves models; the router instead computes
//! a changelist and runs a finalize pass where active routes claim the keys
//! they own. Unclaimed keys are dropped from the URL entirely.

use serde_json::Value;
use std::collections::BTreeMap;

/// Query parameters for a route chain. Values are strings, string arrays, or
/// numbers (coerced to strings for comparison and URL encoding).
pub type QueryParams = BTreeMap<String, Value>;

/// Compare two query values, coercing numbers to strings and walking arrays
/// element-wise. `"1"` and `1` are the same value for diffing purposes.
pub fn coerced_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| coerced_eq(x, y))
        }
        (Value::Array(_), _) | (_, Value::Array(_)) => false,
        _ => scalar_string(a) == scalar_string(b),
    }
}

fn scalar_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The changelist between two query-param maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDelta {
    pub added: QueryParams,
    pub changed: QueryParams,
    pub removed: QueryParams,
}

impl QueryDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// All touched keys with their new values (removed keys map to Null),
    /// the payload handed to `queryParamsDidChange` observers.
    pub fn all(&self) -> QueryParams {
        let mut all = self.added.clone();
        all.extend(self.changed.clone());
        for key in self.removed.keys() {
            all.insert(key.clone(), Value::Null);
        }
        all
    }
}

/// Diff `old` against `new`, array-aware and with number-to-string coercion
/// applied for comparison only (stored values keep their original type).
pub fn diff_query_params(old: &QueryParams, new: &QueryParams) -> QueryDelta {
    let mut delta = QueryDelta::default();

    for (key, value) in new {
        match old.get(key) {
            None => {
                delta.added.insert(key.clone(), value.clone());
            }
            Some(prev) if !coerced_eq(prev, value) => {
                delta.changed.insert(key.clone(), value.clone());
            }
            Some(_) => {}
        }
    }
    for (key, value) in old {
        if !new.contains_key(key) {
            delta.removed.insert(key.clone(), value.clone());
        }
    }

    delta
}

/// Accumulates the claims routes make during the finalize pass.
///
/// Each active route is offered the pending params and may claim the keys it
/// owns, supplying the value that should appear in the URL (or claiming a key
/// as hidden to keep it in state but out of the URL).
#[derive(Debug)]
pub struct QueryFinalizer {
    pending: QueryParams,
    claimed: QueryParams,
    visible: QueryParams,
}

impl QueryFinalizer {
    pub fn new(pending: QueryParams) -> Self {
        Self {
            pending,
            claimed: QueryParams::new(),
            visible: QueryParams::new(),
        }
    }

    /// The params awaiting a claim.
    pub fn pending(&self) -> &QueryParams {
        &self.pending
    }

    /// Claim a key, supplying the value to carry in state and the URL.
    pub fn claim(&mut self, key: &str, value: Value) {
        self.pending.remove(key);
        self.claimed.insert(key.to_string(), value.clone());
        self.visible.insert(key.to_string(), value);
    }

    /// Claim a key for state only; it will not appear in the URL.
    pub fn claim_hidden(&mut self, key: &str, value: Value) {
        self.pending.remove(key);
        self.claimed.insert(key.to_string(), value);
    }

    /// Finish the pass: `(state params, URL-visible params)`. Anything left
    /// unclaimed is dropped.
    pub fn finish(self) -> (QueryParams, QueryParams) {
        (self.claimed, self.visible)
    }
}

/// Encode query params as a URL query string (no leading `?`). Array values
/// expand to repeated `key[]=` pairs.
pub fn encode_query(params: &QueryParams) -> String {
    let mut parts = Vec::new();
    for (key, value) in params {
        match value {
            Value::Array(items) => {
                let array_key = encode(&format!("{key}[]"));
                for item in items {
                    parts.push(format!("{array_key}={}", encode(&scalar_string(item))));
                }
            }
            Value::Null => parts.push(encode(key)),
            other => parts.push(format!("{}={}", encode(key), encode(&scalar_string(other)))),
        }
    }
    parts.join("&")
}

fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
