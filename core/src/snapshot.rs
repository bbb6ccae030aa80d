//! Serializable views of route state, for embedder inspection and logging.

use crate::params::Params;
use crate::query::QueryParams;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A read-only view of one segment's position in a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteInfoSnapshot {
    pub name: String,
    pub param_names: Vec<String>,
    pub params: Params,
    pub query_params: QueryParams,
}

/// The result of recognizing a URL and resolving its models without
/// touching router state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedRoute {
    pub name: String,
    pub params: Params,
    pub query_params: QueryParams,
    /// The leaf segment's resolved model, if its hooks produced one.
    pub attributes: Option<Value>,
}
