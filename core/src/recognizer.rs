//! Recognizer - URL Matching Collaborator Contract
//!
//! The engine never parses URL pattern syntax itself. An embedder supplies a
//! recognizer that maps URLs to ordered segment chains and back; the engine
//! consumes it purely through this trait.

use crate::error::RouterError;
use crate::params::Params;
use crate::query::QueryParams;
use serde::{Deserialize, Serialize};

/// One matched segment of a recognized URL, root-to-leaf ordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedRoute {
    pub name: String,
    pub params: Params,
}

/// A full URL match: the segment chain plus any query params on the URL.
#[derive(Debug, Clone, Default)]
pub struct Recognition {
    pub routes: Vec<RecognizedRoute>,
    pub query_params: QueryParams,
}

/// The shape of one segment in a named route's chain: its name and the
/// dynamic-segment names it owns, in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub name: String,
    pub param_names: Vec<String>,
}

/// URL pattern matcher/generator supplied by the embedder.
pub trait Recognizer: Send + Sync {
    /// Parse a URL into its segment chain, or `None` if nothing matches.
    fn recognize(&self, url: &str) -> Option<Recognition>;

    /// Generate the URL for a named leaf route from merged params.
    fn generate(&self, name: &str, params: &Params) -> Result<String, RouterError>;

    /// The root-to-leaf segment chain a named route occupies.
    fn handlers_for(&self, name: &str) -> Option<Vec<SegmentSpec>>;

    fn has_route(&self, name: &str) -> bool {
        self.handlers_for(name).is_some()
    }
}
