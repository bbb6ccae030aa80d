pub mod error;
pub mod event;
pub mod params;
pub mod query;
pub mod recognizer;
pub mod snapshot;

pub mod prelude {
    pub use crate::error::{RouterError, TransitionError};
    pub use crate::params::{model, Model, Params};
    pub use crate::query::{QueryDelta, QueryFinalizer, QueryParams};
    pub use crate::recognizer::{Recognition, RecognizedRoute, Recognizer, SegmentSpec};
    pub use crate::snapshot::{LoadedRoute, RouteInfoSnapshot};
}

pub use error::{RouterError, TransitionError};
pub use event::{EventOutcome, QUERY_PARAMS_DID_CHANGE};
pub use params::{default_serialize, is_param, model, param_to_string, params_match, Model, Params};
pub use query::{coerced_eq, diff_query_params, encode_query, QueryDelta, QueryFinalizer, QueryParams};
pub use recognizer::{Recognition, RecognizedRoute, Recognizer, SegmentSpec};
pub use snapshot::{LoadedRoute, RouteInfoSnapshot};
