//! Waypoint facade crate.
//!
//! Re-exports the core vocabulary and the runtime engine behind a single
//! entry point. Embedders supply a `Recognizer` and a `RouterDelegate`,
//! implement `Route` per segment, and drive navigations through `Router`.

pub use waypoint_core as core;
pub use waypoint_runtime as runtime;

pub use waypoint_core::{
    model, EventOutcome, LoadedRoute, Model, Params, QueryDelta, QueryFinalizer, QueryParams,
    Recognition, RecognizedRoute, Recognizer, RouteInfoSnapshot, RouterError, SegmentSpec,
    TransitionError,
};
pub use waypoint_runtime::{
    HookResult, HookValue, Route, Router, RouterDelegate, SharedRoute, Transition,
    TransitionIntent, TransitionState, UrlMethod, WeakRouter,
};

pub mod prelude {
    pub use waypoint_core::prelude::*;
    pub use waypoint_runtime::prelude::*;
}
