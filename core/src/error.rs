//! Error taxonomy for the transition engine.
//!
//! Aborts are control flow, not failures: a superseded or explicitly aborted
//! transition rejects with `Aborted` and is never dispatched as an error
//! event. Business-hook failures carry the opaque `anyhow::Error` the hook
//! produced plus the name of the route that was active when it surfaced.

use std::sync::Arc;
use thiserror::Error;

/// The terminal error of a navigation attempt.
///
/// Cloneable so a memoized transition outcome can be handed to every caller
/// awaiting it; the hook payload is shared behind an `Arc` for that reason.
#[derive(Debug, Clone, Error)]
pub enum TransitionError {
    /// The URL matched no route, or matched one flagged inaccessible by URL.
    #[error("UnrecognizedURLError: {0}")]
    UnrecognizedUrl(String),

    /// The transition was superseded, explicitly aborted, or observed its
    /// aborted flag mid-pipeline.
    #[error("TransitionAborted")]
    Aborted,

    /// A business hook threw. `route` identifies the segment whose handler
    /// was active, so the error event can be dispatched at the right node.
    #[error("route '{route}' failed: {source}")]
    Hook {
        route: String,
        source: Arc<anyhow::Error>,
    },

    /// A named transition supplied more context objects than the target
    /// chain has dynamic segments.
    #[error("more context objects were passed than there are dynamic segments for '{0}'")]
    TooManyContexts(String),

    /// A named transition could not satisfy a segment's dynamic params.
    #[error("not enough string/numeric parameters for the dynamic segments of '{route}': missing {missing:?}")]
    MissingParams {
        route: String,
        missing: Vec<String>,
    },

    /// No route with this name exists in the recognizer.
    #[error("there is no route named '{0}'")]
    UnknownRoute(String),

    /// The owning router was dropped while the transition was in flight.
    #[error("router was dropped mid-transition")]
    RouterGone,
}

impl TransitionError {
    pub fn hook(route: impl Into<String>, source: anyhow::Error) -> Self {
        TransitionError::Hook {
            route: route.into(),
            source: Arc::new(source),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, TransitionError::Aborted)
    }
}

/// Errors from the router's synchronous public surface.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("nothing handled the event '{0}'")]
    UnhandledEvent(String),

    #[error("there is no route named '{0}'")]
    UnknownRoute(String),

    #[error("missing parameter '{0}' while generating a URL")]
    MissingParameter(String),

    #[error("cannot generate a URL for '{0}': {1}")]
    CannotGenerate(String, String),
}
