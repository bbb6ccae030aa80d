//! Event - Bubbling Dispatch Contract
//!
//! Routes opt into events through explicit handler methods instead of
//! duck-typed action maps. Dispatch walks the active chain leaf to root;
//! each handler's outcome decides whether the event keeps bubbling.

/// Result of offering an event to one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// This route has no handler for the event; keep bubbling.
    NotHandled,
    /// Handled; stop propagation.
    Stop,
    /// Handled, but let ancestors see the event too.
    Continue,
}

/// Event fired at active routes when only query params changed.
pub const QUERY_PARAMS_DID_CHANGE: &str = "queryParamsDidChange";
