//! Route - Per-Segment Hook Contracts
//!
//! A `Route` is the embedder-supplied business object behind one segment of
//! the route tree. The engine calls its hooks by contract during resolution
//! and entry/exit; every hook is optional and defaults to a no-op.
//!
//! Route identity matters: the engine decides "same route at this position"
//! with `Arc::ptr_eq`, so a delegate must hand back the same `Arc` for a
//! given name for the lifetime of the router.

use crate::transition::Transition;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use waypoint_core::{
    EventOutcome, Model, Params, QueryFinalizer, RouteInfoSnapshot, TransitionError,
};

pub type SharedRoute = Arc<dyn Route>;

/// What a model-producing hook handed back.
#[derive(Debug, Clone)]
pub enum HookValue {
    /// A resolved model.
    Model(Model),
    /// No model contribution.
    None,
    /// The hook redirected and returned its pending transition. The engine
    /// discards this rather than mistaking it for a model.
    PendingTransition,
}

impl HookValue {
    /// The model, if any. Pending transitions are never models.
    pub fn into_model(self) -> Option<Model> {
        match self {
            HookValue::Model(m) => Some(m),
            HookValue::None | HookValue::PendingTransition => None,
        }
    }
}

pub type HookResult = anyhow::Result<HookValue>;

/// The per-segment business hooks. All methods have defaults; implement only
/// what the segment needs.
#[async_trait]
pub trait Route: Send + Sync {
    /// Runs before the model hook. May redirect by starting a new transition
    /// on the router; any returned value is discarded.
    async fn before_model(&self, _transition: &Transition) -> HookResult {
        Ok(HookValue::None)
    }

    /// Produce this segment's model from its URL params.
    async fn model(&self, _params: &Params, _transition: &Transition) -> HookResult {
        Ok(HookValue::None)
    }

    /// URL-entry variant of `model`. Defaults to delegating to `model`;
    /// override to distinguish URL deserialization from named entry.
    async fn deserialize(&self, params: &Params, transition: &Transition) -> HookResult {
        self.model(params, transition).await
    }

    /// Runs after the model resolves. The model is already visible in
    /// `transition.resolved_model(name)` and may be swapped there.
    async fn after_model(&self, _model: Option<&Model>, _transition: &Transition) -> HookResult {
        Ok(HookValue::None)
    }

    /// Custom model-to-params serialization. `None` selects the default rule.
    fn serialize(&self, _model: &Model, _param_names: &[String]) -> Option<Params> {
        None
    }

    /// Fired once per newly resolved segment, after its model settles.
    /// Expected to call back into the router to start a new transition.
    async fn redirect(&self, _model: Option<&Model>, _transition: &Transition) {}

    async fn enter(&self, _transition: &Transition) -> anyhow::Result<()> {
        Ok(())
    }

    /// Hand the segment its context. Also re-invoked (without `enter`) when
    /// the same route survives a transition with a different context.
    async fn setup(&self, _context: Option<&Model>, _transition: &Transition) -> anyhow::Result<()> {
        Ok(())
    }

    async fn exit(&self) {}

    fn context_did_change(&self) {}

    /// Routes flagged inaccessible reject URL-based entry with
    /// `UnrecognizedUrl` while remaining reachable by name.
    fn inaccessible_by_url(&self) -> bool {
        false
    }

    /// Bubbling event handler. Return `Stop` to consume the event,
    /// `Continue` to handle it and keep bubbling, `NotHandled` to pass.
    fn on_event(
        &self,
        _name: &str,
        _args: &[Value],
        _transition: Option<&Transition>,
    ) -> EventOutcome {
        EventOutcome::NotHandled
    }

    /// Offered transition errors bubbling up from the failing segment.
    fn on_error(&self, _error: &TransitionError) -> EventOutcome {
        EventOutcome::NotHandled
    }

    /// Claim the query-param keys this route owns. Unclaimed keys are
    /// dropped from the finalized state and the URL.
    fn finalize_query_param_change(&self, _finalizer: &mut QueryFinalizer) {}
}

/// The embedder-supplied environment the router runs in: route loading and
/// the outward-facing lifecycle notifications.
#[async_trait]
pub trait RouterDelegate: Send + Sync {
    /// Load the route object for a segment name. May suspend (routes can be
    /// code-split); the resolution pipeline awaits this as its first step.
    async fn load_route(&self, name: &str) -> anyhow::Result<SharedRoute>;

    /// Synchronous lookup for an already-loaded route. Used where the engine
    /// cannot suspend (URL-intent accessibility checks); a `None` here is
    /// not an error, the check simply passes until the route loads.
    fn try_route(&self, _name: &str) -> Option<SharedRoute> {
        None
    }

    fn update_url(&self, url: &str);

    fn replace_url(&self, url: &str) {
        self.update_url(url);
    }

    /// First notification of a fresh navigation burst, fired against the
    /// outgoing chain before any hook runs. Handlers may abort the
    /// transition here.
    fn will_transition(
        &self,
        _from: &[RouteInfoSnapshot],
        _to: &[RouteInfoSnapshot],
        _transition: &Transition,
    ) {
    }

    fn did_transition(&self, _route_infos: &[RouteInfoSnapshot]) {}

    /// Fired just before a segment's model pipeline begins.
    fn will_resolve_model(&self, _name: &str, _transition: &Transition) {}

    fn route_will_change(&self, _transition: &Transition) {}

    fn route_did_change(&self, _transition: &Transition) {}

    /// A hook error went unhandled by every active route's `on_error`.
    fn transition_did_error(&self, _error: &TransitionError, _transition: &Transition) {}
}

#[async_trait]
impl<T: RouterDelegate + ?Sized> RouterDelegate for Arc<T> {
    async fn load_route(&self, name: &str) -> anyhow::Result<SharedRoute> {
        (**self).load_route(name).await
    }

    fn try_route(&self, name: &str) -> Option<SharedRoute> {
        (**self).try_route(name)
    }

    fn update_url(&self, url: &str) {
        (**self).update_url(url)
    }

    fn replace_url(&self, url: &str) {
        (**self).replace_url(url)
    }

    fn will_transition(
        &self,
        from: &[RouteInfoSnapshot],
        to: &[RouteInfoSnapshot],
        transition: &Transition,
    ) {
        (**self).will_transition(from, to, transition)
    }

    fn did_transition(&self, route_infos: &[RouteInfoSnapshot]) {
        (**self).did_transition(route_infos)
    }

    fn will_resolve_model(&self, name: &str, transition: &Transition) {
        (**self).will_resolve_model(name, transition)
    }

    fn route_will_change(&self, transition: &Transition) {
        (**self).route_will_change(transition)
    }

    fn route_did_change(&self, transition: &Transition) {
        (**self).route_did_change(transition)
    }

    fn transition_did_error(&self, error: &TransitionError, transition: &Transition) {
        (**self).transition_did_error(error, transition)
    }
}
