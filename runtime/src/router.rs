//! Router - Orchestration and Committed State
//!
//! The router owns the last finalized destination, the set of currently
//! entered segments, and at most one in-flight transition. Every navigation
//! entry point funnels into the same intent-diffing path; no-ops are
//! detected before any hook runs, query-param-only changes take a shortcut
//! that never touches model hooks, and a new intent mid-flight supersedes
//! the active transition rather than racing it.

use crate::intent::{NamedIntent, TransitionIntent};
use crate::route::{RouterDelegate, SharedRoute};
use crate::route_info::{model_opt_eq, RouteInfo};
use crate::state::TransitionState;
use crate::transition::{Transition, TransitionArgs, UrlMethod};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;
use waypoint_core::{
    coerced_eq, diff_query_params, encode_query, EventOutcome, LoadedRoute, Model, Params,
    QueryDelta, QueryFinalizer, QueryParams, Recognizer, RouteInfoSnapshot, RouterError,
    TransitionError, QUERY_PARAMS_DID_CHANGE,
};

/// The public handle. Cheap to clone; all clones share one router.
#[derive(Clone)]
pub struct Router {
    core: Arc<RouterCore>,
}

/// A non-owning handle, for routes and delegates that need to start
/// transitions without keeping the router alive.
#[derive(Clone)]
pub struct WeakRouter {
    core: Weak<RouterCore>,
}

impl WeakRouter {
    pub fn upgrade(&self) -> Option<Router> {
        self.core.upgrade().map(|core| Router { core })
    }
}

pub(crate) struct RouterCore {
    recognizer: Box<dyn Recognizer>,
    delegate: Box<dyn RouterDelegate>,
    sequence: AtomicU64,
    shared: Mutex<RouterShared>,
}

#[derive(Default)]
struct RouterShared {
    /// The last finalized destination.
    state: TransitionState,
    /// The segments currently entered and set up. `None` until the first
    /// transition finalizes.
    current_route_infos: Option<Vec<RouteInfo>>,
    active_transition: Option<Transition>,
}

impl Router {
    pub fn new(
        recognizer: impl Recognizer + 'static,
        delegate: impl RouterDelegate + 'static,
    ) -> Self {
        Router {
            core: Arc::new(RouterCore {
                recognizer: Box::new(recognizer),
                delegate: Box::new(delegate),
                sequence: AtomicU64::new(1),
                shared: Mutex::new(RouterShared::default()),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakRouter {
        WeakRouter {
            core: Arc::downgrade(&self.core),
        }
    }

    /// Navigate to a URL that the location layer already shows. The URL is
    /// not rewritten when the transition finalizes.
    pub fn handle_url(&self, url: &str) -> Transition {
        let url = if url.starts_with('/') {
            url.to_string()
        } else {
            format!("/{url}")
        };
        self.core
            .transition_by_intent(TransitionIntent::url(url))
            .method(None)
    }

    /// Navigate to a named route (or, when `target` starts with `/`, a URL),
    /// pushing a new URL entry on success.
    pub fn transition_to(
        &self,
        target: &str,
        contexts: Vec<Model>,
        query_params: QueryParams,
    ) -> Transition {
        self.do_transition(target, contexts, query_params, Some(UrlMethod::Update))
    }

    /// Like [`transition_to`](Self::transition_to), but the URL entry is
    /// replaced instead of pushed.
    pub fn replace_with(
        &self,
        target: &str,
        contexts: Vec<Model>,
        query_params: QueryParams,
    ) -> Transition {
        self.do_transition(target, contexts, query_params, Some(UrlMethod::Replace))
    }

    fn do_transition(
        &self,
        target: &str,
        contexts: Vec<Model>,
        query_params: QueryParams,
        method: Option<UrlMethod>,
    ) -> Transition {
        let intent = if target.starts_with('/') {
            TransitionIntent::url(target)
        } else {
            TransitionIntent::named(target, contexts, query_params)
        };
        self.core.transition_by_intent(intent).method(method)
    }

    /// Immediately enter a named destination without resolving models or
    /// touching the URL. Contexts are taken as-is; hooks run right here.
    /// Used for loading and error screens shown mid-transition.
    pub async fn intermediate_transition_to(
        &self,
        name: &str,
        contexts: Vec<Model>,
    ) -> Result<(), TransitionError> {
        let core = &self.core;
        let old_state = core.shared.lock().state.clone();
        let intent = TransitionIntent::named(name, contexts, QueryParams::new());
        let new_state = intent.apply_to_state(
            &old_state,
            core.recognizer.as_ref(),
            core.delegate.as_ref(),
            true,
            false,
        )?;

        let transition = Transition::new(TransitionArgs {
            router: Arc::downgrade(core),
            intent: Some(intent),
            state: new_state.clone(),
            sequence: core.sequence.fetch_add(1, Ordering::SeqCst),
            query_params_only: false,
            caused_by_aborting_transition: false,
            caused_by_initial_transition: false,
            caused_by_aborting_replace_transition: false,
            caused_by_update_transition: false,
        })
        .method(None);

        core.delegate.route_will_change(&transition);
        core.setup_contexts(&transition, &new_state).await?;
        Ok(())
    }

    /// Re-resolve the current destination from `pivot` (or the root) down,
    /// replacing the URL on success.
    pub fn refresh(&self, pivot: Option<&str>) -> Transition {
        let core = &self.core;
        let state = {
            let shared = core.shared.lock();
            match &shared.active_transition {
                Some(active) => active.target_state(),
                None => shared.state.clone(),
            }
        };
        let Some(leaf) = state.leaf_name().map(str::to_string) else {
            return Transition::completed(Arc::downgrade(core), state);
        };
        let pivot = pivot
            .map(str::to_string)
            .or_else(|| state.route_infos.first().map(|info| info.name().to_string()));

        let intent = TransitionIntent::Named(NamedIntent {
            name: leaf,
            contexts: Vec::new(),
            query_params: state.query_params.clone(),
            pre_transition_state: None,
            pivot,
        });
        core.transition_by_intent(intent)
            .method(Some(UrlMethod::Replace))
    }

    /// Would navigating to `name` with these arguments change nothing?
    ///
    /// Runs the same diff a real transition would, against the finalized
    /// state, without mutating anything. With `query_params` given, every
    /// supplied key must also match the current value (number-to-string
    /// coerced); keys the caller omits are ignored.
    pub fn is_active(
        &self,
        name: &str,
        contexts: Vec<Model>,
        query_params: Option<&QueryParams>,
    ) -> bool {
        let core = &self.core;
        let state = core.shared.lock().state.clone();
        if state.route_infos.is_empty() {
            return false;
        }
        let Some(handlers) = core.recognizer.handlers_for(name) else {
            return false;
        };
        if handlers.is_empty() || handlers.len() > state.route_infos.len() {
            return false;
        }
        let truncated = TransitionState {
            route_infos: state.route_infos[..handlers.len()].to_vec(),
            query_params: state.query_params.clone(),
        };
        if truncated.leaf_name() != Some(name) {
            return false;
        }

        let intent = TransitionIntent::named(name, contexts, QueryParams::new());
        let Ok(new_state) = intent.apply_to_state(
            &truncated,
            core.recognizer.as_ref(),
            core.delegate.as_ref(),
            true,
            true,
        ) else {
            return false;
        };
        if !same_route_infos(&new_state.route_infos, &truncated.route_infos) {
            return false;
        }

        match query_params {
            None => true,
            Some(given) => given.iter().all(|(key, value)| {
                state
                    .query_params
                    .get(key)
                    .map(|current| coerced_eq(current, value))
                    .unwrap_or(false)
            }),
        }
    }

    /// Generate the URL a named transition would land on, without running
    /// any hooks. Contexts are serialized the same way finalization would
    /// serialize them.
    pub fn generate(
        &self,
        name: &str,
        contexts: Vec<Model>,
        query_params: &QueryParams,
    ) -> Result<String, RouterError> {
        let core = &self.core;
        let state = core.shared.lock().state.clone();
        let intent = TransitionIntent::named(name, contexts, QueryParams::new());
        let applied = intent
            .apply_to_state(
                &state,
                core.recognizer.as_ref(),
                core.delegate.as_ref(),
                false,
                false,
            )
            .map_err(|error| match error {
                TransitionError::UnknownRoute(name) => RouterError::UnknownRoute(name),
                TransitionError::MissingParams { missing, .. } => {
                    RouterError::MissingParameter(missing.join(", "))
                }
                other => RouterError::CannotGenerate(name.to_string(), other.to_string()),
            })?;

        let mut params = Params::new();
        for info in &applied.route_infos {
            params.extend(info.serialize_params());
        }
        let Some(leaf) = applied.leaf_name() else {
            return Err(RouterError::UnknownRoute(name.to_string()));
        };
        let mut url = core.recognizer.generate(leaf, &params)?;
        if !query_params.is_empty() {
            url.push('?');
            url.push_str(&encode_query(query_params));
        }
        Ok(url)
    }

    /// Match a URL against the route table without touching router state.
    pub fn recognize(&self, url: &str) -> Option<Vec<RouteInfoSnapshot>> {
        let recognition = self.core.recognizer.recognize(url)?;
        let query_params = recognition.query_params;
        Some(
            recognition
                .routes
                .into_iter()
                .map(|matched| RouteInfoSnapshot {
                    name: matched.name,
                    param_names: matched.params.keys().cloned().collect(),
                    params: matched.params,
                    query_params: query_params.clone(),
                })
                .collect(),
        )
    }

    /// Match a URL and resolve its models off to the side. Router state,
    /// the URL, and entered routes are all left alone.
    pub async fn recognize_and_load(&self, url: &str) -> Result<LoadedRoute, TransitionError> {
        let core = &self.core;
        let state = core.shared.lock().state.clone();
        let intent = TransitionIntent::url(url);
        let new_state = intent.apply_to_state(
            &state,
            core.recognizer.as_ref(),
            core.delegate.as_ref(),
            false,
            false,
        )?;

        let transition = Transition::new(TransitionArgs {
            router: Arc::downgrade(core),
            intent: Some(intent),
            state: new_state.clone(),
            sequence: core.sequence.fetch_add(1, Ordering::SeqCst),
            query_params_only: false,
            caused_by_aborting_transition: false,
            caused_by_initial_transition: false,
            caused_by_aborting_replace_transition: false,
            caused_by_update_transition: false,
        })
        .method(None);

        let resolved = new_state
            .resolve(&transition)
            .await
            .map_err(|failure| failure.error)?;
        let Some(leaf) = resolved.route_infos.last() else {
            return Err(TransitionError::UnrecognizedUrl(url.to_string()));
        };
        let attributes = transition
            .resolved_model(leaf.name())
            .map(|model| (*model).clone());
        Ok(LoadedRoute {
            name: leaf.name().to_string(),
            params: leaf.params().clone(),
            query_params: resolved.query_params.clone(),
            attributes,
        })
    }

    /// Exit every entered route, leaf first, and forget all state. The
    /// router is afterwards as if freshly constructed.
    pub async fn reset(&self) {
        let infos = {
            let mut shared = self.core.shared.lock();
            let infos = shared.state.route_infos.clone();
            shared.state = TransitionState::default();
            shared.current_route_infos = None;
            shared.active_transition = None;
            infos
        };
        for info in infos.iter().rev() {
            if let Some(route) = info.route() {
                route.exit().await;
            }
        }
    }

    /// Bubble a named event from the innermost entered route outwards.
    pub fn trigger(&self, name: &str, args: &[Value]) -> Result<(), RouterError> {
        let (infos, active) = {
            let shared = self.core.shared.lock();
            (
                shared.current_route_infos.clone().unwrap_or_default(),
                shared.active_transition.clone(),
            )
        };
        self.core
            .trigger_event(&infos, false, name, args, active.as_ref())
    }

    pub fn has_route(&self, name: &str) -> bool {
        self.core.recognizer.has_route(name)
    }

    /// Snapshots of the currently entered chain, root to leaf.
    pub fn current_route_infos(&self) -> Vec<RouteInfoSnapshot> {
        let shared = self.core.shared.lock();
        let query_params = &shared.state.query_params;
        shared
            .current_route_infos
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|info| info.snapshot(query_params))
            .collect()
    }

    /// The last finalized destination.
    pub fn current_state(&self) -> TransitionState {
        self.core.shared.lock().state.clone()
    }

    pub fn active_transition(&self) -> Option<Transition> {
        self.core.shared.lock().active_transition.clone()
    }
}

impl RouterCore {
    pub(crate) fn delegate(&self) -> &dyn RouterDelegate {
        self.delegate.as_ref()
    }

    pub(crate) fn notify_route_will_change(&self, transition: &Transition) {
        self.delegate.route_will_change(transition);
    }

    pub(crate) fn notify_route_did_change(&self, transition: &Transition) {
        self.delegate.route_did_change(transition);
    }

    pub(crate) fn is_active_transition(&self, id: Uuid) -> bool {
        self.shared
            .lock()
            .active_transition
            .as_ref()
            .map(|t| t.id() == id)
            .unwrap_or(false)
    }

    pub(crate) fn clear_active_if(&self, id: Uuid) {
        let mut shared = self.shared.lock();
        let held = shared
            .active_transition
            .as_ref()
            .map(|t| t.id() == id)
            .unwrap_or(false);
        if held {
            shared.active_transition = None;
        }
    }

    pub(crate) async fn load_route(&self, name: &str) -> Result<SharedRoute, TransitionError> {
        self.delegate
            .load_route(name)
            .await
            .map_err(|error| TransitionError::hook(name, error))
    }

    /// Entry point shared by every navigation method: diff, dedupe, and
    /// hand back a transition. Synchronous failures become pre-failed
    /// transitions rather than panics or plain errors, so callers always
    /// get a handle they can await and inspect.
    pub(crate) fn transition_by_intent(self: &Arc<Self>, intent: TransitionIntent) -> Transition {
        match self.get_transition_by_intent(intent.clone()) {
            Ok(transition) => transition,
            Err(error) => {
                debug!(%error, "transition failed before starting");
                Transition::failed(Arc::downgrade(self), Some(intent), error)
            }
        }
    }

    fn get_transition_by_intent(
        self: &Arc<Self>,
        mut intent: TransitionIntent,
    ) -> Result<Transition, TransitionError> {
        let (old_state, was_transitioning, pre_state, prev) = {
            let shared = self.shared.lock();
            match &shared.active_transition {
                Some(active) => (
                    active.target_state(),
                    true,
                    Some(shared.state.clone()),
                    Some(active.clone()),
                ),
                None => (shared.state.clone(), false, None, None),
            }
        };
        if let Some(pre) = pre_state {
            intent.set_pre_transition_state(pre);
        }

        let new_state = intent.apply_to_state(
            &old_state,
            self.recognizer.as_ref(),
            self.delegate.as_ref(),
            false,
            false,
        )?;

        if same_route_infos(&new_state.route_infos, &old_state.route_infos) {
            let delta = diff_query_params(&old_state.query_params, &new_state.query_params);
            if delta.is_empty() {
                // Nothing changes at all. Hand back the in-flight
                // transition, or a settled one.
                return Ok(prev
                    .unwrap_or_else(|| Transition::completed(Arc::downgrade(self), old_state)));
            }
            return Ok(self.query_params_transition(intent, new_state, delta, was_transitioning));
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let (caused_by_aborting, caused_by_initial, caused_by_replace, caused_by_update) =
            match &prev {
                Some(prev) => (
                    true,
                    self.shared.lock().current_route_infos.is_none(),
                    prev.url_method() == Some(UrlMethod::Replace),
                    prev.url_method() == Some(UrlMethod::Update),
                ),
                None => (false, false, false, false),
            };

        let transition = Transition::new(TransitionArgs {
            router: Arc::downgrade(self),
            intent: Some(intent),
            state: new_state.clone(),
            sequence,
            query_params_only: false,
            caused_by_aborting_transition: caused_by_aborting,
            caused_by_initial_transition: caused_by_initial,
            caused_by_aborting_replace_transition: caused_by_replace,
            caused_by_update_transition: caused_by_update,
        });
        info!(
            sequence,
            to = ?new_state.leaf_name(),
            superseding = prev.is_some(),
            "transition created"
        );

        if let Some(prev) = &prev {
            prev.redirect_to(&transition);
        }
        self.shared.lock().active_transition = Some(transition.clone());

        if !was_transitioning {
            let from = self.shared.lock().state.snapshots();
            let to = new_state.snapshots();
            self.delegate.will_transition(&from, &to, &transition);
            self.trigger_event(
                &old_state.route_infos,
                true,
                "willTransition",
                &[],
                Some(&transition),
            )
            .ok();
        }
        self.delegate.route_will_change(&transition);
        Ok(transition)
    }

    /// Shortcut for navigations whose chain is untouched: no model hook
    /// runs. Routes are offered the changelist first; if one of them reacts
    /// by starting a real transition, that transition wins.
    fn query_params_transition(
        self: &Arc<Self>,
        intent: TransitionIntent,
        new_state: TransitionState,
        delta: QueryDelta,
        was_transitioning: bool,
    ) -> Transition {
        debug!(changed = delta.all().len(), "query-param-only transition");
        let args = [
            serde_json::to_value(delta.all()).unwrap_or(Value::Null),
            serde_json::to_value(&delta.changed).unwrap_or(Value::Null),
            serde_json::to_value(&delta.removed).unwrap_or(Value::Null),
        ];
        self.trigger_event(
            &new_state.route_infos,
            true,
            QUERY_PARAMS_DID_CHANGE,
            &args,
            None,
        )
        .ok();

        if !was_transitioning {
            if let Some(active) = self.shared.lock().active_transition.clone() {
                // A queryParamsDidChange observer started a full
                // transition; it subsumes this one.
                return active;
            }
        }

        let transition = Transition::new(TransitionArgs {
            router: Arc::downgrade(self),
            intent: Some(intent),
            state: new_state,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            query_params_only: true,
            caused_by_aborting_transition: false,
            caused_by_initial_transition: false,
            caused_by_aborting_replace_transition: false,
            caused_by_update_transition: false,
        });
        self.delegate.route_will_change(&transition);
        transition
    }

    /// Resolve and finalize one transition. Called once per transition by
    /// [`Transition::complete`].
    pub(crate) async fn drive(
        self: &Arc<Self>,
        transition: &Transition,
    ) -> Result<TransitionState, TransitionError> {
        if transition.is_query_params_only() {
            return self.finalize_query_only(transition).await;
        }

        let state = transition.target_state();
        let resolved = match state.resolve(transition).await {
            Ok(resolved) => resolved,
            Err(failure) => {
                transition.set_target_state(failure.state);
                let error = failure.error;
                if error.is_aborted() {
                    self.clear_active_if(transition.id());
                    return Err(error);
                }
                self.dispatch_error(transition, &error);
                transition.abort();
                return Err(error);
            }
        };
        transition.set_target_state(resolved.clone());

        match self.finalize_transition(transition, resolved).await {
            Ok(final_state) => Ok(final_state),
            Err(error) => {
                if !error.is_aborted() {
                    self.dispatch_error(transition, &error);
                    transition.abort();
                }
                Err(error)
            }
        }
    }

    async fn finalize_transition(
        self: &Arc<Self>,
        transition: &Transition,
        mut new_state: TransitionState,
    ) -> Result<TransitionState, TransitionError> {
        transition.check_for_abort()?;
        debug!(to = ?new_state.leaf_name(), "finalizing transition");

        self.setup_contexts(transition, &new_state).await?;

        if transition.is_aborted() {
            // A setup hook aborted between checkpoints. The finalized chain
            // shrinks back to what actually got entered.
            let mut shared = self.shared.lock();
            if let Some(current) = shared.current_route_infos.clone() {
                shared.state.route_infos = current;
            }
            return Err(TransitionError::Aborted);
        }

        let (claimed, visible) = self.run_query_finalizers(&new_state);
        new_state.query_params = claimed.clone();
        self.shared.lock().state.query_params = claimed;
        transition.set_target_state(new_state.clone());

        self.update_url_after(transition, &new_state, &visible);
        self.clear_active_if(transition.id());

        let current = {
            let shared = self.shared.lock();
            shared.current_route_infos.clone().unwrap_or_default()
        };
        self.trigger_event(&current, true, "didTransition", &[], Some(transition))
            .ok();
        let snapshots: Vec<RouteInfoSnapshot> = current
            .iter()
            .map(|info| info.snapshot(&new_state.query_params))
            .collect();
        self.delegate.did_transition(&snapshots);
        self.delegate.route_did_change(transition);
        info!(sequence = transition.sequence(), to = ?new_state.leaf_name(), "transition complete");

        Ok(new_state)
    }

    /// Run the enter/exit/setup pass for a fully resolved destination.
    ///
    /// Exited routes leave deepest first, before the state commit. Entered
    /// and context-updated routes run root to leaf afterwards, with abort
    /// checkpoints around each hook; any failure rolls the committed state
    /// back to where it was.
    pub(crate) async fn setup_contexts(
        &self,
        transition: &Transition,
        new_state: &TransitionState,
    ) -> Result<(), TransitionError> {
        let (old_state, old_current) = {
            let shared = self.shared.lock();
            (shared.state.clone(), shared.current_route_infos.clone())
        };
        let partition = partition_routes(&old_state.route_infos, &new_state.route_infos);

        for info in &partition.exited {
            if let Some(route) = info.route() {
                debug!(segment = %info.name(), "exiting");
                route.exit().await;
            }
        }

        {
            let mut shared = self.shared.lock();
            shared.state = new_state.clone();
            shared.current_route_infos = Some(partition.unchanged.clone());
        }

        let mut result = Ok(());
        for info in &partition.updated_context {
            result = self.route_entered_or_updated(transition, info, false).await;
            if result.is_err() {
                break;
            }
        }
        if result.is_ok() {
            for info in &partition.entered {
                result = self.route_entered_or_updated(transition, info, true).await;
                if result.is_err() {
                    break;
                }
            }
        }

        if let Err(error) = result {
            let mut shared = self.shared.lock();
            shared.state = old_state.clone();
            shared.current_route_infos = old_current.or(Some(old_state.route_infos));
            return Err(error);
        }
        Ok(())
    }

    async fn route_entered_or_updated(
        &self,
        transition: &Transition,
        info: &RouteInfo,
        enter: bool,
    ) -> Result<(), TransitionError> {
        let Some(route) = info.route() else {
            return Ok(());
        };
        if enter {
            debug!(segment = %info.name(), "entering");
            route
                .enter(transition)
                .await
                .map_err(|error| TransitionError::hook(info.name(), error))?;
        }
        transition.check_for_abort()?;
        route.context_did_change();
        route
            .setup(info.context(), transition)
            .await
            .map_err(|error| TransitionError::hook(info.name(), error))?;
        transition.check_for_abort()?;

        let mut shared = self.shared.lock();
        if let Some(current) = shared.current_route_infos.as_mut() {
            current.push(info.clone());
        }
        Ok(())
    }

    /// The completion half of a query-param-only transition: claim pass,
    /// URL, notifications. The chain is untouched by construction.
    async fn finalize_query_only(
        self: &Arc<Self>,
        transition: &Transition,
    ) -> Result<TransitionState, TransitionError> {
        transition.check_for_abort()?;
        let mut state = transition.target_state();
        let (claimed, visible) = self.run_query_finalizers(&state);
        state.query_params = claimed.clone();
        {
            let mut shared = self.shared.lock();
            shared.state.query_params = claimed;
        }
        transition.set_target_state(state.clone());

        self.update_url_after(transition, &state, &visible);
        self.clear_active_if(transition.id());

        let snapshots: Vec<RouteInfoSnapshot> = {
            let shared = self.shared.lock();
            shared
                .current_route_infos
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|info| info.snapshot(&state.query_params))
                .collect()
        };
        self.delegate.did_transition(&snapshots);
        self.delegate.route_did_change(transition);
        Ok(state)
    }

    /// Offer pending query params to each route, root to leaf. Keys no
    /// route claims are dropped from both state and URL.
    fn run_query_finalizers(&self, state: &TransitionState) -> (QueryParams, QueryParams) {
        let mut finalizer = QueryFinalizer::new(state.query_params.clone());
        for info in &state.route_infos {
            let route = info
                .route()
                .cloned()
                .or_else(|| self.delegate.try_route(info.name()));
            if let Some(route) = route {
                route.finalize_query_param_change(&mut finalizer);
            }
        }
        finalizer.finish()
    }

    fn update_url_after(
        &self,
        transition: &Transition,
        state: &TransitionState,
        visible: &QueryParams,
    ) {
        let Some(method) = transition.url_method() else {
            return;
        };
        let mut params = Params::new();
        for info in state.route_infos.iter().rev() {
            for (key, value) in info.serialize_params() {
                params.entry(key).or_insert(value);
            }
            if let Some(route) = info.route() {
                if route.inaccessible_by_url() {
                    return;
                }
            }
        }
        let Some(leaf) = state.leaf_name() else {
            return;
        };
        let mut url = match self.recognizer.generate(leaf, &params) {
            Ok(url) => url,
            Err(error) => {
                warn!(%error, route = leaf, "skipping URL update");
                return;
            }
        };
        if !visible.is_empty() {
            url.push('?');
            url.push_str(&encode_query(visible));
        }
        match method {
            UrlMethod::Update => self.delegate.update_url(&url),
            UrlMethod::Replace => self.delegate.replace_url(&url),
        }
    }

    /// Bubble a failed transition's error from the failing segment up to
    /// the root; the delegate hears about it only if no route consumed it.
    fn dispatch_error(&self, transition: &Transition, error: &TransitionError) {
        let state = transition.target_state();
        if state.route_infos.is_empty() {
            self.delegate.transition_did_error(error, transition);
            return;
        }
        let last = transition
            .resolve_index()
            .min(state.route_infos.len() - 1);
        let mut handled = false;
        for info in state.route_infos[..=last].iter().rev() {
            let Some(route) = info.route() else { continue };
            match route.on_error(error) {
                EventOutcome::Stop => return,
                EventOutcome::Continue => handled = true,
                EventOutcome::NotHandled => {}
            }
        }
        if !handled {
            self.delegate.transition_did_error(error, transition);
        }
    }

    pub(crate) fn trigger_event(
        &self,
        infos: &[RouteInfo],
        ignore_failure: bool,
        name: &str,
        args: &[Value],
        transition: Option<&Transition>,
    ) -> Result<(), RouterError> {
        let mut handled = false;
        for info in infos.iter().rev() {
            let Some(route) = info.route() else { continue };
            match route.on_event(name, args, transition) {
                EventOutcome::Stop => return Ok(()),
                EventOutcome::Continue => handled = true,
                EventOutcome::NotHandled => {}
            }
        }
        if handled || ignore_failure {
            Ok(())
        } else {
            Err(RouterError::UnhandledEvent(name.to_string()))
        }
    }
}

/// Same chain, by info identity. Value-equal replacements do not count;
/// only infos carried over from the compared state do.
fn same_route_infos(a: &[RouteInfo], b: &[RouteInfo]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_same(y))
}

struct RoutePartition {
    /// Same route object, different context. Re-setup without re-enter.
    updated_context: Vec<RouteInfo>,
    /// Leaving routes, deepest first.
    exited: Vec<RouteInfo>,
    /// Fresh routes, root to leaf.
    entered: Vec<RouteInfo>,
    unchanged: Vec<RouteInfo>,
}

/// Split old and new chains by route identity and context identity. Once a
/// route differs at some depth, everything deeper enters/exits regardless
/// of name equality.
fn partition_routes(old: &[RouteInfo], new: &[RouteInfo]) -> RoutePartition {
    let mut partition = RoutePartition {
        updated_context: Vec::new(),
        exited: Vec::new(),
        entered: Vec::new(),
        unchanged: Vec::new(),
    };
    let mut route_changed = false;
    let mut context_changed = false;

    for (i, new_info) in new.iter().enumerate() {
        let old_info = old.get(i);
        let same_route = match (old_info.and_then(|o| o.route()), new_info.route()) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        if !same_route {
            route_changed = true;
        }

        if route_changed {
            partition.entered.push(new_info.clone());
            if let Some(old_info) = old_info {
                partition.exited.insert(0, old_info.clone());
            }
        } else if context_changed
            || !model_opt_eq(old_info.and_then(|o| o.context()), new_info.context())
        {
            context_changed = true;
            partition.updated_context.push(new_info.clone());
        } else {
            partition.unchanged.push(new_info.clone());
        }
    }
    for old_info in old.iter().skip(new.len()) {
        partition.exited.insert(0, old_info.clone());
    }
    partition
}
