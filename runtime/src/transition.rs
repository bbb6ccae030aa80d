//! Transition - Navigation Attempt Lifecycle
//!
//! A `Transition` is a cheaply cloneable handle on one navigation attempt.
//! Hooks receive it to inspect the destination, stash and read resolved
//! models, abort, or retry; the embedder drives it to completion with
//! [`Transition::complete`] or [`Transition::follow_redirects`].
//!
//! Completion is pull-driven and memoized: the first `complete` call runs
//! resolution and finalization, every later call (and every clone) gets the
//! same outcome back.

use crate::intent::TransitionIntent;
use crate::route::SharedRoute;
use crate::router::RouterCore;
use crate::state::TransitionState;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;
use waypoint_core::{Model, TransitionError};

/// How a finalized transition touches the URL. `None` leaves it alone
/// (URL-driven transitions already reflect their destination).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlMethod {
    Update,
    Replace,
}

#[derive(Clone)]
pub struct Transition {
    inner: Arc<TransitionInner>,
}

pub(crate) struct TransitionArgs {
    pub router: Weak<RouterCore>,
    pub intent: Option<TransitionIntent>,
    pub state: TransitionState,
    pub sequence: u64,
    pub query_params_only: bool,
    pub caused_by_aborting_transition: bool,
    pub caused_by_initial_transition: bool,
    pub caused_by_aborting_replace_transition: bool,
    pub caused_by_update_transition: bool,
}

struct TransitionInner {
    id: Uuid,
    sequence: u64,
    router: Weak<RouterCore>,
    intent: Option<TransitionIntent>,
    query_params_only: bool,
    caused_by_aborting_transition: bool,
    caused_by_initial_transition: bool,
    caused_by_aborting_replace_transition: bool,
    caused_by_update_transition: bool,
    shared: Mutex<TransitionShared>,
    settled: Notify,
}

#[derive(Default)]
struct TransitionShared {
    state: TransitionState,
    resolved_models: HashMap<String, Model>,
    resolve_index: usize,
    aborted: bool,
    aborted_at: Option<DateTime<Utc>>,
    driving: bool,
    url_method: Option<UrlMethod>,
    redirected_to: Option<Transition>,
    outcome: Option<Result<TransitionState, TransitionError>>,
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.inner.shared.lock();
        f.debug_struct("Transition")
            .field("sequence", &self.inner.sequence)
            .field("to", &shared.state.leaf_name())
            .field("aborted", &shared.aborted)
            .field("settled", &shared.outcome.is_some())
            .finish()
    }
}

impl Transition {
    pub(crate) fn new(args: TransitionArgs) -> Self {
        Transition {
            inner: Arc::new(TransitionInner {
                id: Uuid::new_v4(),
                sequence: args.sequence,
                router: args.router,
                intent: args.intent,
                query_params_only: args.query_params_only,
                caused_by_aborting_transition: args.caused_by_aborting_transition,
                caused_by_initial_transition: args.caused_by_initial_transition,
                caused_by_aborting_replace_transition: args.caused_by_aborting_replace_transition,
                caused_by_update_transition: args.caused_by_update_transition,
                shared: Mutex::new(TransitionShared {
                    state: args.state,
                    url_method: Some(UrlMethod::Update),
                    ..TransitionShared::default()
                }),
                settled: Notify::new(),
            }),
        }
    }

    /// A transition that is already done: completing it yields `state`
    /// without running anything. Used for no-op navigations.
    pub(crate) fn completed(router: Weak<RouterCore>, state: TransitionState) -> Self {
        let transition = Transition::new(TransitionArgs {
            router,
            intent: None,
            state: state.clone(),
            sequence: 0,
            query_params_only: false,
            caused_by_aborting_transition: false,
            caused_by_initial_transition: false,
            caused_by_aborting_replace_transition: false,
            caused_by_update_transition: false,
        });
        {
            let mut shared = transition.inner.shared.lock();
            shared.url_method = None;
            shared.outcome = Some(Ok(state));
        }
        transition
    }

    /// A transition that failed before any segment could run.
    pub(crate) fn failed(
        router: Weak<RouterCore>,
        intent: Option<TransitionIntent>,
        error: TransitionError,
    ) -> Self {
        let transition = Transition::new(TransitionArgs {
            router,
            intent,
            state: TransitionState::default(),
            sequence: 0,
            query_params_only: false,
            caused_by_aborting_transition: false,
            caused_by_initial_transition: false,
            caused_by_aborting_replace_transition: false,
            caused_by_update_transition: false,
        });
        {
            let mut shared = transition.inner.shared.lock();
            shared.url_method = None;
            shared.outcome = Some(Err(error));
        }
        transition
    }

    /// The intentless, pre-aborted transition handed to change observers
    /// when an abort itself is the navigation event.
    pub(crate) fn detached_aborted(router: Weak<RouterCore>) -> Self {
        let transition = Transition::failed(router, None, TransitionError::Aborted);
        {
            let mut shared = transition.inner.shared.lock();
            shared.aborted = true;
            shared.aborted_at = Some(Utc::now());
        }
        transition
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Monotonic creation order among this router's transitions.
    pub fn sequence(&self) -> u64 {
        self.inner.sequence
    }

    pub fn intent(&self) -> Option<&TransitionIntent> {
        self.inner.intent.as_ref()
    }

    /// True for transitions that only reconcile query params and never run
    /// model hooks.
    pub fn is_query_params_only(&self) -> bool {
        self.inner.query_params_only
    }

    /// True when this transition exists because it superseded another.
    pub fn is_caused_by_aborting_transition(&self) -> bool {
        self.inner.caused_by_aborting_transition
    }

    /// True when the transition it superseded was the router's first.
    pub fn is_caused_by_initial_transition(&self) -> bool {
        self.inner.caused_by_initial_transition
    }

    /// True when the transition it superseded was going to replace the URL.
    pub fn is_caused_by_aborting_replace_transition(&self) -> bool {
        self.inner.caused_by_aborting_replace_transition
    }

    /// True when the transition it superseded was going to push a new URL
    /// entry.
    pub fn is_caused_by_update_transition(&self) -> bool {
        self.inner.caused_by_update_transition
    }

    /// The destination chain as currently known. Before resolution this is
    /// the intent-applied candidate; after success it is the final state.
    pub fn target_state(&self) -> TransitionState {
        self.inner.shared.lock().state.clone()
    }

    pub(crate) fn set_target_state(&self, state: TransitionState) {
        self.inner.shared.lock().state = state;
    }

    pub fn url_method(&self) -> Option<UrlMethod> {
        self.inner.shared.lock().url_method
    }

    /// Set how finalization touches the URL. Chainable, mirroring the
    /// `transition_to(...).method(None)` usage in delegates.
    pub fn method(&self, method: Option<UrlMethod>) -> Transition {
        self.inner.shared.lock().url_method = method;
        self.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.shared.lock().aborted
    }

    /// When the abort happened, if it did.
    pub fn aborted_at(&self) -> Option<DateTime<Utc>> {
        self.inner.shared.lock().aborted_at
    }

    /// True while this transition is the router's active one and has not
    /// settled.
    pub fn is_active(&self) -> bool {
        {
            let shared = self.inner.shared.lock();
            if shared.aborted || shared.outcome.is_some() {
                return false;
            }
        }
        self.inner
            .router
            .upgrade()
            .map(|router| router.is_active_transition(self.inner.id))
            .unwrap_or(false)
    }

    /// The transition that superseded this one, if any. `follow_redirects`
    /// chases this chain.
    pub fn redirected_to(&self) -> Option<Transition> {
        self.inner.shared.lock().redirected_to.clone()
    }

    /// Index of the segment currently resolving, for diagnostics.
    pub fn resolve_index(&self) -> usize {
        self.inner.shared.lock().resolve_index
    }

    pub(crate) fn set_resolve_index(&self, index: usize) {
        self.inner.shared.lock().resolve_index = index;
    }

    /// The model a named segment resolved to, once its pipeline has stashed
    /// it. `after_model` hooks see their own segment here and may swap it.
    pub fn resolved_model(&self, name: &str) -> Option<Model> {
        self.inner.shared.lock().resolved_models.get(name).cloned()
    }

    /// Replace a segment's stashed model. Hooks use this to substitute the
    /// value descendants and `setup` will receive.
    pub fn set_resolved_model(&self, name: &str, model: Option<Model>) {
        self.stash_resolved_model(name, model);
    }

    pub(crate) fn stash_resolved_model(&self, name: &str, model: Option<Model>) {
        let mut shared = self.inner.shared.lock();
        match model {
            Some(model) => {
                shared.resolved_models.insert(name.to_string(), model);
            }
            None => {
                shared.resolved_models.remove(name);
            }
        }
    }

    pub(crate) fn check_for_abort(&self) -> Result<(), TransitionError> {
        if self.inner.shared.lock().aborted {
            Err(TransitionError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Abort this transition. Idempotent; in-flight hook pipelines observe
    /// the flag at their next checkpoint and unwind with `Aborted`.
    pub fn abort(&self) -> Transition {
        if self.rollback() {
            if let Some(router) = self.inner.router.upgrade() {
                let aborted = Transition::detached_aborted(self.inner.router.clone());
                router.notify_route_will_change(&aborted);
                router.notify_route_did_change(&aborted);
            }
        }
        self.clone()
    }

    /// Mark aborted and release the router's active slot if we hold it.
    /// Returns whether this call did the aborting.
    pub(crate) fn rollback(&self) -> bool {
        {
            let mut shared = self.inner.shared.lock();
            if shared.aborted {
                return false;
            }
            shared.aborted = true;
            shared.aborted_at = Some(Utc::now());
        }
        debug!(sequence = self.inner.sequence, "transition aborted");
        if let Some(router) = self.inner.router.upgrade() {
            router.clear_active_if(self.inner.id);
        }
        true
    }

    /// Supersession: roll back and remember the transition that replaced us
    /// so `follow_redirects` callers land on it.
    pub(crate) fn redirect_to(&self, new_transition: &Transition) {
        self.rollback();
        self.inner.shared.lock().redirected_to = Some(new_transition.clone());
    }

    /// Abort, then re-run the same intent as a fresh transition. The new
    /// transition inherits this one's URL method, except a `None` method:
    /// a URL-silent navigation must still write the URL when retried.
    pub fn retry(&self) -> Transition {
        self.abort();
        let Some(router) = self.inner.router.upgrade() else {
            return Transition::failed(
                self.inner.router.clone(),
                self.inner.intent.clone(),
                TransitionError::RouterGone,
            );
        };
        let Some(intent) = self.inner.intent.clone() else {
            // Nothing to re-run; completed and detached transitions carry
            // no intent.
            return Transition::failed(self.inner.router.clone(), None, TransitionError::Aborted);
        };
        let new_transition = router.transition_by_intent(intent);
        match self.url_method() {
            Some(method) => new_transition.method(Some(method)),
            None => new_transition,
        }
    }

    /// Drive this transition to its outcome: resolve every segment, then
    /// finalize (enter/exit/setup, URL update). Memoized; concurrent calls
    /// on clones wait for the first driver and share its outcome.
    pub async fn complete(&self) -> Result<TransitionState, TransitionError> {
        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            {
                let mut shared = self.inner.shared.lock();
                if let Some(outcome) = &shared.outcome {
                    return outcome.clone();
                }
                if !shared.driving {
                    shared.driving = true;
                    break;
                }
                // Register under the lock so a settle between the check and
                // the await cannot be missed.
                notified.as_mut().enable();
            }
            notified.await;
        }

        let result = match self.inner.router.upgrade() {
            Some(router) => {
                let span = info_span!("transition", sequence = self.inner.sequence);
                router.drive(self).instrument(span).await
            }
            None => Err(TransitionError::RouterGone),
        };

        let outcome = {
            let mut shared = self.inner.shared.lock();
            shared.driving = false;
            shared.outcome.get_or_insert(result).clone()
        };
        self.inner.settled.notify_waiters();
        outcome
    }

    /// Like [`complete`](Self::complete), but when this transition was
    /// superseded, chase the chain of replacements and return the outcome
    /// of whichever transition finally settles.
    pub async fn follow_redirects(&self) -> Result<TransitionState, TransitionError> {
        let mut current = self.clone();
        loop {
            match current.complete().await {
                Ok(state) => return Ok(state),
                Err(error) if error.is_aborted() => match current.redirected_to() {
                    Some(next) => current = next,
                    None => return Err(error),
                },
                Err(error) => return Err(error),
            }
        }
    }

    pub(crate) async fn load_route(&self, name: &str) -> Result<SharedRoute, TransitionError> {
        let router = self
            .inner
            .router
            .upgrade()
            .ok_or(TransitionError::RouterGone)?;
        router.load_route(name).await
    }

    pub(crate) fn notify_will_resolve_model(&self, name: &str) {
        if let Some(router) = self.inner.router.upgrade() {
            router.delegate().will_resolve_model(name, self);
        }
    }
}
