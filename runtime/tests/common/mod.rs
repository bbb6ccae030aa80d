//! Shared fixtures: a table-driven recognizer, scriptable routes, and a
//! recording delegate.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use waypoint_core::{
    EventOutcome, Model, Params, QueryFinalizer, QueryParams, Recognition, RecognizedRoute,
    Recognizer, RouteInfoSnapshot, RouterError, SegmentSpec, TransitionError,
};
use waypoint_runtime::{HookResult, HookValue, Route, Router, RouterDelegate, SharedRoute, Transition};

// ---------------------------------------------------------------------------
// Recognizer

pub struct StaticRecognizer {
    patterns: Vec<(String, String)>,
    chains: HashMap<String, Vec<SegmentSpec>>,
}

impl StaticRecognizer {
    pub fn new() -> Self {
        StaticRecognizer {
            patterns: Vec::new(),
            chains: HashMap::new(),
        }
    }

    /// Register a leaf route: its URL pattern (`:name` marks a dynamic
    /// segment) and its root-to-leaf chain of `(segment, param names)`.
    pub fn route(mut self, leaf: &str, pattern: &str, chain: &[(&str, &[&str])]) -> Self {
        self.patterns.push((pattern.to_string(), leaf.to_string()));
        self.chains.insert(
            leaf.to_string(),
            chain
                .iter()
                .map(|(name, params)| SegmentSpec {
                    name: name.to_string(),
                    param_names: params.iter().map(|p| p.to_string()).collect(),
                })
                .collect(),
        );
        self
    }
}

impl Recognizer for StaticRecognizer {
    fn recognize(&self, url: &str) -> Option<Recognition> {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (url, None),
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        for (pattern, leaf) in &self.patterns {
            let parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
            if parts.len() != segments.len() {
                continue;
            }
            let mut captured = Params::new();
            let matched = parts.iter().zip(&segments).all(|(part, segment)| {
                if let Some(name) = part.strip_prefix(':') {
                    captured.insert(name.to_string(), segment.to_string());
                    true
                } else {
                    part == segment
                }
            });
            if !matched {
                continue;
            }

            let chain = self.chains.get(leaf)?;
            let routes = chain
                .iter()
                .map(|spec| RecognizedRoute {
                    name: spec.name.clone(),
                    params: spec
                        .param_names
                        .iter()
                        .filter_map(|name| captured.get(name).map(|v| (name.clone(), v.clone())))
                        .collect(),
                })
                .collect();
            return Some(Recognition {
                routes,
                query_params: parse_query(query),
            });
        }
        None
    }

    fn generate(&self, name: &str, params: &Params) -> Result<String, RouterError> {
        let (pattern, _) = self
            .patterns
            .iter()
            .find(|(_, leaf)| leaf.as_str() == name)
            .ok_or_else(|| RouterError::UnknownRoute(name.to_string()))?;
        let mut url = String::new();
        for part in pattern.split('/').filter(|s| !s.is_empty()) {
            url.push('/');
            if let Some(param) = part.strip_prefix(':') {
                let value = params
                    .get(param)
                    .ok_or_else(|| RouterError::MissingParameter(param.to_string()))?;
                url.push_str(value);
            } else {
                url.push_str(part);
            }
        }
        if url.is_empty() {
            url.push('/');
        }
        Ok(url)
    }

    fn handlers_for(&self, name: &str) -> Option<Vec<SegmentSpec>> {
        self.chains.get(name).cloned()
    }
}

fn parse_query(query: Option<&str>) -> QueryParams {
    let mut params = QueryParams::new();
    let Some(query) = query else { return params };
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if let Some(base) = key.strip_suffix("[]") {
            if let Value::Array(items) = params
                .entry(base.to_string())
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                items.push(Value::String(value.to_string()));
            }
        } else {
            params.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    params
}

/// The route table the suites share:
///
/// ```text
/// /                      -> application > index
/// /about                 -> application > about
/// /posts/:post_id          -> application > post
/// /posts/:post_id/comments -> application > post > post_comments
/// ```
pub fn fixture_recognizer() -> StaticRecognizer {
    StaticRecognizer::new()
        .route("index", "/", &[("application", &[]), ("index", &[])])
        .route("about", "/about", &[("application", &[]), ("about", &[])])
        .route(
            "post",
            "/posts/:post_id",
            &[("application", &[]), ("post", &["post_id"])],
        )
        .route(
            "post_comments",
            "/posts/:post_id/comments",
            &[
                ("application", &[]),
                ("post", &["post_id"]),
                ("post_comments", &[]),
            ],
        )
}

// ---------------------------------------------------------------------------
// Routes

type ModelFn = Box<dyn Fn(&Params, &Transition) -> anyhow::Result<Option<Model>> + Send + Sync>;
type BeforeFn = Box<dyn Fn(&Transition) -> anyhow::Result<()> + Send + Sync>;
type RedirectFn = Box<dyn Fn(Option<&Model>, &Transition) + Send + Sync>;
type EventFn = Box<dyn Fn(&str, &[Value], Option<&Transition>) -> EventOutcome + Send + Sync>;
type ErrorFn = Box<dyn Fn(&TransitionError) -> EventOutcome + Send + Sync>;

/// A scriptable route that logs every hook invocation.
pub struct TestRoute {
    name: String,
    calls: Mutex<Vec<&'static str>>,
    model_fn: Option<ModelFn>,
    before_fn: Option<BeforeFn>,
    redirect_fn: Option<RedirectFn>,
    event_fn: Option<EventFn>,
    error_fn: Option<ErrorFn>,
    setup_error: Option<String>,
    enter_error: Option<String>,
    claimed: Vec<String>,
    hidden: Vec<String>,
}

impl TestRoute {
    pub fn new(name: &str) -> Self {
        TestRoute {
            name: name.to_string(),
            calls: Mutex::new(Vec::new()),
            model_fn: None,
            before_fn: None,
            redirect_fn: None,
            event_fn: None,
            error_fn: None,
            setup_error: None,
            enter_error: None,
            claimed: Vec::new(),
            hidden: Vec::new(),
        }
    }

    pub fn with_model(
        mut self,
        f: impl Fn(&Params, &Transition) -> anyhow::Result<Option<Model>> + Send + Sync + 'static,
    ) -> Self {
        self.model_fn = Some(Box::new(f));
        self
    }

    pub fn with_before_model(
        mut self,
        f: impl Fn(&Transition) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.before_fn = Some(Box::new(f));
        self
    }

    pub fn with_redirect(
        mut self,
        f: impl Fn(Option<&Model>, &Transition) + Send + Sync + 'static,
    ) -> Self {
        self.redirect_fn = Some(Box::new(f));
        self
    }

    pub fn with_event_handler(
        mut self,
        f: impl Fn(&str, &[Value], Option<&Transition>) -> EventOutcome + Send + Sync + 'static,
    ) -> Self {
        self.event_fn = Some(Box::new(f));
        self
    }

    pub fn with_error_handler(
        mut self,
        f: impl Fn(&TransitionError) -> EventOutcome + Send + Sync + 'static,
    ) -> Self {
        self.error_fn = Some(Box::new(f));
        self
    }

    pub fn with_setup_error(mut self, message: &str) -> Self {
        self.setup_error = Some(message.to_string());
        self
    }

    pub fn with_enter_error(mut self, message: &str) -> Self {
        self.enter_error = Some(message.to_string());
        self
    }

    /// Claim these query-param keys during the finalize pass.
    pub fn claims(mut self, keys: &[&str]) -> Self {
        self.claimed = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Claim these keys for state only, keeping them out of the URL.
    pub fn claims_hidden(mut self, keys: &[&str]) -> Self {
        self.hidden = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn count(&self, hook: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == hook).count()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    fn log(&self, hook: &'static str) {
        self.calls.lock().push(hook);
    }
}

#[async_trait]
impl Route for TestRoute {
    async fn before_model(&self, transition: &Transition) -> HookResult {
        self.log("before_model");
        if let Some(f) = &self.before_fn {
            f(transition)?;
        }
        Ok(HookValue::None)
    }

    async fn model(&self, params: &Params, transition: &Transition) -> HookResult {
        self.log("model");
        match &self.model_fn {
            Some(f) => Ok(match f(params, transition)? {
                Some(model) => HookValue::Model(model),
                None => HookValue::None,
            }),
            None => Ok(HookValue::None),
        }
    }

    async fn redirect(&self, model: Option<&Model>, transition: &Transition) {
        self.log("redirect");
        if let Some(f) = &self.redirect_fn {
            f(model, transition);
        }
    }

    async fn enter(&self, _transition: &Transition) -> anyhow::Result<()> {
        self.log("enter");
        match &self.enter_error {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }

    async fn setup(&self, _context: Option<&Model>, _transition: &Transition) -> anyhow::Result<()> {
        self.log("setup");
        match &self.setup_error {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }

    async fn exit(&self) {
        self.log("exit");
    }

    fn on_event(&self, name: &str, args: &[Value], transition: Option<&Transition>) -> EventOutcome {
        self.log("on_event");
        match &self.event_fn {
            Some(f) => f(name, args, transition),
            None => EventOutcome::NotHandled,
        }
    }

    fn on_error(&self, error: &TransitionError) -> EventOutcome {
        self.log("on_error");
        match &self.error_fn {
            Some(f) => f(error),
            None => EventOutcome::NotHandled,
        }
    }

    fn finalize_query_param_change(&self, finalizer: &mut QueryFinalizer) {
        for key in &self.claimed {
            if let Some(value) = finalizer.pending().get(key).cloned() {
                finalizer.claim(key, value);
            }
        }
        for key in &self.hidden {
            if let Some(value) = finalizer.pending().get(key).cloned() {
                finalizer.claim_hidden(key, value);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Delegate

type WillTransitionFn = Box<dyn Fn(&Transition) + Send + Sync>;

/// Serves registered routes and records URL updates and lifecycle events.
#[derive(Default)]
pub struct TestDelegate {
    routes: Mutex<HashMap<String, Arc<TestRoute>>>,
    urls: Mutex<Vec<(&'static str, String)>>,
    events: Mutex<Vec<String>>,
    will_transition_fn: Mutex<Option<WillTransitionFn>>,
}

impl TestDelegate {
    pub fn register(&self, route: TestRoute) -> Arc<TestRoute> {
        let route = Arc::new(route);
        self.routes
            .lock()
            .insert(route.name.clone(), route.clone());
        route
    }

    /// Install a callback fired from `will_transition`; used to abort
    /// transitions before any hook runs.
    pub fn on_will_transition(&self, f: impl Fn(&Transition) + Send + Sync + 'static) {
        *self.will_transition_fn.lock() = Some(Box::new(f));
    }

    /// `(method, url)` pairs in the order the router emitted them.
    pub fn urls(&self) -> Vec<(&'static str, String)> {
        self.urls.lock().clone()
    }

    pub fn last_url(&self) -> Option<String> {
        self.urls.lock().last().map(|(_, url)| url.clone())
    }

    /// Lifecycle notifications in order, e.g. `willTransition`,
    /// `didTransition(post)`, `transitionDidError`.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl RouterDelegate for TestDelegate {
    async fn load_route(&self, name: &str) -> anyhow::Result<SharedRoute> {
        match self.routes.lock().get(name) {
            Some(route) => {
                let shared: SharedRoute = route.clone();
                Ok(shared)
            }
            None => Err(anyhow::anyhow!("no route registered for '{name}'")),
        }
    }

    fn try_route(&self, name: &str) -> Option<SharedRoute> {
        self.routes.lock().get(name).map(|route| {
            let shared: SharedRoute = route.clone();
            shared
        })
    }

    fn update_url(&self, url: &str) {
        self.urls.lock().push(("update", url.to_string()));
    }

    fn replace_url(&self, url: &str) {
        self.urls.lock().push(("replace", url.to_string()));
    }

    fn will_transition(
        &self,
        _from: &[RouteInfoSnapshot],
        _to: &[RouteInfoSnapshot],
        transition: &Transition,
    ) {
        self.events.lock().push("willTransition".to_string());
        if let Some(f) = &*self.will_transition_fn.lock() {
            f(transition);
        }
    }

    fn did_transition(&self, route_infos: &[RouteInfoSnapshot]) {
        let leaf = route_infos.last().map(|i| i.name.as_str()).unwrap_or("");
        self.events.lock().push(format!("didTransition({leaf})"));
    }

    fn transition_did_error(&self, error: &TransitionError, _transition: &Transition) {
        self.events.lock().push(format!("transitionDidError({error})"));
    }
}

// ---------------------------------------------------------------------------
// Harness

pub struct Harness {
    pub router: Router,
    pub delegate: Arc<TestDelegate>,
}

pub fn harness() -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let delegate = Arc::new(TestDelegate::default());
    let router = Router::new(fixture_recognizer(), delegate.clone());
    Harness { router, delegate }
}

impl Harness {
    /// Register plain routes for every segment name given.
    pub fn blank_routes(&self, names: &[&str]) -> Vec<Arc<TestRoute>> {
        names
            .iter()
            .map(|name| self.delegate.register(TestRoute::new(name)))
            .collect()
    }

    /// Register the post chain with a model hook that builds
    /// `{"id": <post_id>}` models, and blank application/comments routes.
    pub fn standard_post_routes(&self) -> (Arc<TestRoute>, Arc<TestRoute>, Arc<TestRoute>) {
        let app = self.delegate.register(TestRoute::new("application"));
        let post = self.delegate.register(TestRoute::new("post").with_model(|params, _| {
            let id = params.get("post_id").cloned().unwrap_or_default();
            Ok(Some(waypoint_core::model(serde_json::json!({ "id": id }))))
        }));
        let comments = self.delegate.register(TestRoute::new("post_comments"));
        (app, post, comments)
    }
}
