//! TransitionIntent - Destination Descriptions and State Diffing
//!
//! An intent says where a navigation wants to go, in one of two vocabularies:
//! a URL, or a route name plus context arguments. Applying an intent to the
//! current state yields the candidate destination state, reusing every
//! segment the intent does not disturb so resolved work is never repeated.

use crate::route::RouterDelegate;
use crate::route_info::{model_opt_eq, RouteInfo};
use crate::state::TransitionState;
use waypoint_core::{
    is_param, param_to_string, Model, Params, QueryParams, Recognizer, TransitionError,
};

#[derive(Clone)]
pub enum TransitionIntent {
    Url(UrlIntent),
    Named(NamedIntent),
}

#[derive(Clone, Debug)]
pub struct UrlIntent {
    pub url: String,
}

/// A destination named by route, with positional context arguments. Each
/// argument is either a param value (string, number, bool) or a model; param
/// values are matched to dynamic segments right to left.
#[derive(Clone)]
pub struct NamedIntent {
    pub name: String,
    pub contexts: Vec<Model>,
    pub query_params: QueryParams,
    /// The last finalized state, supplied when this intent is applied
    /// against an in-flight transition's target. Segments whose context
    /// would otherwise come from a not-yet-settled ancestor fall back to
    /// the context the user is still looking at.
    pub(crate) pre_transition_state: Option<TransitionState>,
    /// Refresh pivot: this segment and everything below it is forced back
    /// to unresolved even when the diff would have reused it.
    pub pivot: Option<String>,
}

impl TransitionIntent {
    pub fn url(url: impl Into<String>) -> Self {
        TransitionIntent::Url(UrlIntent { url: url.into() })
    }

    pub fn named(
        name: impl Into<String>,
        contexts: Vec<Model>,
        query_params: QueryParams,
    ) -> Self {
        TransitionIntent::Named(NamedIntent {
            name: name.into(),
            contexts,
            query_params,
            pre_transition_state: None,
            pivot: None,
        })
    }

    pub fn as_url(&self) -> Option<&str> {
        match self {
            TransitionIntent::Url(intent) => Some(&intent.url),
            TransitionIntent::Named(_) => None,
        }
    }

    pub(crate) fn set_pre_transition_state(&mut self, state: TransitionState) {
        if let TransitionIntent::Named(named) = self {
            named.pre_transition_state = Some(state);
        }
    }

    pub(crate) fn apply_to_state(
        &self,
        old_state: &TransitionState,
        recognizer: &dyn Recognizer,
        delegate: &dyn RouterDelegate,
        is_intermediate: bool,
        checking_if_active: bool,
    ) -> Result<TransitionState, TransitionError> {
        match self {
            TransitionIntent::Url(intent) => intent.apply(old_state, recognizer, delegate),
            TransitionIntent::Named(intent) => intent.apply(
                old_state,
                recognizer,
                delegate,
                is_intermediate,
                checking_if_active,
            ),
        }
    }
}

impl UrlIntent {
    /// Match the URL and diff against the old chain, root to leaf. Once any
    /// segment differs, every deeper segment is replaced too, so a changed
    /// ancestor always re-resolves its subtree.
    fn apply(
        &self,
        old_state: &TransitionState,
        recognizer: &dyn Recognizer,
        delegate: &dyn RouterDelegate,
    ) -> Result<TransitionState, TransitionError> {
        let recognition = recognizer
            .recognize(&self.url)
            .ok_or_else(|| TransitionError::UnrecognizedUrl(self.url.clone()))?;
        if recognition.routes.is_empty() {
            return Err(TransitionError::UnrecognizedUrl(self.url.clone()));
        }

        let mut states_differ = false;
        let mut route_infos = Vec::with_capacity(recognition.routes.len());

        for (i, matched) in recognition.routes.iter().enumerate() {
            let route = delegate.try_route(&matched.name);
            if let Some(route) = &route {
                if route.inaccessible_by_url() {
                    return Err(TransitionError::UnrecognizedUrl(self.url.clone()));
                }
            }

            let param_names: Vec<String> = matched.params.keys().cloned().collect();
            let new_info = RouteInfo::unresolved_by_param(
                &matched.name,
                param_names,
                matched.params.clone(),
                route,
            );

            let old = old_state.route_infos.get(i);
            if states_differ || new_info.should_supersede(old) {
                states_differ = true;
                route_infos.push(new_info);
            } else if let Some(old) = old {
                route_infos.push(old.clone());
            }
        }

        Ok(TransitionState {
            route_infos,
            query_params: recognition.query_params,
        })
    }
}

impl NamedIntent {
    /// Diff against the old chain leaf to root, consuming context arguments
    /// from the right as dynamic segments are encountered.
    ///
    /// The shallowest superseded index is remembered; after the walk, every
    /// already-resolved segment at or below it is invalidated back to its
    /// params-driven form so a changed ancestor re-resolves its subtree even
    /// where the old infos were reused verbatim.
    fn apply(
        &self,
        old_state: &TransitionState,
        recognizer: &dyn Recognizer,
        delegate: &dyn RouterDelegate,
        is_intermediate: bool,
        checking_if_active: bool,
    ) -> Result<TransitionState, TransitionError> {
        let handlers = recognizer
            .handlers_for(&self.name)
            .ok_or_else(|| TransitionError::UnknownRoute(self.name.clone()))?;
        if handlers.is_empty() {
            return Err(TransitionError::UnknownRoute(self.name.clone()));
        }

        let mut objects = self.contexts.clone();

        // The pivot seeds the invalidation point; segments at or below it are
        // rebuilt params-driven so their pipelines re-run.
        let mut invalidate_index = handlers.len();
        if let Some(pivot) = &self.pivot {
            if let Some(pos) = handlers.iter().position(|spec| spec.name == *pivot) {
                invalidate_index = pos;
            }
        }

        let mut rev_infos = Vec::with_capacity(handlers.len());

        for i in (0..handlers.len()).rev() {
            let spec = &handlers[i];
            let old = old_state.route_infos.get(i);
            let route = delegate.try_route(&spec.name);

            let mut new_info = if !spec.param_names.is_empty() && i < invalidate_index {
                self.info_for_dynamic_segment(
                    &spec.name,
                    &spec.param_names,
                    &mut objects,
                    old,
                    i,
                    route,
                )?
            } else {
                create_param_route_info(&spec.name, &spec.param_names, &mut objects, old, route)?
            };

            if checking_if_active {
                // Serialize URL params with the provided context, but keep
                // the old context so the activity probe never mutates what
                // the comparison runs against. Matching contexts borrow the
                // old params outright, sparing routes a serialize impl.
                let context = new_info.context().cloned();
                new_info = new_info.become_resolved(None, context);
                let old_context = old.and_then(|o| o.context().cloned());
                if !spec.param_names.is_empty()
                    && old_context.is_some()
                    && model_opt_eq(new_info.context(), old_context.as_ref())
                {
                    if let Some(old) = old {
                        new_info.set_params(old.params().clone());
                    }
                }
                new_info.set_context(old_context);
            }

            let mut chosen = if new_info.should_supersede(old) {
                invalidate_index = invalidate_index.min(i);
                new_info
            } else if let Some(old) = old {
                old.clone()
            } else {
                new_info
            };

            if is_intermediate && !checking_if_active {
                let context = chosen.context().cloned();
                chosen = chosen.become_resolved(None, context);
            }

            rev_infos.push(chosen);
        }

        if !objects.is_empty() {
            return Err(TransitionError::TooManyContexts(self.name.clone()));
        }

        rev_infos.reverse();
        let mut route_infos = rev_infos;

        if !is_intermediate {
            for info in route_infos.iter_mut().skip(invalidate_index) {
                if info.is_resolved() {
                    *info = info.get_unresolved();
                }
            }
        }

        let mut query_params = QueryParams::new();
        if is_intermediate {
            query_params.extend(old_state.query_params.clone());
        }
        query_params.extend(self.query_params.clone());

        Ok(TransitionState {
            route_infos,
            query_params,
        })
    }

    /// Pick the context source for a dynamic segment: a supplied argument if
    /// one remains, the matching old info if the name lines up, the
    /// pre-transition context as a fallback, and the stale old info as a
    /// last resort.
    fn info_for_dynamic_segment(
        &self,
        name: &str,
        param_names: &[String],
        objects: &mut Vec<Model>,
        old: Option<&RouteInfo>,
        index: usize,
        route: Option<crate::route::SharedRoute>,
    ) -> Result<RouteInfo, TransitionError> {
        if !objects.is_empty() {
            let peek_is_param = objects.last().map(|m| is_param(m)).unwrap_or(false);
            if peek_is_param {
                return create_param_route_info(name, param_names, objects, old, route);
            }
            if let Some(context) = objects.pop() {
                return Ok(RouteInfo::unresolved_by_object(
                    name,
                    param_names.to_vec(),
                    context,
                    route,
                ));
            }
        }

        if let Some(old) = old {
            if old.name() == name {
                return Ok(old.clone());
            }
        }

        if let Some(pre) = &self.pre_transition_state {
            if let Some(context) = pre
                .route_infos
                .get(index)
                .and_then(|info| info.context().cloned())
            {
                return Ok(RouteInfo::unresolved_by_object(
                    name,
                    param_names.to_vec(),
                    context,
                    route,
                ));
            }
        }

        if let Some(old) = old {
            return Ok(old.clone());
        }

        Err(TransitionError::MissingParams {
            route: name.to_string(),
            missing: param_names.to_vec(),
        })
    }
}

/// Build a params-driven info for a segment, soaking up trailing param
/// arguments right to left and falling back to the old info's params when
/// the names still match.
fn create_param_route_info(
    name: &str,
    param_names: &[String],
    objects: &mut Vec<Model>,
    old: Option<&RouteInfo>,
    route: Option<crate::route::SharedRoute>,
) -> Result<RouteInfo, TransitionError> {
    let empty = Params::new();
    let old_params = match old {
        Some(old) if old.name() == name => old.params(),
        _ => &empty,
    };

    let mut params = Params::new();
    let mut missing = Vec::new();
    for param_name in param_names.iter().rev() {
        let peek_is_param = objects.last().map(|m| is_param(m)).unwrap_or(false);
        if peek_is_param {
            if let Some(value) = objects.pop() {
                params.insert(param_name.clone(), param_to_string(&value));
            }
        } else if let Some(value) = old_params.get(param_name) {
            params.insert(param_name.clone(), value.clone());
        } else {
            missing.push(param_name.clone());
        }
    }

    if !missing.is_empty() {
        missing.reverse();
        return Err(TransitionError::MissingParams {
            route: name.to_string(),
            missing,
        });
    }

    Ok(RouteInfo::unresolved_by_param(
        name,
        param_names.to_vec(),
        params,
        route,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{RouterDelegate, SharedRoute};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeMap;
    use waypoint_core::{model, Recognition, RecognizedRoute, RouterError, SegmentSpec};

    struct FixtureRecognizer;

    fn chain_for(name: &str) -> Option<Vec<SegmentSpec>> {
        let spec = |n: &str, params: &[&str]| SegmentSpec {
            name: n.to_string(),
            param_names: params.iter().map(|p| p.to_string()).collect(),
        };
        match name {
            "index" => Some(vec![spec("index", &[])]),
            "post" => Some(vec![spec("application", &[]), spec("post", &["post_id"])]),
            "post_comments" => Some(vec![
                spec("application", &[]),
                spec("post", &["post_id"]),
                spec("post_comments", &[]),
            ]),
            _ => None,
        }
    }

    impl Recognizer for FixtureRecognizer {
        fn recognize(&self, url: &str) -> Option<Recognition> {
            let path = url.split('?').next().unwrap_or(url);
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            let routes = match segments.as_slice() {
                [] => vec![RecognizedRoute {
                    name: "index".into(),
                    params: Params::new(),
                }],
                ["posts", id] => vec![
                    RecognizedRoute {
                        name: "application".into(),
                        params: Params::new(),
                    },
                    RecognizedRoute {
                        name: "post".into(),
                        params: BTreeMap::from([("post_id".to_string(), id.to_string())]),
                    },
                ],
                ["posts", id, "comments"] => {
                    let mut routes = self.recognize(&format!("/posts/{id}"))?.routes;
                    routes.push(RecognizedRoute {
                        name: "post_comments".into(),
                        params: Params::new(),
                    });
                    routes
                }
                _ => return None,
            };
            Some(Recognition {
                routes,
                query_params: QueryParams::new(),
            })
        }

        fn generate(&self, name: &str, _params: &Params) -> Result<String, RouterError> {
            Err(RouterError::UnknownRoute(name.to_string()))
        }

        fn handlers_for(&self, name: &str) -> Option<Vec<SegmentSpec>> {
            chain_for(name)
        }
    }

    struct NullDelegate;

    #[async_trait]
    impl RouterDelegate for NullDelegate {
        async fn load_route(&self, name: &str) -> anyhow::Result<SharedRoute> {
            Err(anyhow::anyhow!("no route loader for '{name}'"))
        }

        fn update_url(&self, _url: &str) {}
    }

    fn apply(intent: &TransitionIntent, old: &TransitionState) -> TransitionState {
        intent
            .apply_to_state(old, &FixtureRecognizer, &NullDelegate, false, false)
            .unwrap()
    }

    fn names(state: &TransitionState) -> Vec<&str> {
        state.route_infos.iter().map(|i| i.name()).collect()
    }

    #[test]
    fn test_url_intent_builds_chain() {
        let state = apply(&TransitionIntent::url("/posts/5"), &TransitionState::default());
        assert_eq!(names(&state), vec!["application", "post"]);
        assert_eq!(
            state.route_infos[1].params().get("post_id"),
            Some(&"5".to_string())
        );
    }

    #[test]
    fn test_url_intent_unrecognized() {
        let err = TransitionIntent::url("/nope")
            .apply_to_state(
                &TransitionState::default(),
                &FixtureRecognizer,
                &NullDelegate,
                false,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, TransitionError::UnrecognizedUrl(_)));
    }

    #[test]
    fn test_url_intent_reuses_unchanged_prefix() {
        let old = apply(&TransitionIntent::url("/posts/5"), &TransitionState::default());
        let new = apply(&TransitionIntent::url("/posts/5/comments"), &old);
        assert_eq!(names(&new), vec!["application", "post", "post_comments"]);
        assert!(new.route_infos[0].is_same(&old.route_infos[0]));
        assert!(new.route_infos[1].is_same(&old.route_infos[1]));
    }

    #[test]
    fn test_url_intent_cascade_invalidates_descendants() {
        let old = apply(
            &TransitionIntent::url("/posts/5/comments"),
            &TransitionState::default(),
        );
        let new = apply(&TransitionIntent::url("/posts/6/comments"), &old);
        assert!(new.route_infos[0].is_same(&old.route_infos[0]));
        assert!(!new.route_infos[1].is_same(&old.route_infos[1]));
        assert!(!new.route_infos[2].is_same(&old.route_infos[2]));
    }

    #[test]
    fn test_named_intent_consumes_params_right_to_left() {
        let intent = TransitionIntent::named(
            "post",
            vec![model(json!("5"))],
            QueryParams::new(),
        );
        let state = apply(&intent, &TransitionState::default());
        assert_eq!(names(&state), vec!["application", "post"]);
        assert_eq!(
            state.route_infos[1].params().get("post_id"),
            Some(&"5".to_string())
        );
    }

    #[test]
    fn test_named_intent_missing_params() {
        let intent = TransitionIntent::named("post", vec![], QueryParams::new());
        let err = intent
            .apply_to_state(
                &TransitionState::default(),
                &FixtureRecognizer,
                &NullDelegate,
                false,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, TransitionError::MissingParams { .. }));
    }

    #[test]
    fn test_named_intent_too_many_contexts() {
        let intent = TransitionIntent::named(
            "index",
            vec![model(json!({"id": 1}))],
            QueryParams::new(),
        );
        let err = intent
            .apply_to_state(
                &TransitionState::default(),
                &FixtureRecognizer,
                &NullDelegate,
                false,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, TransitionError::TooManyContexts(_)));
    }

    #[test]
    fn test_named_intent_object_context() {
        let post = model(json!({"post_id": 7}));
        let intent = TransitionIntent::named("post", vec![post.clone()], QueryParams::new());
        let state = apply(&intent, &TransitionState::default());
        let context = state.route_infos[1].context().unwrap();
        assert!(std::sync::Arc::ptr_eq(context, &post));
    }

    #[test]
    fn test_named_intent_same_context_is_noop_diff() {
        let post = model(json!({"post_id": 7}));
        let intent = TransitionIntent::named("post", vec![post.clone()], QueryParams::new());
        let old = apply(&intent, &TransitionState::default());
        let again = apply(&intent, &old);
        assert!(again.route_infos[0].is_same(&old.route_infos[0]));
        assert!(again.route_infos[1].is_same(&old.route_infos[1]));
    }

    #[test]
    fn test_invalidated_ancestor_unresolves_children() {
        // Resolve the full chain, then retarget the middle segment with a
        // new context. The reused leaf must drop back to unresolved.
        let old_raw = apply(
            &TransitionIntent::url("/posts/5/comments"),
            &TransitionState::default(),
        );
        let mut old = old_raw.clone();
        for info in old.route_infos.iter_mut() {
            *info = info.become_resolved(None, Some(model(json!(null))));
        }

        let intent = TransitionIntent::named(
            "post_comments",
            vec![model(json!({"post_id": 9}))],
            QueryParams::new(),
        );
        let new = apply(&intent, &old);
        assert!(new.route_infos[0].is_resolved());
        assert!(!new.route_infos[1].is_resolved());
        assert!(!new.route_infos[2].is_resolved());
    }

    #[test]
    fn test_pivot_forces_reresolution_below_it() {
        let old_raw = apply(
            &TransitionIntent::url("/posts/5/comments"),
            &TransitionState::default(),
        );
        let mut old = old_raw.clone();
        for info in old.route_infos.iter_mut() {
            *info = info.become_resolved(None, Some(model(json!(null))));
        }

        let intent = TransitionIntent::Named(NamedIntent {
            name: "post_comments".into(),
            contexts: vec![],
            query_params: QueryParams::new(),
            pre_transition_state: None,
            pivot: Some("post".into()),
        });
        let new = apply(&intent, &old);
        assert!(new.route_infos[0].is_resolved());
        assert!(!new.route_infos[1].is_resolved());
        assert!(!new.route_infos[2].is_resolved());
    }

    #[test]
    fn test_old_params_fallback_on_name_match() {
        let old = apply(&TransitionIntent::url("/posts/5"), &TransitionState::default());
        // Fresh params-driven application of the same named route with no
        // arguments keeps the old segment untouched.
        let intent = TransitionIntent::named("post", vec![], QueryParams::new());
        let state = apply(&intent, &old);
        assert!(state.route_infos[1].is_same(&old.route_infos[1]));
    }

    #[test]
    fn test_intermediate_merges_old_query_params() {
        let mut old = apply(&TransitionIntent::url("/posts/5"), &TransitionState::default());
        old.query_params.insert("page".into(), json!("2"));

        let mut qp = QueryParams::new();
        qp.insert("sort".into(), json!("asc"));
        let intent = TransitionIntent::named("post", vec![model(json!("5"))], qp);
        let state = intent
            .apply_to_state(&old, &FixtureRecognizer, &NullDelegate, true, false)
            .unwrap();
        assert_eq!(state.query_params.get("page"), Some(&json!("2")));
        assert_eq!(state.query_params.get("sort"), Some(&json!("asc")));
        // Intermediate application resolves in place without running hooks.
        assert!(state.route_infos.iter().all(|i| i.is_resolved()));
    }
}
