//! RouteInfo - Per-Segment Resolution State
//!
//! One `RouteInfo` describes a single segment's position in a chain and how
//! its model will be (or was) produced. The three strategies form a closed
//! set: resolve-from-params, resolve-from-supplied-object, and already
//! resolved. All three share one pipeline; the variant only decides how the
//! model itself is obtained.
//!
//! RouteInfos are immutable after creation. "Mutation" during resolution
//! means replacement: `resolve` returns a fresh `Resolved` info that the
//! owning state swaps in at the same index.

use crate::route::SharedRoute;
use crate::transition::Transition;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use waypoint_core::{
    default_serialize, params_match, Model, Params, QueryParams, RouteInfoSnapshot,
    TransitionError,
};

/// How this segment's model is obtained.
#[derive(Clone)]
pub(crate) enum RouteInfoKind {
    /// Params are known; the route's `deserialize`/`model` hook produces the
    /// model.
    Param,
    /// A context object was supplied directly (named transition with
    /// objects). The model hook is bypassed; `serialize` derives params.
    Object { context: Model },
    /// Terminal. Resolution is an identity fulfillment.
    Resolved { context: Option<Model> },
}

/// Resolution state for one segment within one chain.
#[derive(Clone)]
pub struct RouteInfo {
    /// Creation identity. Clones share it; diffing uses it to tell "the same
    /// info carried over" from "an equal-looking replacement".
    id: Uuid,
    name: String,
    param_names: Vec<String>,
    params: Params,
    route: Option<SharedRoute>,
    kind: RouteInfoKind,
}

impl std::fmt::Debug for RouteInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteInfo")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl RouteInfo {
    pub fn unresolved_by_param(
        name: impl Into<String>,
        param_names: Vec<String>,
        params: Params,
        route: Option<SharedRoute>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            param_names,
            params,
            route,
            kind: RouteInfoKind::Param,
        }
    }

    pub fn unresolved_by_object(
        name: impl Into<String>,
        param_names: Vec<String>,
        context: Model,
        route: Option<SharedRoute>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            param_names,
            params: Params::new(),
            route,
            kind: RouteInfoKind::Object { context },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn route(&self) -> Option<&SharedRoute> {
        self.route.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.kind, RouteInfoKind::Resolved { .. })
    }

    /// The context this info carries, regardless of variant.
    pub fn context(&self) -> Option<&Model> {
        match &self.kind {
            RouteInfoKind::Param => None,
            RouteInfoKind::Object { context } => Some(context),
            RouteInfoKind::Resolved { context } => context.as_ref(),
        }
    }

    /// Whether this variant owns a context slot at all (as opposed to never
    /// having carried one). Param infos do not; the distinction drives the
    /// context-attachment rule in `become_resolved`.
    fn has_own_context(&self) -> bool {
        !matches!(self.kind, RouteInfoKind::Param)
    }

    /// Same-info check used for no-op detection and `is_active`: true only
    /// for clones of one creation.
    pub(crate) fn is_same(&self, other: &RouteInfo) -> bool {
        self.id == other.id
    }

    /// The node-level dirty check used throughout diffing. A fresh info
    /// replaces a prior one if there is no prior, the names differ, it
    /// carries an own context with a different identity, or it carries own
    /// params that differ key-by-key.
    pub fn should_supersede(&self, other: Option<&RouteInfo>) -> bool {
        let Some(other) = other else {
            return true;
        };
        if self.name != other.name {
            return true;
        }
        match &self.kind {
            RouteInfoKind::Object { context } => !model_opt_eq(Some(context), other.context()),
            RouteInfoKind::Param => !params_match(&self.params, other.params()),
            RouteInfoKind::Resolved { context } => {
                !model_opt_eq(context.as_ref(), other.context())
                    || !params_match(&self.params, other.params())
            }
        }
    }

    /// Convert back to the params-driven unresolved form. Used when an
    /// invalidated ancestor forces already-resolved descendants to re-run
    /// their pipeline.
    pub fn get_unresolved(&self) -> RouteInfo {
        RouteInfo::unresolved_by_param(
            self.name.clone(),
            self.param_names.clone(),
            self.params.clone(),
            self.route.clone(),
        )
    }

    /// Produce the terminal `Resolved` counterpart of this info.
    ///
    /// Params come from the variant: params-driven infos keep their own,
    /// object-driven ones serialize their context. The resolved context is
    /// attached only if this info already owned a context slot or the value
    /// differs by identity from the prior one; a transient model never leaks
    /// onto a segment that never declared a context.
    pub(crate) fn become_resolved(
        &self,
        route: Option<SharedRoute>,
        resolved: Option<Model>,
    ) -> RouteInfo {
        let route = route.or_else(|| self.route.clone());
        let params = match self.kind {
            RouteInfoKind::Param => self.params.clone(),
            _ => self.serialize_model(route.as_ref(), resolved.as_ref()),
        };
        let contexts_match = model_opt_eq(self.context(), resolved.as_ref());
        let context = if self.has_own_context() || !contexts_match {
            resolved
        } else {
            None
        };
        RouteInfo {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            param_names: self.param_names.clone(),
            params,
            route,
            kind: RouteInfoKind::Resolved { context },
        }
    }

    /// The URL-space projection of this segment, for `generate`.
    pub fn serialize_params(&self) -> Params {
        match &self.kind {
            RouteInfoKind::Param | RouteInfoKind::Resolved { .. } => self.params.clone(),
            RouteInfoKind::Object { context } => {
                self.serialize_model(self.route.as_ref(), Some(context))
            }
        }
    }

    fn serialize_model(&self, route: Option<&SharedRoute>, model: Option<&Model>) -> Params {
        let Some(model) = model else {
            return Params::new();
        };
        if let Some(route) = route {
            if let Some(params) = route.serialize(model, &self.param_names) {
                return params;
            }
        }
        default_serialize(model, &self.param_names)
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    pub(crate) fn set_context(&mut self, context: Option<Model>) {
        if let RouteInfoKind::Resolved { context: slot } = &mut self.kind {
            *slot = context;
        }
    }

    pub fn snapshot(&self, query_params: &QueryParams) -> RouteInfoSnapshot {
        RouteInfoSnapshot {
            name: self.name.clone(),
            param_names: self.param_names.clone(),
            params: self.params.clone(),
            query_params: query_params.clone(),
        }
    }

    /// Run the segment's resolution pipeline to completion.
    ///
    /// The hook order is fixed: route load, abort check, `before_model`,
    /// abort check, model acquisition, abort check, `after_model` (with the
    /// model stashed on the transition first, and re-read afterwards so the
    /// hook may swap it), abort check, then `become_resolved`. An already
    /// resolved info short-circuits to an identity fulfillment that only
    /// re-stashes its context for descendants.
    pub async fn resolve(&self, transition: &Transition) -> Result<RouteInfo, TransitionError> {
        if let RouteInfoKind::Resolved { context } = &self.kind {
            transition.stash_resolved_model(&self.name, context.clone());
            return Ok(self.clone());
        }

        let hook_err =
            |e: anyhow::Error| TransitionError::hook(self.name.clone(), e);

        // 1. The route object itself may still be loading.
        let route = match &self.route {
            Some(route) => route.clone(),
            None => transition.load_route(&self.name).await?,
        };

        // 2.
        transition.check_for_abort()?;

        // 3. beforeModel; a returned pending transition is not a model.
        transition.notify_will_resolve_model(&self.name);
        let _ = route.before_model(transition).await.map_err(hook_err)?;

        // 4.
        transition.check_for_abort()?;

        // 5. Variant-dependent model acquisition.
        let model = match &self.kind {
            RouteInfoKind::Param => route
                .deserialize(&self.params, transition)
                .await
                .map_err(hook_err)?
                .into_model(),
            RouteInfoKind::Object { context } => Some(context.clone()),
            RouteInfoKind::Resolved { .. } => unreachable!("handled above"),
        };

        // 6.
        transition.check_for_abort()?;

        // 7. Stash before the hook so redirect logic inside afterModel can
        // already see this segment's model; re-read after, the hook may have
        // swapped it.
        transition.stash_resolved_model(&self.name, model.clone());
        let _ = route
            .after_model(model.as_ref(), transition)
            .await
            .map_err(hook_err)?;
        let resolved = transition.resolved_model(&self.name);
        transition.check_for_abort()?;

        debug!(segment = %self.name, has_model = resolved.is_some(), "segment resolved");

        // 8.
        Ok(self.become_resolved(Some(route), resolved))
    }
}

pub(crate) fn model_opt_eq(a: Option<&Model>, b: Option<&Model>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
