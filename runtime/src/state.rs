//! TransitionState - Immutable Destination Snapshots
//!
//! A `TransitionState` is a chain of `RouteInfo`s (root to leaf) plus the
//! query params for the whole chain. The router keeps one finalized state;
//! each in-flight transition drives a candidate state toward full resolution
//! and hands it back only on success.

use crate::route_info::RouteInfo;
use crate::transition::Transition;
use tracing::debug;
use waypoint_core::{QueryParams, RouteInfoSnapshot, TransitionError};

#[derive(Clone, Default)]
pub struct TransitionState {
    pub route_infos: Vec<RouteInfo>,
    pub query_params: QueryParams,
}

/// What a failed resolution leaves behind: the error and the partially
/// resolved state (the segments that did resolve stay resolved so a retry
/// can skip them).
pub(crate) struct ResolveFailure {
    pub error: TransitionError,
    pub state: TransitionState,
}

impl std::fmt::Debug for TransitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionState")
            .field("chain", &self.route_infos.iter().map(|i| i.name()).collect::<Vec<_>>())
            .field("query_params", &self.query_params)
            .finish()
    }
}

impl TransitionState {
    pub fn leaf_name(&self) -> Option<&str> {
        self.route_infos.last().map(|info| info.name())
    }

    pub fn snapshots(&self) -> Vec<RouteInfoSnapshot> {
        self.route_infos
            .iter()
            .map(|info| info.snapshot(&self.query_params))
            .collect()
    }

    /// Resolve every segment in order, root to leaf.
    ///
    /// Each segment is checked for abort before it runs, and each freshly
    /// resolved segment gets its `redirect` hook fired before the next
    /// segment starts (a redirect that starts a new transition aborts this
    /// one, which the next check observes). A segment already resolved when
    /// the pass reaches it is skipped wholesale, so resolved prefixes never
    /// re-run their hooks.
    pub(crate) async fn resolve(
        mut self,
        transition: &Transition,
    ) -> Result<TransitionState, ResolveFailure> {
        let mut index = 0;
        while index < self.route_infos.len() {
            transition.set_resolve_index(index);
            if let Err(error) = transition.check_for_abort() {
                return Err(self.failure(error));
            }

            let info = &self.route_infos[index];
            let was_already_resolved = info.is_resolved();
            debug!(segment = %info.name(), index, "resolving segment");

            match info.resolve(transition).await {
                Ok(resolved) => {
                    if !was_already_resolved {
                        if let Some(route) = resolved.route() {
                            route.redirect(resolved.context(), transition).await;
                        }
                    }
                    self.route_infos[index] = resolved;
                    index += 1;
                }
                Err(error) => return Err(self.failure(error)),
            }
        }

        // A leaf redirect may have superseded us after the loop body's last
        // abort check.
        if let Err(error) = transition.check_for_abort() {
            return Err(self.failure(error));
        }

        Ok(self)
    }

    fn failure(self, error: TransitionError) -> ResolveFailure {
        ResolveFailure { error, state: self }
    }
}
