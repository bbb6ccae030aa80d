pub mod intent;
pub mod route;
pub mod route_info;
pub mod router;
pub mod state;
pub mod transition;

pub mod prelude {
    pub use crate::intent::TransitionIntent;
    pub use crate::route::{HookResult, HookValue, Route, RouterDelegate, SharedRoute};
    pub use crate::router::{Router, WeakRouter};
    pub use crate::state::TransitionState;
    pub use crate::transition::{Transition, UrlMethod};
}

pub use intent::{NamedIntent, TransitionIntent, UrlIntent};
pub use route::{HookResult, HookValue, Route, RouterDelegate, SharedRoute};
pub use route_info::RouteInfo;
pub use router::{Router, WeakRouter};
pub use state::TransitionState;
pub use transition::{Transition, UrlMethod};
