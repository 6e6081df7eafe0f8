//! Request routing between the local cache and the source site

mod context;
mod decision;

pub use context::{scope_names, DateScope, RequestContext, ResolvedDates, Scope};
pub use decision::{
    decide, CentreData, DataSource, RequestRouter, RouteAction, RouteResponse, RouteStatus,
};
