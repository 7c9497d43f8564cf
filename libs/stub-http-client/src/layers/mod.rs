//! Tower layers composed into the client stack.
//!
//! - [`UserAgentLayer`] - sets a default User-Agent unless the caller set one
//! - [`ConnectionLimitLayer`] - caps busy connections until response bodies finish
//! - [`TraceLayer`] - one `outgoing_http` span per request, tagged with the pool

mod connection_limit;
mod trace;
mod user_agent;

pub use connection_limit::{ConnectionLimitLayer, ConnectionLimitService, PermitBody};
pub use trace::{TraceLayer, TraceService};
pub use user_agent::{UserAgentLayer, UserAgentService};
