//! Cookie tracking and cross-site leak detection.
//!
//! - `markers` - query-parameter protocol and hostname extraction
//! - `leak_store` - session to leaky-host bookkeeping
//! - `pending` - request id to URL index with TTL and capacity bounds
//! - `inspector` / `injector` - request and response hook logic
//! - `hooks` - the [`InterceptHooks`](crate::transport::InterceptHooks) glue

pub mod diagnostics;
mod hooks;
mod injector;
mod inspector;
pub mod leak_store;
pub mod markers;
pub mod pending;

pub use hooks::TrackingHooks;
pub use injector::{tracking_set_cookie, ResponseInjector, TRACKING_COOKIE_MAX_AGE_SECS};
pub use inspector::{ReadOutcome, RequestInspector};
pub use leak_store::SessionLeakStore;
pub use markers::TrackingMarkers;
pub use pending::{spawn_sweeper, PendingRequestIndex};
