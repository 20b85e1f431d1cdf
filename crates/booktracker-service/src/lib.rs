//! # booktracker-service
//!
//! Access-control use cases for Booktracker. Request handlers build a
//! [`RequestContext`] per inbound operation with
//! [`AccessService::begin_request`] and pass it to every call that needs
//! an authorization decision.
//!
//! Services follow constructor injection: all stores are provided at
//! construction time via `Arc` references.

pub mod access;
pub mod context;

pub use access::{AccessService, AccessStores, InviteOutcome};
pub use context::RequestContext;
