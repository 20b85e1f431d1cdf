//! # booktracker-auth
//!
//! Access-control decisions for Booktracker.
//!
//! ## Modules
//!
//! - `acl`: permission resolution and the per-request permission cache
//! - `invitation`: deferred grants addressed by email and token
//! - `error`: the access-control error taxonomy

pub mod acl;
pub mod error;
pub mod invitation;

pub use acl::{PermissionResolver, ScopedPermissionCache};
pub use error::{AccessError, AccessResult};
pub use invitation::{InvitationLedger, Registration};
