//! Request context carrying the acting principal and its permission cache.

use std::sync::Arc;

use booktracker_auth::acl::ScopedPermissionCache;
use booktracker_core::types::UserId;

/// Context for one inbound operation.
///
/// Built by [`AccessService::begin_request`](crate::AccessService::begin_request)
/// and passed into service methods so that every operation knows *who* is
/// acting. The permission cache lives exactly as long as the context; clones
/// share it, so concurrent sub-operations of one request reuse decisions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The acting user's ID.
    pub user_id: UserId,
    /// Decisions made so far in this request.
    permissions: Arc<ScopedPermissionCache>,
}

impl RequestContext {
    /// Creates a context owning a fresh permission cache.
    pub fn new(user_id: UserId, permissions: ScopedPermissionCache) -> Self {
        Self {
            user_id,
            permissions: Arc::new(permissions),
        }
    }

    /// The request's permission cache.
    pub fn permissions(&self) -> &ScopedPermissionCache {
        &self.permissions
    }
}
