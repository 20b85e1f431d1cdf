//! Permission resolver.
//!
//! Resolution order:
//! 1. Existence: an unknown child is `ResourceNotFound`, never a deny.
//! 2. Owner check: the owner holds every level.
//! 3. Grant: the stored level must satisfy the requested one.
//! 4. Otherwise denied. A missing grant is not an error.

use std::sync::Arc;

use tracing::debug;

use booktracker_core::types::{ChildId, UserId};
use booktracker_database::store::GrantStore;
use booktracker_entity::permission::PermissionLevel;

use crate::error::{AccessError, AccessResult};

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    /// The principal owns the child.
    Owner,
    /// A stored grant satisfied the requested level.
    Grant,
    /// No applicable rule.
    Denied,
}

/// Outcome of resolving one `(principal, child, level)` check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Whether access is granted.
    pub allowed: bool,
    /// Which rule produced the decision.
    pub source: DecisionSource,
}

/// Read-only decision function over the grant store.
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    /// Grant and ownership lookups.
    grants: Arc<dyn GrantStore>,
}

impl PermissionResolver {
    /// Creates a resolver reading from `grants`.
    pub fn new(grants: Arc<dyn GrantStore>) -> Self {
        Self { grants }
    }

    /// Resolves a check, reporting which rule decided it.
    pub async fn resolve(
        &self,
        user_id: UserId,
        child_id: ChildId,
        level: PermissionLevel,
    ) -> AccessResult<Resolution> {
        let owner_id = self
            .grants
            .find_owner(child_id)
            .await?
            .ok_or(AccessError::ResourceNotFound { child_id })?;

        if owner_id == user_id {
            return Ok(Resolution {
                allowed: true,
                source: DecisionSource::Owner,
            });
        }

        let grant = self.grants.find_grant(user_id, child_id).await?;
        let resolution = match grant {
            Some(grant) if grant.allows(level) => Resolution {
                allowed: true,
                source: DecisionSource::Grant,
            },
            _ => Resolution {
                allowed: false,
                source: DecisionSource::Denied,
            },
        };

        debug!(
            user_id = %user_id,
            child_id = %child_id,
            level = %level,
            source = ?resolution.source,
            "Permission resolved"
        );
        Ok(resolution)
    }

    /// Whether `user_id` may act on `child_id` at `level`.
    pub async fn check(
        &self,
        user_id: UserId,
        child_id: ChildId,
        level: PermissionLevel,
    ) -> AccessResult<bool> {
        Ok(self.resolve(user_id, child_id, level).await?.allowed)
    }
}
