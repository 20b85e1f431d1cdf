//! Grant entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use booktracker_core::types::{ChildId, PermissionId, UserId};

use super::level::PermissionLevel;

/// A durable grant of `level` on a child to a non-owner user.
///
/// At most one grant exists per `(user_id, child_id)`; re-granting replaces
/// the level. Owners never have a grant row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Permission {
    /// Unique grant identifier.
    pub id: PermissionId,
    /// The user holding the grant.
    pub user_id: UserId,
    /// The child the grant applies to.
    pub child_id: ChildId,
    /// The granted level.
    pub level: PermissionLevel,
    /// When the grant was first created.
    pub created_at: DateTime<Utc>,
    /// When the level was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    /// Whether this grant satisfies a check for `required`.
    pub fn allows(&self, required: PermissionLevel) -> bool {
        self.level.satisfies(required)
    }
}
