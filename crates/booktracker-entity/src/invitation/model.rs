//! Pending invitation entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use booktracker_core::types::{ChildId, InvitationId, UserId};

use crate::permission::PermissionLevel;

/// A deferred grant addressed to an email that has no account yet.
///
/// Rows created by one bulk invitation share a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PendingInvitation {
    /// Unique row identifier.
    pub id: InvitationId,
    /// Normalized invitee email.
    pub email: String,
    /// Child the grant will apply to.
    pub child_id: ChildId,
    /// Level the grant will carry.
    pub level: PermissionLevel,
    /// The inviting user.
    pub invited_by: UserId,
    /// Bearer token identifying this row's invitation batch.
    #[serde(skip_serializing)]
    pub token: String,
    /// Always creation time + 7 days.
    pub expires_at: DateTime<Utc>,
    /// When the row was created or last refreshed.
    pub created_at: DateTime<Utc>,
}

impl PendingInvitation {
    /// Whether the invitation has expired as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Data required to insert a pending invitation row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPendingInvitation {
    /// Normalized invitee email.
    pub email: String,
    /// Target child.
    pub child_id: ChildId,
    /// Level to grant.
    pub level: PermissionLevel,
    /// The inviting user.
    pub invited_by: UserId,
    /// Shared batch token.
    pub token: String,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

/// One `(child, level)` pair of a bulk invitation or bulk share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildPermission {
    /// Target child.
    pub child_id: ChildId,
    /// Level to grant.
    pub level: PermissionLevel,
}

impl ChildPermission {
    /// Create a new pair.
    pub fn new(child_id: ChildId, level: PermissionLevel) -> Self {
        Self { child_id, level }
    }
}
