//! Child entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use booktracker_core::types::{ChildId, UserId};

/// A child whose reading records are the protected resource.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Child {
    /// Unique child identifier.
    pub id: ChildId,
    /// The single user holding every permission implicitly.
    pub owner_id: UserId,
    /// Display name.
    pub name: String,
    /// School grade.
    pub grade: String,
    /// When the child was created.
    pub created_at: DateTime<Utc>,
}

impl Child {
    /// Check if `user_id` owns this child.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }
}

/// Data required to create a child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChild {
    /// Owning user.
    pub owner_id: UserId,
    /// Display name.
    pub name: String,
    /// School grade.
    pub grade: String,
}
