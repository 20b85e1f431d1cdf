//! Storage traits consumed by the access-control layer.
//!
//! Each trait is implemented twice: by the PostgreSQL repositories in
//! [`crate::repositories`] and by [`crate::memory::MemoryStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use booktracker_core::result::AppResult;
use booktracker_core::types::{ChildId, PermissionId, UserId};
use booktracker_entity::child::{Child, NewChild};
use booktracker_entity::invitation::{NewPendingInvitation, PendingInvitation};
use booktracker_entity::permission::{Permission, PermissionLevel};
use booktracker_entity::user::{NewUser, User};

/// Durable grants and resource ownership.
#[async_trait]
pub trait GrantStore: Send + Sync + std::fmt::Debug + 'static {
    /// Owner of a child, or `None` if the child does not exist.
    async fn find_owner(&self, child_id: ChildId) -> AppResult<Option<UserId>>;

    /// The grant held by `user_id` on `child_id`, if any.
    async fn find_grant(&self, user_id: UserId, child_id: ChildId)
    -> AppResult<Option<Permission>>;

    /// A grant by its identifier.
    async fn find_grant_by_id(&self, id: PermissionId) -> AppResult<Option<Permission>>;

    /// All grants on a child, oldest first.
    async fn grants_for_child(&self, child_id: ChildId) -> AppResult<Vec<Permission>>;

    /// Create the grant, or replace the level of the existing one.
    async fn upsert_grant(
        &self,
        user_id: UserId,
        child_id: ChildId,
        level: PermissionLevel,
    ) -> AppResult<Permission>;

    /// Delete a grant by id. Returns `true` if a row was removed.
    async fn delete_grant(&self, id: PermissionId) -> AppResult<bool>;

    /// Delete the grant for a `(user, child)` pair. Returns `true` if removed.
    async fn delete_grant_for(&self, user_id: UserId, child_id: ChildId) -> AppResult<bool>;
}

/// Protected resources.
#[async_trait]
pub trait ChildStore: Send + Sync + std::fmt::Debug + 'static {
    /// Create a child.
    async fn create_child(&self, data: &NewChild) -> AppResult<Child>;

    /// Find a child by id.
    async fn find_child(&self, id: ChildId) -> AppResult<Option<Child>>;

    /// Children owned by `user_id` or granted to them.
    async fn children_accessible_by(&self, user_id: UserId) -> AppResult<Vec<Child>>;

    /// Delete a child, cascading to its grants and pending invitations.
    async fn delete_child(&self, id: ChildId) -> AppResult<bool>;
}

/// Read access to registered accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync + std::fmt::Debug + 'static {
    /// Find a user by id.
    async fn find_user(&self, id: UserId) -> AppResult<Option<User>>;

    /// Find a user by (normalized) email.
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Create a user outside of any invitation flow.
    async fn create_user(&self, data: &NewUser) -> AppResult<User>;
}

/// Pending invitations.
///
/// Multi-row writes go through [`InvitationStore::begin`]; the remaining
/// methods are single-statement reads and the expiry sweep.
#[async_trait]
pub trait InvitationStore: Send + Sync + std::fmt::Debug + 'static {
    /// Open a unit of work over invitations, grants, and users.
    async fn begin(&self) -> AppResult<Box<dyn LedgerTransaction>>;

    /// Rows for `token` that have not expired as of `now`.
    async fn pending_by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PendingInvitation>>;

    /// Rows for `child_id` that have not expired as of `now`.
    async fn pending_for_child(
        &self,
        child_id: ChildId,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PendingInvitation>>;

    /// Delete every row whose expiry is at or before `now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

/// An open unit of work.
///
/// Writes become visible to other callers only after [`commit`]. Dropping
/// the transaction without committing discards every write made through it.
///
/// [`commit`]: LedgerTransaction::commit
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Serialize invitation writes for `email` against concurrent callers.
    async fn lock_email(&mut self, email: &str) -> AppResult<()>;

    /// Find a user by email inside the transaction.
    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>>;

    /// Create a user inside the transaction.
    async fn create_user(&mut self, data: &NewUser) -> AppResult<User>;

    /// The owner of `child_id` inside the transaction.
    async fn find_owner(&mut self, child_id: ChildId) -> AppResult<Option<UserId>>;

    /// The pending row for `(email, child_id)`, expired or not.
    async fn find_pending(
        &mut self,
        email: &str,
        child_id: ChildId,
    ) -> AppResult<Option<PendingInvitation>>;

    /// Insert a pending row.
    async fn insert_pending(&mut self, data: &NewPendingInvitation)
    -> AppResult<PendingInvitation>;

    /// Overwrite an existing row's level, inviter, token, and timestamps.
    async fn refresh_pending(
        &mut self,
        existing: &PendingInvitation,
        data: &NewPendingInvitation,
    ) -> AppResult<PendingInvitation>;

    /// Delete every pending row for `email`.
    async fn delete_pending_for_email(&mut self, email: &str) -> AppResult<u64>;

    /// Lock and return the non-expired rows for `token`, oldest first.
    async fn claim_pending_by_token(
        &mut self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PendingInvitation>>;

    /// Delete every pending row for `token`.
    async fn delete_pending_for_token(&mut self, token: &str) -> AppResult<u64>;

    /// Create the grant, or replace the level of the existing one.
    async fn upsert_grant(
        &mut self,
        user_id: UserId,
        child_id: ChildId,
        level: PermissionLevel,
    ) -> AppResult<Permission>;

    /// Publish every write made through this transaction.
    async fn commit(&mut self) -> AppResult<()>;
}
