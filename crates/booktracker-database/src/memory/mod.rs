//! In-memory implementation of every storage trait.
//!
//! Used by tests and local tooling. A [`MemoryTransaction`] holds the table
//! lock for its whole lifetime and works on a staged copy, so concurrent
//! units of work are serialized and an uncommitted one leaves no trace.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use booktracker_core::error::AppError;
use booktracker_core::result::AppResult;
use booktracker_core::traits::{Clock, SystemClock};
use booktracker_core::types::{ChildId, InvitationId, PermissionId, UserId};
use booktracker_entity::child::{Child, NewChild};
use booktracker_entity::invitation::{NewPendingInvitation, PendingInvitation};
use booktracker_entity::permission::{Permission, PermissionLevel};
use booktracker_entity::user::{NewUser, User};

use crate::store::{ChildStore, GrantStore, InvitationStore, LedgerTransaction, UserDirectory};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: Vec<User>,
    children: HashMap<ChildId, Child>,
    permissions: Vec<Permission>,
    invitations: Vec<PendingInvitation>,
}

impl Tables {
    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }

    fn insert_user(&mut self, data: &NewUser, now: DateTime<Utc>) -> AppResult<User> {
        if self.user_by_email(&data.email).is_some() {
            return Err(AppError::conflict(format!(
                "User with email {} already exists",
                data.email
            )));
        }
        let user = User {
            id: UserId::new(),
            email: data.email.clone(),
            first_name: data.first_name.clone(),
            last_name: data.last_name.clone(),
            password_hash: data.password_hash.clone(),
            created_at: now,
        };
        self.users.push(user.clone());
        Ok(user)
    }

    fn upsert_grant(
        &mut self,
        user_id: UserId,
        child_id: ChildId,
        level: PermissionLevel,
        now: DateTime<Utc>,
    ) -> AppResult<Permission> {
        if !self.children.contains_key(&child_id) {
            return Err(AppError::database(format!(
                "Foreign key violation: child {child_id} does not exist"
            )));
        }
        if !self.users.iter().any(|u| u.id == user_id) {
            return Err(AppError::database(format!(
                "Foreign key violation: user {user_id} does not exist"
            )));
        }

        if let Some(existing) = self
            .permissions
            .iter_mut()
            .find(|p| p.user_id == user_id && p.child_id == child_id)
        {
            existing.level = level;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let permission = Permission {
            id: PermissionId::new(),
            user_id,
            child_id,
            level,
            created_at: now,
            updated_at: now,
        };
        self.permissions.push(permission.clone());
        Ok(permission)
    }

    fn live_invitations(
        &self,
        now: DateTime<Utc>,
        filter: impl Fn(&PendingInvitation) -> bool,
    ) -> Vec<PendingInvitation> {
        let mut rows: Vec<PendingInvitation> = self
            .invitations
            .iter()
            .filter(|i| !i.is_expired_at(now) && filter(i))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        rows
    }
}

#[derive(Debug)]
struct Inner {
    tables: Arc<Mutex<Tables>>,
    clock: Arc<dyn Clock>,
    grant_reads: AtomicU64,
    pending_insert_fault: AtomicU64,
    grant_upsert_fault: AtomicU64,
}

impl Inner {
    fn record_grant_read(&self) {
        self.grant_reads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Decrement an armed fault countdown; returns `true` on the call that trips it.
fn trip(fault: &AtomicU64) -> bool {
    matches!(
        fault.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)),
        Ok(1)
    )
}

/// Shared in-memory store.
///
/// Cloning is cheap and every clone sees the same tables.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store stamping rows with the system time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store stamping rows with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Arc::new(Mutex::new(Tables::default())),
                clock,
                grant_reads: AtomicU64::new(0),
                pending_insert_fault: AtomicU64::new(0),
                grant_upsert_fault: AtomicU64::new(0),
            }),
        }
    }

    /// Number of grant-store reads served so far.
    pub fn grant_reads(&self) -> u64 {
        self.inner.grant_reads.load(Ordering::SeqCst)
    }

    /// Make the `n`-th pending-invitation insert from now on fail once.
    pub fn fail_pending_insert_on(&self, n: u64) {
        self.inner.pending_insert_fault.store(n, Ordering::SeqCst);
    }

    /// Make the `n`-th grant upsert from now on fail once.
    pub fn fail_grant_upsert_on(&self, n: u64) {
        self.inner.grant_upsert_fault.store(n, Ordering::SeqCst);
    }

    /// Every pending row, expired or not, for `email`.
    pub async fn all_pending_for_email(&self, email: &str) -> Vec<PendingInvitation> {
        let tables = self.inner.tables.lock().await;
        tables
            .invitations
            .iter()
            .filter(|i| i.email == email)
            .cloned()
            .collect()
    }

    /// Every grant held by `user_id`.
    pub async fn grants_for_user(&self, user_id: UserId) -> Vec<Permission> {
        let tables = self.inner.tables.lock().await;
        tables
            .permissions
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect()
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GrantStore for MemoryStore {
    async fn find_owner(&self, child_id: ChildId) -> AppResult<Option<UserId>> {
        self.inner.record_grant_read();
        let tables = self.inner.tables.lock().await;
        Ok(tables.children.get(&child_id).map(|c| c.owner_id))
    }

    async fn find_grant(
        &self,
        user_id: UserId,
        child_id: ChildId,
    ) -> AppResult<Option<Permission>> {
        self.inner.record_grant_read();
        let tables = self.inner.tables.lock().await;
        Ok(tables
            .permissions
            .iter()
            .find(|p| p.user_id == user_id && p.child_id == child_id)
            .cloned())
    }

    async fn find_grant_by_id(&self, id: PermissionId) -> AppResult<Option<Permission>> {
        self.inner.record_grant_read();
        let tables = self.inner.tables.lock().await;
        Ok(tables.permissions.iter().find(|p| p.id == id).cloned())
    }

    async fn grants_for_child(&self, child_id: ChildId) -> AppResult<Vec<Permission>> {
        self.inner.record_grant_read();
        let tables = self.inner.tables.lock().await;
        Ok(tables
            .permissions
            .iter()
            .filter(|p| p.child_id == child_id)
            .cloned()
            .collect())
    }

    async fn upsert_grant(
        &self,
        user_id: UserId,
        child_id: ChildId,
        level: PermissionLevel,
    ) -> AppResult<Permission> {
        if trip(&self.inner.grant_upsert_fault) {
            return Err(AppError::database("Injected fault on grant upsert"));
        }
        let now = self.now();
        let mut tables = self.inner.tables.lock().await;
        tables.upsert_grant(user_id, child_id, level, now)
    }

    async fn delete_grant(&self, id: PermissionId) -> AppResult<bool> {
        let mut tables = self.inner.tables.lock().await;
        let before = tables.permissions.len();
        tables.permissions.retain(|p| p.id != id);
        Ok(tables.permissions.len() < before)
    }

    async fn delete_grant_for(&self, user_id: UserId, child_id: ChildId) -> AppResult<bool> {
        let mut tables = self.inner.tables.lock().await;
        let before = tables.permissions.len();
        tables
            .permissions
            .retain(|p| !(p.user_id == user_id && p.child_id == child_id));
        Ok(tables.permissions.len() < before)
    }
}

#[async_trait]
impl ChildStore for MemoryStore {
    async fn create_child(&self, data: &NewChild) -> AppResult<Child> {
        let now = self.now();
        let mut tables = self.inner.tables.lock().await;
        if !tables.users.iter().any(|u| u.id == data.owner_id) {
            return Err(AppError::database(format!(
                "Foreign key violation: user {} does not exist",
                data.owner_id
            )));
        }
        let child = Child {
            id: ChildId::new(),
            owner_id: data.owner_id,
            name: data.name.clone(),
            grade: data.grade.clone(),
            created_at: now,
        };
        tables.children.insert(child.id, child.clone());
        Ok(child)
    }

    async fn find_child(&self, id: ChildId) -> AppResult<Option<Child>> {
        let tables = self.inner.tables.lock().await;
        Ok(tables.children.get(&id).cloned())
    }

    async fn children_accessible_by(&self, user_id: UserId) -> AppResult<Vec<Child>> {
        let tables = self.inner.tables.lock().await;
        let mut children: Vec<Child> = tables
            .children
            .values()
            .filter(|c| {
                c.owner_id == user_id
                    || tables
                        .permissions
                        .iter()
                        .any(|p| p.user_id == user_id && p.child_id == c.id)
            })
            .cloned()
            .collect();
        children.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(children)
    }

    async fn delete_child(&self, id: ChildId) -> AppResult<bool> {
        let mut tables = self.inner.tables.lock().await;
        if tables.children.remove(&id).is_none() {
            return Ok(false);
        }
        tables.permissions.retain(|p| p.child_id != id);
        tables.invitations.retain(|i| i.child_id != id);
        Ok(true)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, id: UserId) -> AppResult<Option<User>> {
        let tables = self.inner.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let tables = self.inner.tables.lock().await;
        Ok(tables.user_by_email(email).cloned())
    }

    async fn create_user(&self, data: &NewUser) -> AppResult<User> {
        let now = self.now();
        let mut tables = self.inner.tables.lock().await;
        tables.insert_user(data, now)
    }
}

#[async_trait]
impl InvitationStore for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTransaction>> {
        let guard = self.inner.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction {
            inner: self.inner.clone(),
            guard: Some(guard),
            staged,
        }))
    }

    async fn pending_by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PendingInvitation>> {
        let tables = self.inner.tables.lock().await;
        Ok(tables.live_invitations(now, |i| i.token == token))
    }

    async fn pending_for_child(
        &self,
        child_id: ChildId,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PendingInvitation>> {
        let tables = self.inner.tables.lock().await;
        Ok(tables.live_invitations(now, |i| i.child_id == child_id))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut tables = self.inner.tables.lock().await;
        let before = tables.invitations.len();
        tables.invitations.retain(|i| !i.is_expired_at(now));
        Ok((before - tables.invitations.len()) as u64)
    }
}

/// Unit of work over a [`MemoryStore`].
///
/// Holds the store lock until committed or dropped.
#[derive(Debug)]
pub struct MemoryTransaction {
    inner: Arc<Inner>,
    guard: Option<OwnedMutexGuard<Tables>>,
    staged: Tables,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> AppResult<()> {
        if self.guard.is_none() {
            return Err(AppError::internal("Transaction already committed"));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    async fn lock_email(&mut self, _email: &str) -> AppResult<()> {
        // The whole store is already locked for the transaction.
        self.ensure_open()
    }

    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>> {
        self.ensure_open()?;
        Ok(self.staged.user_by_email(email).cloned())
    }

    async fn create_user(&mut self, data: &NewUser) -> AppResult<User> {
        self.ensure_open()?;
        let now = self.inner.clock.now();
        self.staged.insert_user(data, now)
    }

    async fn find_owner(&mut self, child_id: ChildId) -> AppResult<Option<UserId>> {
        self.ensure_open()?;
        Ok(self.staged.children.get(&child_id).map(|c| c.owner_id))
    }

    async fn find_pending(
        &mut self,
        email: &str,
        child_id: ChildId,
    ) -> AppResult<Option<PendingInvitation>> {
        self.ensure_open()?;
        Ok(self
            .staged
            .invitations
            .iter()
            .filter(|i| i.email == email && i.child_id == child_id)
            .max_by_key(|i| i.created_at)
            .cloned())
    }

    async fn insert_pending(
        &mut self,
        data: &NewPendingInvitation,
    ) -> AppResult<PendingInvitation> {
        self.ensure_open()?;
        if trip(&self.inner.pending_insert_fault) {
            return Err(AppError::database("Injected fault on invitation insert"));
        }
        if !self.staged.children.contains_key(&data.child_id) {
            return Err(AppError::database(format!(
                "Foreign key violation: child {} does not exist",
                data.child_id
            )));
        }
        let row = PendingInvitation {
            id: InvitationId::new(),
            email: data.email.clone(),
            child_id: data.child_id,
            level: data.level,
            invited_by: data.invited_by,
            token: data.token.clone(),
            expires_at: data.expires_at,
            created_at: data.created_at,
        };
        self.staged.invitations.push(row.clone());
        Ok(row)
    }

    async fn refresh_pending(
        &mut self,
        existing: &PendingInvitation,
        data: &NewPendingInvitation,
    ) -> AppResult<PendingInvitation> {
        self.ensure_open()?;
        let row = self
            .staged
            .invitations
            .iter_mut()
            .find(|i| i.id == existing.id)
            .ok_or_else(|| AppError::not_found(format!("Invitation {} not found", existing.id)))?;
        row.level = data.level;
        row.invited_by = data.invited_by;
        row.token = data.token.clone();
        row.expires_at = data.expires_at;
        row.created_at = data.created_at;
        Ok(row.clone())
    }

    async fn delete_pending_for_email(&mut self, email: &str) -> AppResult<u64> {
        self.ensure_open()?;
        let before = self.staged.invitations.len();
        self.staged.invitations.retain(|i| i.email != email);
        Ok((before - self.staged.invitations.len()) as u64)
    }

    async fn claim_pending_by_token(
        &mut self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PendingInvitation>> {
        self.ensure_open()?;
        Ok(self.staged.live_invitations(now, |i| i.token == token))
    }

    async fn delete_pending_for_token(&mut self, token: &str) -> AppResult<u64> {
        self.ensure_open()?;
        let before = self.staged.invitations.len();
        self.staged.invitations.retain(|i| i.token != token);
        Ok((before - self.staged.invitations.len()) as u64)
    }

    async fn upsert_grant(
        &mut self,
        user_id: UserId,
        child_id: ChildId,
        level: PermissionLevel,
    ) -> AppResult<Permission> {
        self.ensure_open()?;
        if trip(&self.inner.grant_upsert_fault) {
            return Err(AppError::database("Injected fault on grant upsert"));
        }
        let now = self.inner.clock.now();
        self.staged.upsert_grant(user_id, child_id, level, now)
    }

    async fn commit(&mut self) -> AppResult<()> {
        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| AppError::internal("Transaction already committed"))?;
        *guard = std::mem::take(&mut self.staged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booktracker_core::error::ErrorKind;
    use chrono::Duration;

    async fn seed(store: &MemoryStore) -> (User, Child) {
        let owner = store
            .create_user(&NewUser {
                email: "owner@example.com".to_string(),
                first_name: "Olive".to_string(),
                last_name: "Owner".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        let child = store
            .create_child(&NewChild {
                owner_id: owner.id,
                name: "Sam".to_string(),
                grade: "3".to_string(),
            })
            .await
            .unwrap();
        (owner, child)
    }

    fn pending(
        email: &str,
        child_id: ChildId,
        invited_by: UserId,
        token: &str,
    ) -> NewPendingInvitation {
        let now = Utc::now();
        NewPendingInvitation {
            email: email.to_string(),
            child_id,
            level: PermissionLevel::View,
            invited_by,
            token: token.to_string(),
            expires_at: now + Duration::days(7),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_rolls_back() {
        let store = MemoryStore::new();
        let (owner, child) = seed(&store).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_pending(&pending("a@x.com", child.id, owner.id, "t1"))
                .await
                .unwrap();
        }

        assert!(store.all_pending_for_email("a@x.com").await.is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let (owner, child) = seed(&store).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_pending(&pending("a@x.com", child.id, owner.id, "t1"))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        let rows = store.pending_by_token("t1", Utc::now()).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_twice_is_an_error() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_pending_insert_fault_trips_once() {
        let store = MemoryStore::new();
        let (owner, child) = seed(&store).await;
        store.fail_pending_insert_on(2);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_pending(&pending("a@x.com", child.id, owner.id, "t")).await.is_ok());
        let err = tx
            .insert_pending(&pending("b@x.com", child.id, owner.id, "t"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Database);
        assert!(tx.insert_pending(&pending("c@x.com", child.id, owner.id, "t")).await.is_ok());
    }

    #[tokio::test]
    async fn test_grant_upsert_replaces_level() {
        let store = MemoryStore::new();
        let (_, child) = seed(&store).await;
        let reader = store
            .create_user(&NewUser {
                email: "reader@example.com".to_string(),
                first_name: "R".to_string(),
                last_name: "R".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();

        let first = store
            .upsert_grant(reader.id, child.id, PermissionLevel::View)
            .await
            .unwrap();
        let second = store
            .upsert_grant(reader.id, child.id, PermissionLevel::Edit)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let grants = store.grants_for_child(child.id).await.unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].level, PermissionLevel::Edit);
    }

    #[tokio::test]
    async fn test_grant_reads_are_counted() {
        let store = MemoryStore::new();
        let (owner, child) = seed(&store).await;
        assert_eq!(store.grant_reads(), 0);
        store.find_owner(child.id).await.unwrap();
        store.find_grant(owner.id, child.id).await.unwrap();
        assert_eq!(store.grant_reads(), 2);
    }

    #[tokio::test]
    async fn test_delete_child_cascades() {
        let store = MemoryStore::new();
        let (owner, child) = seed(&store).await;
        let reader = store
            .create_user(&NewUser {
                email: "reader@example.com".to_string(),
                first_name: "R".to_string(),
                last_name: "R".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        store
            .upsert_grant(reader.id, child.id, PermissionLevel::View)
            .await
            .unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_pending(&pending("a@x.com", child.id, owner.id, "t"))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        assert!(store.delete_child(child.id).await.unwrap());
        assert!(store.grants_for_user(reader.id).await.is_empty());
        assert!(store.all_pending_for_email("a@x.com").await.is_empty());
        assert!(!store.delete_child(child.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        seed(&store).await;
        let err = store
            .create_user(&NewUser {
                email: "OWNER@example.com".to_string(),
                first_name: "O".to_string(),
                last_name: "O".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }
}
