//! The invitation ledger.
//!
//! Every multi-row write runs inside one [`LedgerTransaction`]: a failure at
//! any step drops the transaction uncommitted and the store is left as it
//! was before the call.
//!
//! Re-invitation semantics:
//! - single-resource: the `(email, child)` row is refreshed in place with a
//!   new token, level, and expiry; other rows for the email are untouched.
//! - bulk: every row for the email is deleted and the batch is inserted
//!   under one new token.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use booktracker_core::traits::Clock;
use booktracker_core::types::{ChildId, UserId};
use booktracker_database::store::{InvitationStore, LedgerTransaction};
use booktracker_entity::invitation::{ChildPermission, NewPendingInvitation, PendingInvitation};
use booktracker_entity::permission::{Permission, PermissionLevel};
use booktracker_entity::user::{NewUser, User};

use crate::error::{AccessError, AccessResult};

use super::email::normalize_email;
use super::token::{generate_token, token_prefix};

/// Lifetime of every pending invitation.
pub const INVITATION_TTL_DAYS: i64 = 7;

/// Result of registering a new account through an invitation.
#[derive(Debug, Clone)]
pub struct Registration {
    /// The newly created account.
    pub user: User,
    /// Grants applied from the invitation, one per child.
    pub grants: Vec<Permission>,
}

/// Manages pending invitations and their redemption.
#[derive(Debug, Clone)]
pub struct InvitationLedger {
    /// Durable pending-invitation storage.
    store: Arc<dyn InvitationStore>,
    /// Time source for creation and expiry.
    clock: Arc<dyn Clock>,
}

impl InvitationLedger {
    /// Creates a ledger over `store`.
    pub fn new(store: Arc<dyn InvitationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Invites `email` to one child.
    ///
    /// An existing row for `(email, child_id)` is replaced in place; otherwise
    /// a new row is created. The returned row carries the fresh token.
    pub async fn create_invitation(
        &self,
        email: &str,
        child_id: ChildId,
        level: PermissionLevel,
        invited_by: UserId,
    ) -> AccessResult<PendingInvitation> {
        let email = normalize_email(email)?;
        let now = self.clock.now();
        let data = pending_row(&email, child_id, level, invited_by, generate_token(), now);

        let mut tx = self.store.begin().await?;
        tx.lock_email(&email).await?;
        ensure_unregistered(tx.as_mut(), &email).await?;

        let row = match tx.find_pending(&email, child_id).await? {
            Some(existing) => tx.refresh_pending(&existing, &data).await?,
            None => tx.insert_pending(&data).await?,
        };
        tx.commit().await?;

        info!(
            invited_by = %invited_by,
            child_id = %child_id,
            level = %level,
            token = token_prefix(&row.token),
            "Invitation created"
        );
        Ok(row)
    }

    /// Invites `email` to several children under one token.
    ///
    /// Every prior row for the email is replaced. A child named more than
    /// once keeps the last level given for it.
    pub async fn create_bulk_invitation(
        &self,
        email: &str,
        pairs: &[ChildPermission],
        invited_by: UserId,
    ) -> AccessResult<Vec<PendingInvitation>> {
        let pairs = dedupe_pairs(pairs);
        if pairs.is_empty() {
            return Err(AccessError::EmptyBulkInvitation);
        }
        let email = normalize_email(email)?;
        let now = self.clock.now();
        let token = generate_token();

        let mut tx = self.store.begin().await?;
        tx.lock_email(&email).await?;
        ensure_unregistered(tx.as_mut(), &email).await?;

        let replaced = tx.delete_pending_for_email(&email).await?;
        let mut rows = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            let data = pending_row(
                &email,
                pair.child_id,
                pair.level,
                invited_by,
                token.clone(),
                now,
            );
            rows.push(tx.insert_pending(&data).await?);
        }
        tx.commit().await?;

        info!(
            invited_by = %invited_by,
            children = rows.len(),
            replaced,
            token = token_prefix(&token),
            "Bulk invitation created"
        );
        Ok(rows)
    }

    /// Non-expired rows for `token`, oldest first.
    pub async fn pending_for_token(&self, token: &str) -> AccessResult<Vec<PendingInvitation>> {
        let rows = self
            .store
            .pending_by_token(token, self.clock.now())
            .await?;
        if rows.is_empty() {
            return Err(AccessError::InvitationNotFoundOrExpired);
        }
        Ok(rows)
    }

    /// Non-expired rows targeting `child_id`.
    pub async fn pending_for_child(&self, child_id: ChildId) -> AccessResult<Vec<PendingInvitation>> {
        Ok(self
            .store
            .pending_for_child(child_id, self.clock.now())
            .await?)
    }

    /// Converts the rows for `token` into grants for an existing principal.
    ///
    /// `user_id` must be the account registered for `email`, and must not own
    /// any invited child. Grants are upserted oldest row first and the token's
    /// rows are then deleted, all in one unit of work.
    pub async fn redeem(
        &self,
        token: &str,
        email: &str,
        user_id: UserId,
    ) -> AccessResult<Vec<Permission>> {
        let email = normalize_email(email)?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        tx.lock_email(&email).await?;
        let rows = claim(tx.as_mut(), token, &email, now).await?;

        match tx.find_user_by_email(&email).await? {
            Some(account) if account.id == user_id => {}
            Some(_) => return Err(AccessError::PrincipalAlreadyExists { email }),
            None => return Err(AccessError::PrincipalNotFound { email }),
        }
        for row in &rows {
            if tx.find_owner(row.child_id).await? == Some(user_id) {
                return Err(AccessError::OwnerGrant);
            }
        }

        let grants = apply(tx.as_mut(), token, &rows, user_id).await?;
        tx.commit().await?;

        info!(
            user_id = %user_id,
            grants = grants.len(),
            token = token_prefix(token),
            "Invitation redeemed"
        );
        Ok(grants)
    }

    /// Creates an account for the invited email and redeems `token` for it.
    ///
    /// Account creation, grant application, and row deletion share one unit
    /// of work.
    pub async fn register_with_invitation(
        &self,
        token: &str,
        new_user: &NewUser,
    ) -> AccessResult<Registration> {
        let email = normalize_email(&new_user.email)?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        tx.lock_email(&email).await?;
        let rows = claim(tx.as_mut(), token, &email, now).await?;
        ensure_unregistered(tx.as_mut(), &email).await?;

        let user = tx
            .create_user(&NewUser {
                email: email.clone(),
                ..new_user.clone()
            })
            .await?;
        let grants = apply(tx.as_mut(), token, &rows, user.id).await?;
        tx.commit().await?;

        info!(
            user_id = %user.id,
            grants = grants.len(),
            token = token_prefix(token),
            "Account registered with invitation"
        );
        Ok(Registration { user, grants })
    }

    /// Deletes every expired row. Returns the number removed.
    pub async fn sweep(&self) -> AccessResult<u64> {
        let removed = self.store.delete_expired(self.clock.now()).await?;
        info!(removed, "Expired invitations swept");
        Ok(removed)
    }
}

fn pending_row(
    email: &str,
    child_id: ChildId,
    level: PermissionLevel,
    invited_by: UserId,
    token: String,
    now: DateTime<Utc>,
) -> NewPendingInvitation {
    NewPendingInvitation {
        email: email.to_string(),
        child_id,
        level,
        invited_by,
        token,
        expires_at: now + Duration::days(INVITATION_TTL_DAYS),
        created_at: now,
    }
}

/// Collapses repeated children, keeping first position and last level.
fn dedupe_pairs(pairs: &[ChildPermission]) -> Vec<ChildPermission> {
    let mut unique: Vec<ChildPermission> = Vec::with_capacity(pairs.len());
    for pair in pairs {
        match unique.iter_mut().find(|p| p.child_id == pair.child_id) {
            Some(existing) => existing.level = pair.level,
            None => unique.push(*pair),
        }
    }
    unique
}

async fn ensure_unregistered(tx: &mut dyn LedgerTransaction, email: &str) -> AccessResult<()> {
    if tx.find_user_by_email(email).await?.is_some() {
        return Err(AccessError::PrincipalAlreadyExists {
            email: email.to_string(),
        });
    }
    Ok(())
}

/// Locks the live rows for `token` and checks they belong to `email`.
async fn claim(
    tx: &mut dyn LedgerTransaction,
    token: &str,
    email: &str,
    now: DateTime<Utc>,
) -> AccessResult<Vec<PendingInvitation>> {
    let rows = tx.claim_pending_by_token(token, now).await?;
    if rows.is_empty() {
        return Err(AccessError::InvitationNotFoundOrExpired);
    }
    if let Some(row) = rows.iter().find(|row| row.email != email) {
        warn!(
            invitation_id = %row.id,
            token = token_prefix(token),
            "Pending invitation email does not match redeeming email"
        );
        return Err(AccessError::EmailMismatch);
    }
    Ok(rows)
}

/// Upserts a grant per row, then deletes the token's rows.
async fn apply(
    tx: &mut dyn LedgerTransaction,
    token: &str,
    rows: &[PendingInvitation],
    user_id: UserId,
) -> AccessResult<Vec<Permission>> {
    let mut grants: Vec<Permission> = Vec::with_capacity(rows.len());
    for row in rows {
        let grant = tx.upsert_grant(user_id, row.child_id, row.level).await?;
        match grants.iter_mut().find(|g| g.id == grant.id) {
            Some(existing) => *existing = grant,
            None => grants.push(grant),
        }
    }
    tx.delete_pending_for_token(token).await?;
    Ok(grants)
}
