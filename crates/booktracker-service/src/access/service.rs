//! Authorization, sharing, and invitation use cases.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::info;

use booktracker_auth::acl::{PermissionResolver, ScopedPermissionCache};
use booktracker_auth::error::AccessError;
use booktracker_auth::invitation::{InvitationLedger, Registration, normalize_email};
use booktracker_core::config::AccessConfig;
use booktracker_core::error::AppError;
use booktracker_core::result::AppResult;
use booktracker_core::traits::Clock;
use booktracker_core::types::{ChildId, PermissionId, UserId};
use booktracker_entity::child::Child;
use booktracker_entity::invitation::{ChildPermission, PendingInvitation};
use booktracker_entity::permission::{Permission, PermissionLevel};
use booktracker_entity::user::NewUser;

use crate::context::RequestContext;

use super::outcome::InviteOutcome;
use super::stores::AccessStores;

/// Facade exposed to request handlers.
#[derive(Debug, Clone)]
pub struct AccessService {
    /// Backing stores.
    stores: AccessStores,
    /// Decision function handed to each request's cache.
    resolver: PermissionResolver,
    /// Pending invitations.
    ledger: InvitationLedger,
    /// Lifetime bound for cached decisions.
    cache_ttl: Duration,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl AccessService {
    /// Creates the service.
    pub fn new(stores: AccessStores, config: &AccessConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            resolver: PermissionResolver::new(stores.grants.clone()),
            ledger: InvitationLedger::new(stores.invitations.clone(), clock.clone()),
            cache_ttl: config.permission_cache_ttl(),
            stores,
            clock,
        }
    }

    /// Starts a request for `user_id` with its own, empty permission cache.
    pub fn begin_request(&self, user_id: UserId) -> RequestContext {
        let cache = ScopedPermissionCache::new(
            self.resolver.clone(),
            self.cache_ttl,
            self.clock.clone(),
        );
        RequestContext::new(user_id, cache)
    }

    /// Whether the acting user may act on `child_id` at `level`.
    pub async fn authorize(
        &self,
        ctx: &RequestContext,
        child_id: ChildId,
        level: PermissionLevel,
    ) -> AppResult<bool> {
        Ok(ctx
            .permissions()
            .get_or_check(ctx.user_id, child_id, level)
            .await?)
    }

    /// Fails with `Forbidden` unless the acting user holds `level` on `child_id`.
    pub async fn require(
        &self,
        ctx: &RequestContext,
        child_id: ChildId,
        level: PermissionLevel,
    ) -> AppResult<()> {
        Ok(ctx
            .permissions()
            .require(ctx.user_id, child_id, level)
            .await?)
    }

    /// The subset of `child_ids` the acting user holds `level` on.
    ///
    /// Checks run concurrently through the request's cache. Order is kept.
    pub async fn filter_authorized(
        &self,
        ctx: &RequestContext,
        child_ids: &[ChildId],
        level: PermissionLevel,
    ) -> AppResult<Vec<ChildId>> {
        let checks = child_ids.iter().map(|&child_id| async move {
            let allowed = ctx
                .permissions()
                .get_or_check(ctx.user_id, child_id, level)
                .await?;
            Ok::<_, AccessError>((child_id, allowed))
        });
        let decisions = try_join_all(checks).await?;
        Ok(decisions
            .into_iter()
            .filter_map(|(child_id, allowed)| allowed.then_some(child_id))
            .collect())
    }

    /// Children the acting user owns or holds a grant on.
    pub async fn accessible_children(&self, ctx: &RequestContext) -> AppResult<Vec<Child>> {
        self.stores.children.children_accessible_by(ctx.user_id).await
    }

    /// Shares one child with `email`.
    ///
    /// A registered email is granted directly; otherwise a pending invitation
    /// is recorded. Only the owner may share.
    pub async fn invite(
        &self,
        ctx: &RequestContext,
        email: &str,
        child_id: ChildId,
        level: PermissionLevel,
    ) -> AppResult<InviteOutcome> {
        self.require_owner(ctx, child_id).await?;
        let email = normalize_email(email)?;

        if let Some(user) = self.stores.users.find_user_by_email(&email).await? {
            let grants = self
                .grant_existing(ctx, user.id, &[ChildPermission::new(child_id, level)])
                .await?;
            return Ok(InviteOutcome::Granted { grants });
        }

        let row = self
            .ledger
            .create_invitation(&email, child_id, level, ctx.user_id)
            .await?;
        Ok(InviteOutcome::Invited {
            token: row.token.clone(),
            invitations: vec![row],
        })
    }

    /// Shares several children with `email` in one step.
    ///
    /// The acting user must own every child named.
    pub async fn invite_bulk(
        &self,
        ctx: &RequestContext,
        email: &str,
        pairs: &[ChildPermission],
    ) -> AppResult<InviteOutcome> {
        if pairs.is_empty() {
            return Err(AccessError::EmptyBulkInvitation.into());
        }
        for pair in pairs {
            self.require_owner(ctx, pair.child_id).await?;
        }
        let email = normalize_email(email)?;

        if let Some(user) = self.stores.users.find_user_by_email(&email).await? {
            let grants = self.grant_existing(ctx, user.id, pairs).await?;
            return Ok(InviteOutcome::Granted { grants });
        }

        let invitations = self
            .ledger
            .create_bulk_invitation(&email, pairs, ctx.user_id)
            .await?;
        let token = invitations
            .first()
            .map(|row| row.token.clone())
            .ok_or(AccessError::EmptyBulkInvitation)?;
        Ok(InviteOutcome::Invited { token, invitations })
    }

    /// Grants `level` on `child_id` to an existing user, replacing any prior level.
    pub async fn grant(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        child_id: ChildId,
        level: PermissionLevel,
    ) -> AppResult<Permission> {
        self.require_owner(ctx, child_id).await?;
        if self.stores.users.find_user(user_id).await?.is_none() {
            return Err(AppError::not_found(format!("User {user_id} not found")));
        }
        let mut grants = self
            .grant_existing(ctx, user_id, &[ChildPermission::new(child_id, level)])
            .await?;
        grants
            .pop()
            .ok_or_else(|| AppError::internal("Grant was not applied"))
    }

    /// Grants on `child_id`. Requires EDIT.
    pub async fn list_permissions(
        &self,
        ctx: &RequestContext,
        child_id: ChildId,
    ) -> AppResult<Vec<Permission>> {
        self.require(ctx, child_id, PermissionLevel::Edit).await?;
        self.stores.grants.grants_for_child(child_id).await
    }

    /// Deletes a grant by id. Requires EDIT on the grant's child.
    pub async fn revoke_permission(
        &self,
        ctx: &RequestContext,
        permission_id: PermissionId,
    ) -> AppResult<()> {
        let grant = self
            .stores
            .grants
            .find_grant_by_id(permission_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Permission {permission_id} not found")))?;
        self.require(ctx, grant.child_id, PermissionLevel::Edit).await?;

        self.stores.grants.delete_grant(permission_id).await?;
        ctx.permissions().invalidate_child(grant.child_id).await;

        info!(
            actor_id = %ctx.user_id,
            permission_id = %permission_id,
            child_id = %grant.child_id,
            "Permission revoked"
        );
        Ok(())
    }

    /// Deletes the grant `user_id` holds on `child_id`. Requires EDIT.
    pub async fn revoke_access(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        child_id: ChildId,
    ) -> AppResult<()> {
        self.require(ctx, child_id, PermissionLevel::Edit).await?;
        if !self.stores.grants.delete_grant_for(user_id, child_id).await? {
            return Err(AppError::not_found(format!(
                "User {user_id} holds no permission on child {child_id}"
            )));
        }
        ctx.permissions().invalidate_child(child_id).await;

        info!(
            actor_id = %ctx.user_id,
            user_id = %user_id,
            child_id = %child_id,
            "Access revoked"
        );
        Ok(())
    }

    /// Live rows for `token`, for rendering an invitation before sign-up.
    pub async fn pending_invitations_for(&self, token: &str) -> AppResult<Vec<PendingInvitation>> {
        Ok(self.ledger.pending_for_token(token).await?)
    }

    /// Live invitations targeting `child_id`. Requires EDIT.
    pub async fn pending_invitations_for_child(
        &self,
        ctx: &RequestContext,
        child_id: ChildId,
    ) -> AppResult<Vec<PendingInvitation>> {
        self.require(ctx, child_id, PermissionLevel::Edit).await?;
        Ok(self.ledger.pending_for_child(child_id).await?)
    }

    /// Creates an account from an invitation and applies its grants.
    pub async fn register_with_invitation(
        &self,
        token: &str,
        new_user: &NewUser,
    ) -> AppResult<Registration> {
        Ok(self.ledger.register_with_invitation(token, new_user).await?)
    }

    /// Applies the invitation `token` to an account the caller has just
    /// created. Returns the number of grants applied.
    pub async fn redeem_invitation(
        &self,
        token: &str,
        user_id: UserId,
        email: &str,
    ) -> AppResult<usize> {
        let grants = self.ledger.redeem(token, email, user_id).await?;
        Ok(grants.len())
    }

    /// Deletes expired invitations. Returns the number removed.
    pub async fn sweep_expired_invitations(&self) -> AppResult<u64> {
        Ok(self.ledger.sweep().await?)
    }

    /// Fails unless the acting user owns `child_id`.
    async fn require_owner(&self, ctx: &RequestContext, child_id: ChildId) -> AppResult<Child> {
        let child = self
            .stores
            .children
            .find_child(child_id)
            .await?
            .ok_or(AccessError::ResourceNotFound { child_id })?;
        if !child.is_owned_by(ctx.user_id) {
            return Err(AccessError::Forbidden.into());
        }
        Ok(child)
    }

    /// Upserts grants for a registered user in one unit of work.
    ///
    /// Callers have already checked that the acting user owns every child.
    async fn grant_existing(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        pairs: &[ChildPermission],
    ) -> AppResult<Vec<Permission>> {
        if user_id == ctx.user_id {
            return Err(AccessError::OwnerGrant.into());
        }

        let mut tx = self.stores.invitations.begin().await?;
        let mut grants: Vec<Permission> = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let grant = tx.upsert_grant(user_id, pair.child_id, pair.level).await?;
            match grants.iter_mut().find(|g| g.id == grant.id) {
                Some(existing) => *existing = grant,
                None => grants.push(grant),
            }
        }
        tx.commit().await?;

        for grant in &grants {
            ctx.permissions().invalidate_child(grant.child_id).await;
            info!(
                actor_id = %ctx.user_id,
                user_id = %user_id,
                child_id = %grant.child_id,
                level = %grant.level,
                "Permission granted"
            );
        }
        Ok(grants)
    }
}
