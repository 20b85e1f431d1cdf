//! Pending invitation repository and its transactional unit of work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use booktracker_core::error::{AppError, ErrorKind};
use booktracker_core::result::AppResult;
use booktracker_core::types::{ChildId, InvitationId, UserId};
use booktracker_entity::invitation::{NewPendingInvitation, PendingInvitation};
use booktracker_entity::permission::{Permission, PermissionLevel};
use booktracker_entity::user::{NewUser, User};

use crate::store::{InvitationStore, LedgerTransaction};

use super::{permission, user};

/// Repository for pending invitations.
#[derive(Debug, Clone)]
pub struct InvitationRepository {
    pool: PgPool,
}

impl InvitationRepository {
    /// Create a new invitation repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvitationStore for InvitationRepository {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTransaction>> {
        let tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;
        Ok(Box::new(PgLedgerTransaction { tx: Some(tx) }))
    }

    async fn pending_by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PendingInvitation>> {
        sqlx::query_as::<_, PendingInvitation>(
            "SELECT * FROM pending_invitations WHERE token = $1 AND expires_at > $2 \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(token)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find invitations", e))
    }

    async fn pending_for_child(
        &self,
        child_id: ChildId,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PendingInvitation>> {
        sqlx::query_as::<_, PendingInvitation>(
            "SELECT * FROM pending_invitations WHERE child_id = $1 AND expires_at > $2 \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(child_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find invitations", e))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM pending_invitations WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete expired invitations", e)
            })?;
        Ok(result.rows_affected())
    }
}

/// Unit of work backed by a PostgreSQL transaction.
///
/// `sqlx` rolls the transaction back when it is dropped uncommitted.
#[derive(Debug)]
pub struct PgLedgerTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgLedgerTransaction {
    fn tx(&mut self) -> AppResult<&mut Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction already committed"))
    }
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn lock_email(&mut self, email: &str) -> AppResult<()> {
        let tx = self.tx()?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(email)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock email", e))?;
        Ok(())
    }

    async fn find_user_by_email(&mut self, email: &str) -> AppResult<Option<User>> {
        let tx = self.tx()?;
        user::find_by_email(&mut **tx, email).await
    }

    async fn create_user(&mut self, data: &NewUser) -> AppResult<User> {
        let tx = self.tx()?;
        user::insert(&mut **tx, data).await
    }

    async fn find_owner(&mut self, child_id: ChildId) -> AppResult<Option<UserId>> {
        let tx = self.tx()?;
        permission::find_owner(&mut **tx, child_id).await
    }

    async fn find_pending(
        &mut self,
        email: &str,
        child_id: ChildId,
    ) -> AppResult<Option<PendingInvitation>> {
        let tx = self.tx()?;
        sqlx::query_as::<_, PendingInvitation>(
            "SELECT * FROM pending_invitations WHERE email = $1 AND child_id = $2 \
             ORDER BY created_at DESC LIMIT 1 FOR UPDATE",
        )
        .bind(email)
        .bind(child_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find invitation", e))
    }

    async fn insert_pending(
        &mut self,
        data: &NewPendingInvitation,
    ) -> AppResult<PendingInvitation> {
        let tx = self.tx()?;
        sqlx::query_as::<_, PendingInvitation>(
            "INSERT INTO pending_invitations \
             (id, email, child_id, level, invited_by, token, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(InvitationId::new())
        .bind(&data.email)
        .bind(data.child_id)
        .bind(data.level)
        .bind(data.invited_by)
        .bind(&data.token)
        .bind(data.expires_at)
        .bind(data.created_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create invitation", e))
    }

    async fn refresh_pending(
        &mut self,
        existing: &PendingInvitation,
        data: &NewPendingInvitation,
    ) -> AppResult<PendingInvitation> {
        let tx = self.tx()?;
        sqlx::query_as::<_, PendingInvitation>(
            "UPDATE pending_invitations \
             SET level = $2, invited_by = $3, token = $4, expires_at = $5, created_at = $6 \
             WHERE id = $1 RETURNING *",
        )
        .bind(existing.id)
        .bind(data.level)
        .bind(data.invited_by)
        .bind(&data.token)
        .bind(data.expires_at)
        .bind(data.created_at)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update invitation", e))?
        .ok_or_else(|| AppError::not_found(format!("Invitation {} not found", existing.id)))
    }

    async fn delete_pending_for_email(&mut self, email: &str) -> AppResult<u64> {
        let tx = self.tx()?;
        let result = sqlx::query("DELETE FROM pending_invitations WHERE email = $1")
            .bind(email)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete invitations", e)
            })?;
        Ok(result.rows_affected())
    }

    async fn claim_pending_by_token(
        &mut self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PendingInvitation>> {
        let tx = self.tx()?;
        sqlx::query_as::<_, PendingInvitation>(
            "SELECT * FROM pending_invitations WHERE token = $1 AND expires_at > $2 \
             ORDER BY created_at ASC, id ASC FOR UPDATE",
        )
        .bind(token)
        .bind(now)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to claim invitations", e))
    }

    async fn delete_pending_for_token(&mut self, token: &str) -> AppResult<u64> {
        let tx = self.tx()?;
        let result = sqlx::query("DELETE FROM pending_invitations WHERE token = $1")
            .bind(token)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete invitations", e)
            })?;
        Ok(result.rows_affected())
    }

    async fn upsert_grant(
        &mut self,
        user_id: UserId,
        child_id: ChildId,
        level: PermissionLevel,
    ) -> AppResult<Permission> {
        let tx = self.tx()?;
        permission::upsert_grant(&mut **tx, user_id, child_id, level).await
    }

    async fn commit(&mut self) -> AppResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| AppError::internal("Transaction already committed"))?;
        tx.commit()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit", e))
    }
}
