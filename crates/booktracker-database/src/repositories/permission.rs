//! Grant repository implementation.

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool};

use booktracker_core::error::{AppError, ErrorKind};
use booktracker_core::result::AppResult;
use booktracker_core::types::{ChildId, PermissionId, UserId};
use booktracker_entity::permission::{Permission, PermissionLevel};

use crate::store::GrantStore;

/// Repository for grant CRUD and ownership lookups.
#[derive(Debug, Clone)]
pub struct PermissionRepository {
    pool: PgPool,
}

impl PermissionRepository {
    /// Create a new permission repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Insert or replace the grant for `(user_id, child_id)`.
///
/// Shared by the repository and the ledger transaction.
pub(crate) async fn upsert_grant<'e, E>(
    executor: E,
    user_id: UserId,
    child_id: ChildId,
    level: PermissionLevel,
) -> AppResult<Permission>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Permission>(
        "INSERT INTO permissions (id, user_id, child_id, level) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (user_id, child_id) DO UPDATE SET level = EXCLUDED.level, updated_at = NOW() \
         RETURNING *",
    )
    .bind(PermissionId::new())
    .bind(user_id)
    .bind(child_id)
    .bind(level)
    .fetch_one(executor)
    .await
    .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to upsert permission", e))
}

/// The owner of `child_id`, if the child exists.
pub(crate) async fn find_owner<'e, E>(executor: E, child_id: ChildId) -> AppResult<Option<UserId>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar::<_, UserId>("SELECT owner_id FROM children WHERE id = $1")
        .bind(child_id)
        .fetch_optional(executor)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find child owner", e))
}

#[async_trait]
impl GrantStore for PermissionRepository {
    async fn find_owner(&self, child_id: ChildId) -> AppResult<Option<UserId>> {
        find_owner(&self.pool, child_id).await
    }

    async fn find_grant(
        &self,
        user_id: UserId,
        child_id: ChildId,
    ) -> AppResult<Option<Permission>> {
        sqlx::query_as::<_, Permission>(
            "SELECT * FROM permissions WHERE user_id = $1 AND child_id = $2",
        )
        .bind(user_id)
        .bind(child_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find permission", e))
    }

    async fn find_grant_by_id(&self, id: PermissionId) -> AppResult<Option<Permission>> {
        sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find permission", e))
    }

    async fn grants_for_child(&self, child_id: ChildId) -> AppResult<Vec<Permission>> {
        sqlx::query_as::<_, Permission>(
            "SELECT * FROM permissions WHERE child_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(child_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list permissions", e))
    }

    async fn upsert_grant(
        &self,
        user_id: UserId,
        child_id: ChildId,
        level: PermissionLevel,
    ) -> AppResult<Permission> {
        upsert_grant(&self.pool, user_id, child_id, level).await
    }

    async fn delete_grant(&self, id: PermissionId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete permission", e)
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_grant_for(&self, user_id: UserId, child_id: ChildId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM permissions WHERE user_id = $1 AND child_id = $2")
            .bind(user_id)
            .bind(child_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete permission", e)
            })?;
        Ok(result.rows_affected() > 0)
    }
}
