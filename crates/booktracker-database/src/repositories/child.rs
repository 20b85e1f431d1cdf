//! Child repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use booktracker_core::error::{AppError, ErrorKind};
use booktracker_core::result::AppResult;
use booktracker_core::types::{ChildId, UserId};
use booktracker_entity::child::{Child, NewChild};

use crate::store::ChildStore;

/// Repository for child records.
#[derive(Debug, Clone)]
pub struct ChildRepository {
    pool: PgPool,
}

impl ChildRepository {
    /// Create a new child repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChildStore for ChildRepository {
    async fn create_child(&self, data: &NewChild) -> AppResult<Child> {
        sqlx::query_as::<_, Child>(
            "INSERT INTO children (id, owner_id, name, grade) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(ChildId::new())
        .bind(data.owner_id)
        .bind(&data.name)
        .bind(&data.grade)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create child", e))
    }

    async fn find_child(&self, id: ChildId) -> AppResult<Option<Child>> {
        sqlx::query_as::<_, Child>("SELECT * FROM children WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find child", e))
    }

    async fn children_accessible_by(&self, user_id: UserId) -> AppResult<Vec<Child>> {
        sqlx::query_as::<_, Child>(
            "SELECT DISTINCT c.* FROM children c \
             LEFT JOIN permissions p ON p.child_id = c.id \
             WHERE c.owner_id = $1 OR p.user_id = $1 \
             ORDER BY c.created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list accessible children", e)
        })
    }

    async fn delete_child(&self, id: ChildId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM children WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete child", e))?;
        Ok(result.rows_affected() > 0)
    }
}
