//! User repository implementation.

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool};

use booktracker_core::error::{AppError, ErrorKind};
use booktracker_core::result::AppResult;
use booktracker_core::types::UserId;
use booktracker_entity::user::{NewUser, User};

use crate::store::UserDirectory;

/// Repository for user lookups and creation.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Find a user by email (case-insensitive).
pub(crate) async fn find_by_email<'e, E>(executor: E, email: &str) -> AppResult<Option<User>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email)
        .fetch_optional(executor)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find user by email", e))
}

/// Insert a user. A duplicate email surfaces as a conflict.
pub(crate) async fn insert<'e, E>(executor: E, data: &NewUser) -> AppResult<User>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, User>(
        "INSERT INTO users (id, email, first_name, last_name, password_hash) \
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(UserId::new())
    .bind(&data.email)
    .bind(&data.first_name)
    .bind(&data.last_name)
    .bind(&data.password_hash)
    .fetch_one(executor)
    .await
    .map_err(|e| {
        let kind = match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => ErrorKind::Conflict,
            _ => ErrorKind::Database,
        };
        AppError::with_source(kind, "Failed to create user", e)
    })
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn find_user(&self, id: UserId) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find user by id", e))
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        find_by_email(&self.pool, email).await
    }

    async fn create_user(&self, data: &NewUser) -> AppResult<User> {
        insert(&self.pool, data).await
    }
}
