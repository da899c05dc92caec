use chrono::Utc;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// User Repository
// ============================================================================

pub struct UserRepository;

fn map_user(r: SqliteRow) -> User {
    User {
        id: r.get("id"),
        email: r.get("email"),
        password: r.get("password"),
        auth_code: r.get("auth_code"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

fn map_write_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return AppError::Conflict("A user with this email already exists".to_string());
        }
    }
    AppError::Database(e)
}

impl UserRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password, auth_code, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(map_user))
    }

    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password, auth_code, created_at, updated_at
            FROM users
            WHERE email = ? COLLATE NOCASE
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(map_user))
    }

    /// The administrator alerts go to: the oldest account.
    pub async fn find_admin(pool: &SqlitePool) -> AppResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password, auth_code, created_at, updated_at
            FROM users
            ORDER BY id
            LIMIT 1
            "#,
        )
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(map_user))
    }

    pub async fn count(pool: &SqlitePool) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Insert a user. `password_hash` must already be hashed.
    pub async fn create(pool: &SqlitePool, email: &str, password_hash: &str) -> AppResult<User> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO users (email, password, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, email, password, auth_code, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(map_write_error)?;

        Ok(map_user(row))
    }

    /// Update email and, when given, the (already hashed) password.
    pub async fn update(
        pool: &SqlitePool,
        id: i64,
        email: &str,
        password_hash: Option<&str>,
    ) -> AppResult<Option<User>> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET email = ?, password = COALESCE(?, password), updated_at = ?
            WHERE id = ?
            RETURNING id, email, password, auth_code, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(map_write_error)?;

        Ok(row.map(map_user))
    }

    /// Store (or clear) the pending two-factor code.
    pub async fn set_auth_code(pool: &SqlitePool, id: i64, code: Option<&str>) -> AppResult<()> {
        sqlx::query("UPDATE users SET auth_code = ?, updated_at = ? WHERE id = ?")
            .bind(code)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}
