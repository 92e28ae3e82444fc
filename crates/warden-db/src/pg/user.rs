//! PostgreSQL user repository implementation

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;
use warden_types::{User, UserId};

use crate::error::{DbError, DbResult};
use crate::models::UserRow;
use crate::repo::{RolesAndPermissions, UserRepository};

const USER_COLUMNS: &str = r#"
    SELECT u.user_id, u.username, u.email, d.full_name, u.password_hash,
           u.is_active, u.is_locked, u.failed_login_attempts, u.locked_until,
           u.two_factor_enabled, u.two_factor_secret, u.last_login_at,
           u.last_login_ip, u.password_changed_at, u.created_at, u.updated_at
    FROM mst_user u
    LEFT JOIN mst_user_detail d ON d.user_id = u.user_id
"#;

/// PostgreSQL user repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, filter: &str, value: &str) -> DbResult<Option<User>> {
        let sql = format!("{USER_COLUMNS} WHERE {filter} AND u.deleted_at IS NULL");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::from))
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: UserId) -> DbResult<Option<User>> {
        let sql = format!("{USER_COLUMNS} WHERE u.user_id = $1 AND u.deleted_at IS NULL");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::from))
    }

    async fn find_by_username(&self, username: &str) -> DbResult<Option<User>> {
        self.find_one("u.username = $1", username).await
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>> {
        self.find_one("LOWER(u.email) = LOWER($1)", email).await
    }

    async fn update(&self, user: &User) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE mst_user
            SET password_hash = $2, is_active = $3, is_locked = $4,
                failed_login_attempts = $5, locked_until = $6,
                two_factor_enabled = $7, two_factor_secret = $8,
                last_login_at = $9, last_login_ip = $10,
                password_changed_at = $11, updated_at = $12
            WHERE user_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user.id.0)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.is_locked)
        .bind(user.failed_login_attempts)
        .bind(user.locked_until)
        .bind(user.two_factor_enabled)
        .bind(&user.two_factor_secret)
        .bind(user.last_login_at)
        .bind(&user.last_login_ip)
        .bind(user.password_changed_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn find_roles_and_permissions(&self, id: UserId) -> DbResult<RolesAndPermissions> {
        let roles: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT r.role_code
            FROM user_roles ur
            JOIN mst_role r ON r.role_id = ur.role_id
            WHERE ur.user_id = $1 AND r.is_active AND r.deleted_at IS NULL
            ORDER BY r.role_code
            "#,
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        let permissions: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT p.permission_code
            FROM mst_permission p
            WHERE p.is_active AND p.deleted_at IS NULL AND p.permission_id IN (
                SELECT up.permission_id FROM user_permissions up WHERE up.user_id = $1
                UNION
                SELECT rp.permission_id
                FROM role_permissions rp
                JOIN user_roles ur ON ur.role_id = rp.role_id
                JOIN mst_role r ON r.role_id = ur.role_id
                WHERE ur.user_id = $1 AND r.is_active AND r.deleted_at IS NULL
            )
            ORDER BY p.permission_code
            "#,
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(RolesAndPermissions { roles, permissions })
    }

    async fn store_recovery_codes(&self, id: UserId, code_hashes: &[String]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_recovery_codes WHERE user_id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        for hash in code_hashes {
            sqlx::query(
                r#"
                INSERT INTO user_recovery_codes (code_id, user_id, code_hash)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(id.0)
            .bind(hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn use_recovery_code(&self, id: UserId, code_hash: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_recovery_codes
            SET used_at = NOW()
            WHERE user_id = $1 AND code_hash = $2 AND used_at IS NULL
            "#,
        )
        .bind(id.0)
        .bind(code_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_recovery_codes(&self, id: UserId) -> DbResult<()> {
        sqlx::query("DELETE FROM user_recovery_codes WHERE user_id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
