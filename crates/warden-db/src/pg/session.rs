//! PostgreSQL session repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use warden_types::{
    ListSessionsParams, Session, SessionId, SessionInfo, SessionSortField, SortOrder, UserId,
};

use crate::error::{DbError, DbResult};
use crate::models::{SessionInfoRow, SessionRow};
use crate::repo::SessionRepository;

const SESSION_COLUMNS: &str = r#"
    SELECT session_id, user_id, refresh_token_hash, device_info, ip_address,
           service_name, created_at, expires_at, revoked_at
    FROM user_sessions
"#;

/// PostgreSQL session repository
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    /// Create a new session repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Append the WHERE clause shared by the count and page queries
fn push_active_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, params: &'a ListSessionsParams) {
    qb.push(" WHERE s.revoked_at IS NULL AND s.expires_at > NOW() AND u.deleted_at IS NULL");

    if let Some(user_id) = params.user_id {
        qb.push(" AND s.user_id = ").push_bind(user_id.0);
    }
    if let Some(service) = params.service_name.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND s.service_name = ").push_bind(service);
    }
    if let Some(search) = params.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search.to_lowercase());
        qb.push(" AND (LOWER(u.username) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(u.email) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn sort_column(field: SessionSortField) -> &'static str {
    match field {
        SessionSortField::CreatedAt => "s.created_at",
        SessionSortField::ExpiresAt => "s.expires_at",
        SessionSortField::Username => "u.username",
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, session: &Session) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE user_sessions
            SET revoked_at = $1
            WHERE user_id = $2 AND revoked_at IS NULL AND expires_at > $1
            "#,
        )
        .bind(session.created_at)
        .bind(session.user_id.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO user_sessions (session_id, user_id, refresh_token_hash, device_info,
                                       ip_address, service_name, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session.id.0)
        .bind(session.user_id.0)
        .bind(&session.refresh_token_hash)
        .bind(&session.device_info)
        .bind(&session.ip_address)
        .bind(&session.service_name)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: SessionId) -> DbResult<Option<Session>> {
        let sql = format!("{SESSION_COLUMNS} WHERE session_id = $1");
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Session::from))
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> DbResult<Option<Session>> {
        let sql = format!("{SESSION_COLUMNS} WHERE refresh_token_hash = $1");
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Session::from))
    }

    async fn find_active_by_user(&self, user_id: UserId) -> DbResult<Option<Session>> {
        let sql = format!(
            "{SESSION_COLUMNS} WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > NOW() \
             ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Session::from))
    }

    async fn rotate(
        &self,
        id: SessionId,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET refresh_token_hash = $3, expires_at = $4
            WHERE session_id = $1 AND refresh_token_hash = $2
              AND revoked_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(id.0)
        .bind(expected_hash)
        .bind(new_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke(&self, id: SessionId) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE user_sessions SET revoked_at = COALESCE(revoked_at, NOW()) WHERE session_id = $1",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn revoke_by_token_hash(&self, token_hash: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET revoked_at = COALESCE(revoked_at, NOW())
            WHERE refresh_token_hash = $1
            "#,
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE user_sessions SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_active(&self, params: &ListSessionsParams) -> DbResult<(Vec<SessionInfo>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM user_sessions s JOIN mst_user u ON u.user_id = s.user_id",
        );
        push_active_filters(&mut count, params);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut page = QueryBuilder::<Postgres>::new(
            r#"
            SELECT s.session_id, s.user_id, u.username, u.email, s.device_info,
                   s.ip_address, s.service_name, s.created_at, s.expires_at
            FROM user_sessions s
            JOIN mst_user u ON u.user_id = s.user_id
            "#,
        );
        push_active_filters(&mut page, params);
        let direction = match params.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        page.push(format!(" ORDER BY {} {direction}", sort_column(params.sort_by)));
        page.push(" LIMIT ")
            .push_bind(i64::from(params.limit()))
            .push(" OFFSET ")
            .push_bind(i64::try_from(params.offset()).unwrap_or(i64::MAX));

        let rows = page
            .build_query_as::<SessionInfoRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok((
            rows.into_iter().map(SessionInfo::from).collect(),
            u64::try_from(total).unwrap_or_default(),
        ))
    }

    async fn cleanup_expired(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
