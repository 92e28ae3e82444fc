//! PostgreSQL audit log repository

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::DbResult;
use crate::repo::{AuditRepository, CreateAuditEvent};

/// Table name recorded against auth events
const AUTH_TABLE: &str = "mst_user";

/// PostgreSQL audit repository
#[derive(Clone)]
pub struct PgAuditRepository {
    pool: PgPool,
}

impl PgAuditRepository {
    /// Create a new audit repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for PgAuditRepository {
    async fn create(&self, event: CreateAuditEvent) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (log_id, event_type, table_name, record_id, user_id,
                                    username, ip_address, user_agent, service_name,
                                    new_data, performed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(event.id)
        .bind(&event.event_type)
        .bind(AUTH_TABLE)
        .bind(event.user_id.map(|u| u.0))
        .bind(event.user_id.map(|u| u.0))
        .bind(&event.username)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.service_name)
        .bind(&event.details)
        .bind(event.performed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
