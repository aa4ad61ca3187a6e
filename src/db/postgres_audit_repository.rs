use async_trait::async_trait;
use sqlx::{types::Json, PgPool, Postgres};
use uuid::Uuid;

use crate::db::audit_repository::AuditRepository;
use crate::models::audit::{NewEventRow, NewNotificationRow, NewWebhookFailure};

pub struct PostgresAuditRepository {
    pub pool: PgPool,
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn insert_event(&self, row: NewEventRow) -> Result<(), sqlx::Error> {
        sqlx::query::<Postgres>(
            r#"
            INSERT INTO events (id, user_id, event_type, payload)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.user_id)
        .bind(row.event_type)
        .bind(Json(row.payload))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_notification(&self, row: NewNotificationRow) -> Result<(), sqlx::Error> {
        sqlx::query::<Postgres>(
            r#"
            INSERT INTO notifications (id, user_id, title, message, type, read)
            VALUES ($1, $2, $3, $4, $5, false)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.user_id)
        .bind(row.title)
        .bind(row.message)
        .bind(row.kind)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_webhook_failure(&self, row: NewWebhookFailure) -> Result<(), sqlx::Error> {
        sqlx::query::<Postgres>(
            r#"
            INSERT INTO webhook_error_log (id, event_id, email, amount, stage, error)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.event_id)
        .bind(row.email)
        .bind(row.amount)
        .bind(row.stage)
        .bind(row.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
