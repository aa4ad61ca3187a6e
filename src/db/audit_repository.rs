use async_trait::async_trait;

use crate::models::audit::{NewEventRow, NewNotificationRow, NewWebhookFailure};

/// Write-only auxiliary rows. Nothing in this service reads them back.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn insert_event(&self, row: NewEventRow) -> Result<(), sqlx::Error>;

    async fn insert_notification(&self, row: NewNotificationRow) -> Result<(), sqlx::Error>;

    async fn insert_webhook_failure(&self, row: NewWebhookFailure) -> Result<(), sqlx::Error>;
}
