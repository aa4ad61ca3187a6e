use async_trait::async_trait;

/// Idempotency log of provider event ids that have been fully applied.
#[async_trait]
pub trait StripeEventLogRepository: Send + Sync {
    async fn has_processed_event(&self, event_id: &str) -> Result<bool, sqlx::Error>;

    async fn record_event(&self, event_id: &str, event_type: &str) -> Result<(), sqlx::Error>;
}
