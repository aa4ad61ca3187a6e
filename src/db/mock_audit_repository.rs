use async_trait::async_trait;
use std::sync::Mutex;

use crate::db::audit_repository::AuditRepository;
use crate::models::audit::{NewEventRow, NewNotificationRow, NewWebhookFailure};

#[derive(Default)]
pub struct MockAuditRepository {
    pub events: Mutex<Vec<NewEventRow>>,
    pub notifications: Mutex<Vec<NewNotificationRow>>,
    pub failures: Mutex<Vec<NewWebhookFailure>>,
    pub should_fail: bool,
}

impl MockAuditRepository {
    fn check(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("Mock DB failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditRepository for MockAuditRepository {
    async fn insert_event(&self, row: NewEventRow) -> Result<(), sqlx::Error> {
        self.check()?;
        self.events.lock().unwrap().push(row);
        Ok(())
    }

    async fn insert_notification(&self, row: NewNotificationRow) -> Result<(), sqlx::Error> {
        self.check()?;
        self.notifications.lock().unwrap().push(row);
        Ok(())
    }

    async fn insert_webhook_failure(&self, row: NewWebhookFailure) -> Result<(), sqlx::Error> {
        self.check()?;
        self.failures.lock().unwrap().push(row);
        Ok(())
    }
}
