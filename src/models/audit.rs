use serde_json::Value;
use uuid::Uuid;

pub const EVENT_TYPE_SUBSCRIPTION_UPDATED: &str = "subscription_updated";
pub const NOTIFICATION_TYPE_SUBSCRIPTION: &str = "subscription";

/// Row for the `events` table the client's realtime subscription listens on.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEventRow {
    pub user_id: Uuid,
    pub event_type: String,
    pub payload: Value,
}

/// Row for the user-facing `notifications` table.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotificationRow {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: String,
}

/// Row for `webhook_error_log`, written once a payment could not be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWebhookFailure {
    pub event_id: Option<String>,
    pub email: String,
    pub amount: i64,
    pub stage: String,
    pub error: String,
}
