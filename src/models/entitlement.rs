use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::plan::{PlanGrant, PlanTier};

pub const SUBSCRIPTION_STATUS_ACTIVE: &str = "active";

/// Entitlement fields the mobile app reads from the identity record's
/// `user_metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementMetadata {
    pub subscription_plan: PlanTier,
    pub subscription_status: String,
    pub credits_remaining: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payment_amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payment_date: Option<String>,
    pub updated_at: String,
}

impl EntitlementMetadata {
    pub fn new(
        grant: PlanGrant,
        amount: i64,
        stripe_customer_id: Option<String>,
        paid_at: OffsetDateTime,
    ) -> Self {
        let paid_at = format_timestamp(paid_at);
        Self {
            subscription_plan: grant.plan,
            subscription_status: SUBSCRIPTION_STATUS_ACTIVE.to_string(),
            credits_remaining: grant.credits,
            stripe_customer_id,
            last_payment_amount: Some(amount),
            last_payment_date: Some(paid_at.clone()),
            updated_at: paid_at,
        }
    }

    /// Tier change that is not a payment. Payment provenance and customer id
    /// are left unset so a merge keeps the stored values.
    pub fn plan_grant(grant: PlanGrant, granted_at: OffsetDateTime) -> Self {
        Self {
            subscription_plan: grant.plan,
            subscription_status: SUBSCRIPTION_STATUS_ACTIVE.to_string(),
            credits_remaining: grant.credits,
            stripe_customer_id: None,
            last_payment_amount: None,
            last_payment_date: None,
            updated_at: format_timestamp(granted_at),
        }
    }

    /// Overlays these fields onto existing metadata, keeping keys this
    /// service does not own. Unset optional fields keep the stored values.
    pub fn merge_into(&self, existing: &Value) -> Value {
        let mut merged = match existing {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        if let Value::Object(ours) = serde_json::to_value(self).unwrap_or(Value::Null) {
            for (key, value) in ours {
                merged.insert(key, value);
            }
        }
        Value::Object(merged)
    }

    pub fn to_value(&self) -> Value {
        self.merge_into(&Value::Null)
    }
}

/// Reads the stored plan label out of raw metadata without failing on
/// unexpected shapes.
pub fn stored_plan_label(metadata: &Value) -> Option<&str> {
    metadata.get("subscription_plan").and_then(|v| v.as_str())
}

pub fn stored_credits(metadata: &Value) -> Option<i64> {
    metadata.get("credits_remaining").and_then(|v| v.as_i64())
}

pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> EntitlementMetadata {
        EntitlementMetadata::new(
            PlanTier::Pro.into(),
            2999,
            Some("cus_123".into()),
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        )
    }

    #[test]
    fn merge_preserves_unrelated_keys() {
        let existing = json!({
            "full_name": "Ana",
            "subscription_plan": "plus",
            "credits_remaining": 3
        });
        let merged = sample().merge_into(&existing);
        assert_eq!(merged["full_name"], "Ana");
        assert_eq!(merged["subscription_plan"], "pro");
        assert_eq!(merged["credits_remaining"], 200);
        assert_eq!(merged["subscription_status"], "active");
        assert_eq!(merged["stripe_customer_id"], "cus_123");
    }

    #[test]
    fn missing_customer_id_keeps_stored_value() {
        let mut meta = sample();
        meta.stripe_customer_id = None;
        let merged = meta.merge_into(&json!({ "stripe_customer_id": "cus_old" }));
        assert_eq!(merged["stripe_customer_id"], "cus_old");
    }

    #[test]
    fn timestamps_are_rfc3339() {
        let meta = sample();
        assert_eq!(meta.last_payment_date.as_deref(), Some("2023-11-14T22:13:20Z"));
        assert_eq!(meta.updated_at, "2023-11-14T22:13:20Z");
    }

    #[test]
    fn plan_grant_keeps_stored_payment_provenance() {
        let existing = json!({
            "subscription_plan": "pro",
            "stripe_customer_id": "cus_old",
            "last_payment_amount": 2999,
            "last_payment_date": "2024-01-01T00:00:00Z"
        });
        let grant = EntitlementMetadata::plan_grant(
            PlanTier::Premium.into(),
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        );
        let merged = grant.merge_into(&existing);
        assert_eq!(merged["subscription_plan"], "premium");
        assert_eq!(merged["credits_remaining"], -1);
        assert_eq!(merged["last_payment_amount"], 2999);
        assert_eq!(merged["last_payment_date"], "2024-01-01T00:00:00Z");
        assert_eq!(merged["stripe_customer_id"], "cus_old");
        assert_eq!(merged["updated_at"], "2023-11-14T22:13:20Z");

        let fresh = grant.to_value();
        assert!(fresh.get("last_payment_amount").is_none());
        assert!(fresh.get("last_payment_date").is_none());
    }

    #[test]
    fn stored_accessors_tolerate_odd_shapes() {
        assert_eq!(stored_plan_label(&json!(null)), None);
        assert_eq!(stored_plan_label(&json!({"subscription_plan": 3})), None);
        assert_eq!(stored_credits(&json!({"credits_remaining": -1})), Some(-1));
    }
}
