use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identity record as held by the external identity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl StoreUser {
    /// Exact, case-sensitive match, mirroring how payer emails are keyed.
    pub fn has_email(&self, email: &str) -> bool {
        self.email.as_deref() == Some(email)
    }
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: Option<String>,
    pub subscription_plan: Option<String>,
    pub credits_remaining: Option<i64>,
    pub created_at: Option<String>,
}

impl From<&StoreUser> for UserSummary {
    fn from(user: &StoreUser) -> Self {
        UserSummary {
            id: user.id,
            email: user.email.clone(),
            subscription_plan: super::entitlement::stored_plan_label(&user.user_metadata)
                .map(|s| s.to_string()),
            credits_remaining: super::entitlement::stored_credits(&user.user_metadata),
            created_at: user.created_at.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_supabase_shape_with_missing_fields() {
        let raw = json!({
            "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "email": "ana@example.com",
            "aud": "authenticated",
            "role": "authenticated"
        });
        let user: StoreUser = serde_json::from_value(raw).unwrap();
        assert!(user.has_email("ana@example.com"));
        assert!(!user.has_email("ANA@example.com"));
        assert!(user.user_metadata.is_null());
    }

    #[test]
    fn summary_reads_plan_from_metadata() {
        let user = StoreUser {
            id: Uuid::new_v4(),
            email: Some("bo@example.com".into()),
            user_metadata: json!({"subscription_plan": "pro", "credits_remaining": 200}),
            email_confirmed_at: None,
            created_at: None,
        };
        let summary = UserSummary::from(&user);
        assert_eq!(summary.subscription_plan.as_deref(), Some("pro"));
        assert_eq!(summary.credits_remaining, Some(200));
    }
}
