use axum::{response::IntoResponse, Json};
use serde::Serialize;

use crate::models::plan::PlanTier;

#[derive(Debug, Serialize)]
pub struct PlanEntry {
    pub plan: PlanTier,
    pub rank: u8,
    /// Minimum checkout amount in minor units; absent for free.
    pub threshold: Option<i64>,
    pub credits: i64,
    pub unlimited: bool,
}

impl From<PlanTier> for PlanEntry {
    fn from(plan: PlanTier) -> Self {
        PlanEntry {
            plan,
            rank: plan.rank(),
            threshold: plan.threshold(),
            credits: plan.credits(),
            unlimited: plan.credits() < 0,
        }
    }
}

// GET /api/plans
pub async fn list_plans() -> impl IntoResponse {
    let plans: Vec<PlanEntry> = PlanTier::ALL.into_iter().map(PlanEntry::from).collect();
    Json(serde_json::json!({ "success": true, "plans": plans }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::Value;

    #[tokio::test]
    async fn catalogue_lists_every_tier_in_order() {
        let resp = list_plans().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), 8 * 1024)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        let plans = json["plans"].as_array().unwrap();
        let labels: Vec<&str> = plans.iter().map(|p| p["plan"].as_str().unwrap()).collect();
        assert_eq!(labels, vec!["free", "plus", "pro", "premium"]);

        assert!(plans[0]["threshold"].is_null());
        assert_eq!(plans[1]["threshold"], 999);
        assert_eq!(plans[2]["credits"], 200);
        assert_eq!(plans[3]["unlimited"], true);
        assert_eq!(plans[3]["credits"], -1);
    }
}
