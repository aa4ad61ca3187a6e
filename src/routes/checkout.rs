use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::models::plan::PlanTier;
use crate::responses::JsonResponse;
use crate::services::stripe::{CheckoutLineItem, CheckoutMode, CreateCheckoutSessionRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutPayload {
    pub plan: String,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub success: bool,
    pub id: String,
    pub url: Option<String>,
}

// POST /api/checkout
pub async fn create_checkout(
    State(app_state): State<AppState>,
    Json(payload): Json<CheckoutPayload>,
) -> Response {
    let plan = match PlanTier::parse(&payload.plan) {
        Some(plan) if plan.is_paid() => plan,
        Some(_) => {
            return JsonResponse::bad_request("The free plan does not need a checkout")
                .into_response()
        }
        None => return JsonResponse::bad_request("Unknown plan").into_response(),
    };

    let settings = &app_state.config.stripe;
    let Some(price) = settings.price_for(plan) else {
        return JsonResponse::bad_request("This plan is not available for purchase yet")
            .into_response();
    };

    let customer_email = payload
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string);

    let mut metadata = BTreeMap::new();
    metadata.insert("plan".to_string(), plan.as_str().to_string());

    let req = CreateCheckoutSessionRequest {
        success_url: settings.success_url.clone(),
        cancel_url: settings.cancel_url.clone(),
        mode: CheckoutMode::Payment,
        line_items: vec![CheckoutLineItem {
            price: price.to_string(),
            quantity: 1,
        }],
        customer_email,
        metadata: Some(metadata),
    };

    match app_state.stripe.create_checkout_session(req).await {
        Ok(session) => {
            info!(session_id = %session.id, %plan, "created checkout session");
            (
                StatusCode::OK,
                Json(CheckoutResponse {
                    success: true,
                    id: session.id,
                    url: session.url,
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!(?err, %plan, "failed to create checkout session");
            JsonResponse::bad_gateway("Failed to start checkout").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::stripe::MockStripeService;
    use crate::services::user_store::MockUserStore;
    use crate::state::test_support::{test_config, test_state, test_state_with};
    use serde_json::Value;

    async fn call(state: &AppState, plan: &str, email: Option<&str>) -> Response {
        create_checkout(
            State(state.clone()),
            Json(CheckoutPayload {
                plan: plan.to_string(),
                email: email.map(str::to_string),
            }),
        )
        .await
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 8 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn paid_plan_creates_payment_session_with_configured_price() {
        let t = test_state(MockUserStore::default());
        let resp = call(&t.state, "Pro", Some(" ana@example.com ")).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert!(json["id"].as_str().unwrap().starts_with("cs_test_"));
        assert_eq!(json["url"], "https://example.test/checkout");

        let requests = t.stripe.last_create_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].mode, CheckoutMode::Payment);
        assert_eq!(requests[0].line_items[0].price, "price_pro");
        assert_eq!(requests[0].customer_email.as_deref(), Some("ana@example.com"));
        assert_eq!(
            requests[0].metadata.as_ref().unwrap().get("plan").map(String::as_str),
            Some("pro")
        );
    }

    #[tokio::test]
    async fn free_and_unknown_plans_are_rejected() {
        let t = test_state(MockUserStore::default());
        assert_eq!(
            call(&t.state, "free", None).await.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            call(&t.state, "super", None).await.status(),
            StatusCode::BAD_REQUEST
        );
        assert!(t.stripe.last_create_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn plan_without_price_is_rejected() {
        let t = test_state(MockUserStore::default());
        let resp = call(&t.state, "premium", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(t.stripe.last_create_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_is_bad_gateway() {
        let stripe = MockStripeService {
            fail_checkout: true,
            ..Default::default()
        };
        let t = test_state_with(MockUserStore::default(), stripe, test_config());
        let resp = call(&t.state, "plus", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
