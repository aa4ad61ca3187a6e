pub mod admin;
pub mod checkout;
pub mod plans;
pub mod stripe;

use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};

use crate::responses::JsonResponse;
use crate::state::AppState;

/// Every route, with state applied. Cross-cutting layers are added by the binary.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/plans", get(plans::list_plans))
        .route("/api/checkout", post(checkout::create_checkout))
        .route("/api/stripe/webhook", post(stripe::webhook))
        .nest("/api/admin", admin::router(state.clone()))
        .with_state(state)
}

/// A simple root route.
async fn root() -> Response {
    JsonResponse::success("Mercado Mágico billing is running").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::stripe::signature::compute_signature;
    use crate::services::user_store::MockUserStore;
    use crate::state::test_support::{test_state, PROD_SECRET};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use time::OffsetDateTime;
    use tower::ServiceExt;

    #[tokio::test]
    async fn root_reports_liveness() {
        let t = test_state(MockUserStore::default());
        let resp = app_router(t.state)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn webhook_is_mounted_and_verifies_raw_body() {
        let t = test_state(MockUserStore::default());
        let body = serde_json::to_vec(&json!({
            "id": "evt_router",
            "type": "checkout.session.completed",
            "data": { "object": {
                "customer_details": { "email": "router@example.com" },
                "amount_total": 4999
            }}
        }))
        .unwrap();
        let ts = OffsetDateTime::now_utc().unix_timestamp();
        let sig = compute_signature(PROD_SECRET, ts, &body);

        let resp = app_router(t.state.clone())
            .oneshot(
                Request::post("/api/stripe/webhook")
                    .header("Stripe-Signature", format!("t={ts},v1={sig}"))
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), 8 * 1024)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["secret_used"], "production");
        let stored = t.store.user("router@example.com").unwrap().user_metadata;
        assert_eq!(stored["subscription_plan"], "premium");
    }

    #[tokio::test]
    async fn admin_routes_are_gated_when_nested() {
        let t = test_state(MockUserStore::default());
        let resp = app_router(t.state)
            .oneshot(Request::get("/api/admin/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
