use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::models::plan::PlanTier;
use crate::models::user::UserSummary;
use crate::responses::JsonResponse;
use crate::routes::stripe::handle_event;
use crate::services::entitlements::{PaymentEvent, ReconcileOutcome, SyncOutcome};
use crate::services::stripe::StripeServiceError;
use crate::state::AppState;
use crate::utils::admin_auth::admin_gate;

#[derive(Debug, Deserialize)]
pub struct GrantPlanPayload {
    pub email: String,
    pub plan: String,
}

#[derive(Debug, Deserialize)]
pub struct SimulateCheckoutPayload {
    pub email: String,
    pub amount_total: Option<i64>,
    pub customer_id: Option<String>,
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/plan", post(grant_plan))
        .route("/simulate-checkout", post(simulate_checkout))
        .route("/stripe/events/{event_id}/replay", post(replay_event))
        .route("/config", get(config_summary))
        .route_layer(axum::middleware::from_fn_with_state(state, admin_gate))
}

fn outcome_json(outcome: &ReconcileOutcome) -> serde_json::Value {
    json!({
        "user_id": outcome.user_id,
        "email": outcome.email,
        "created": outcome.created,
        "previous_plan": outcome.previous_plan,
        "purchased_plan": outcome.purchased.plan,
        "plan": outcome.effective.plan,
        "credits": outcome.effective.credits,
        "plan_changed": outcome.plan_changed,
    })
}

async fn run_payment(app_state: &AppState, payment: PaymentEvent) -> Response {
    match app_state.entitlements.process_payment(&payment).await {
        Ok(SyncOutcome::Applied(outcome)) => Json(json!({
            "success": true,
            "outcome": outcome_json(&outcome),
        }))
        .into_response(),
        Ok(SyncOutcome::Duplicate) => {
            JsonResponse::success("Event was already applied").into_response()
        }
        Err(err) => {
            error!(?err, email = %payment.email, "admin-triggered entitlement update failed");
            JsonResponse::bad_gateway("Identity store unavailable").into_response()
        }
    }
}

// GET /api/admin/users
pub async fn list_users(State(app_state): State<AppState>) -> Response {
    match app_state.user_store.list_users().await {
        Ok(users) => {
            let users: Vec<UserSummary> = users.iter().map(UserSummary::from).collect();
            Json(json!({ "success": true, "total": users.len(), "users": users }))
                .into_response()
        }
        Err(err) => {
            error!(?err, "failed to list users");
            JsonResponse::bad_gateway("Identity store unavailable").into_response()
        }
    }
}

// POST /api/admin/users/plan
pub async fn grant_plan(
    State(app_state): State<AppState>,
    Json(payload): Json<GrantPlanPayload>,
) -> Response {
    let email = payload.email.trim();
    if email.is_empty() {
        return JsonResponse::bad_request("Email is required").into_response();
    }
    let Some(plan) = PlanTier::parse(&payload.plan) else {
        return JsonResponse::bad_request("Unknown plan").into_response();
    };

    info!(email, %plan, "admin plan grant");
    run_payment(&app_state, PaymentEvent::manual_grant(email, plan)).await
}

// POST /api/admin/simulate-checkout
pub async fn simulate_checkout(
    State(app_state): State<AppState>,
    Json(payload): Json<SimulateCheckoutPayload>,
) -> Response {
    let email = payload.email.trim();
    if email.is_empty() {
        return JsonResponse::bad_request("Email is required").into_response();
    }
    let amount = payload.amount_total.unwrap_or(0);

    info!(email, amount, "simulated checkout");
    let payment = PaymentEvent::checkout(None, email, amount, payload.customer_id);
    run_payment(&app_state, payment).await
}

// POST /api/admin/stripe/events/{event_id}/replay
pub async fn replay_event(
    State(app_state): State<AppState>,
    Path(event_id): Path<String>,
) -> Response {
    let evt = match app_state.stripe.retrieve_event(&event_id).await {
        Ok(evt) => evt,
        Err(StripeServiceError::NotFound(msg)) => {
            warn!(%event_id, %msg, "replay requested for unknown event");
            return JsonResponse::not_found("Stripe event not found").into_response();
        }
        Err(err) => {
            error!(?err, %event_id, "failed to fetch stripe event for replay");
            return JsonResponse::bad_gateway("Failed to fetch event from Stripe").into_response();
        }
    };

    info!(%event_id, evt_type = %evt.r#type, "replaying stripe event");
    handle_event(&app_state, &evt, None).await
}

// GET /api/admin/config
pub async fn config_summary(State(app_state): State<AppState>) -> Response {
    let config = &app_state.config;
    let secrets: Vec<_> = app_state
        .webhook_verifier
        .secrets()
        .iter()
        .map(|s| json!({ "label": s.label, "masked": s.masked() }))
        .collect();
    let prices: serde_json::Map<String, serde_json::Value> = PlanTier::ALL
        .into_iter()
        .filter(|p| p.is_paid())
        .map(|p| (p.as_str().to_string(), json!(config.stripe.price_for(p).is_some())))
        .collect();
    let retry = app_state.entitlements.retry_policy();

    Json(json!({
        "success": true,
        "webhook_secrets": secrets,
        "webhook_tolerance_seconds": config.stripe.webhook_tolerance_seconds,
        "supabase_url": config.supabase.url,
        "prices_configured": prices,
        "retry": {
            "max_attempts": retry.max_attempts,
            "initial_backoff_ms": retry.initial_backoff.as_millis() as u64,
            "max_backoff_ms": retry.max_backoff.as_millis() as u64,
        },
    }))
    .into_response()
}
