use axum::{extract::State, http::HeaderMap, response::IntoResponse};
use axum::{http::StatusCode, response::Response};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::responses::{WebhookAck, WebhookError};
use crate::services::entitlements::{PaymentEvent, SyncOutcome};
use crate::services::stripe::StripeEvent;
use crate::state::AppState;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

// Small helper: nested json lookup
fn jget<'a>(val: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
    let mut cur = val;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

fn extract_str<'a>(val: &'a serde_json::Value, path: &[&str]) -> Option<&'a str> {
    jget(val, path)?.as_str()
}

fn extract_i64(val: &serde_json::Value, path: &[&str]) -> Option<i64> {
    jget(val, path)?.as_i64()
}

fn extract_email(event: &serde_json::Value) -> Option<String> {
    extract_str(event, &["data", "object", "customer_details", "email"])
        .or_else(|| extract_str(event, &["data", "object", "customer_email"]))
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(str::to_string)
}

fn extract_customer_id(event: &serde_json::Value) -> Option<String> {
    extract_str(event, &["data", "object", "customer"]).map(|s| s.to_string())
}

/// Normalises a checkout completion into a [`PaymentEvent`]. `None` when the
/// payload carries no payer email.
pub(crate) fn payment_from_checkout(evt: &StripeEvent) -> Option<PaymentEvent> {
    let payload = &evt.payload;
    let email = extract_email(payload)?;
    let amount = extract_i64(payload, &["data", "object", "amount_total"]).unwrap_or(0);
    let mut payment = PaymentEvent::checkout(
        Some(evt.id.clone()),
        email,
        amount,
        extract_customer_id(payload),
    );
    if let Some(paid_at) = extract_i64(payload, &["created"])
        .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
    {
        payment.paid_at = paid_at;
    }
    Some(payment)
}

// POST /api/stripe/webhook
pub async fn webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let sig = match headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        Some(s) => s,
        None => {
            return WebhookError::response(
                StatusCode::BAD_REQUEST,
                "Missing Stripe-Signature header",
                "webhook requests must be signed",
            )
        }
    };

    let verified = match app_state.webhook_verifier.verify(&body, sig) {
        Ok(v) => v,
        Err(err) => {
            warn!(?err, "stripe webhook verification failed");
            return WebhookError::response(
                StatusCode::BAD_REQUEST,
                "Webhook signature verification failed",
                err,
            );
        }
    };

    info!(
        event_id = %verified.event.id,
        evt_type = %verified.event.r#type,
        secret_used = %verified.secret_used,
        "verified stripe webhook"
    );
    handle_event(&app_state, &verified.event, Some(&verified.secret_used)).await
}

/// Dispatches a verified (or provider-fetched) event.
pub(crate) async fn handle_event(
    app_state: &AppState,
    evt: &StripeEvent,
    secret_used: Option<&str>,
) -> Response {
    let evt_type = evt.r#type.as_str();
    if evt_type != CHECKOUT_SESSION_COMPLETED {
        debug!(evt_type, event_id = %evt.id, "ignoring stripe event type");
        return WebhookAck::new(secret_used)
            .with_note("event type ignored")
            .into_response();
    }

    let payment = match payment_from_checkout(evt) {
        Some(p) => p,
        None => {
            warn!(event_id = %evt.id, "checkout.session.completed without customer email");
            return WebhookAck::new(secret_used)
                .with_note("missing customer email")
                .into_response();
        }
    };

    match app_state.entitlements.process_payment(&payment).await {
        Ok(SyncOutcome::Duplicate) => WebhookAck::new(secret_used)
            .with_note("duplicate event")
            .into_response(),
        Ok(SyncOutcome::Applied(outcome)) => {
            info!(
                event_id = %evt.id,
                user_id = %outcome.user_id,
                plan = %outcome.effective.plan,
                "checkout completion applied"
            );
            WebhookAck::new(secret_used).into_response()
        }
        Err(err) => {
            error!(?err, event_id = %evt.id, "failed to apply checkout completion");
            WebhookError::response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to apply entitlement",
                err,
            )
        }
    }
}
