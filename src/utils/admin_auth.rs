use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::responses::JsonResponse;
use crate::state::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn token_matches(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() == 1
}

/// Guards the operational endpoints. With no `ADMIN_TOKEN` configured the
/// whole surface is closed.
pub async fn admin_gate(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Err(JsonResponse::forbidden("Admin endpoints are disabled").into_response());
    };

    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(token) if token_matches(expected, token) => Ok(next.run(req).await),
        Some(_) => {
            warn!(path = %req.uri().path(), "rejected admin request with wrong token");
            Err(JsonResponse::unauthorized("Invalid admin token").into_response())
        }
        None => Err(JsonResponse::unauthorized("Admin token is required").into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison_requires_exact_match() {
        assert!(token_matches("abc123", "abc123"));
        assert!(!token_matches("abc123", "abc124"));
        assert!(!token_matches("abc123", "abc1234"));
        assert!(!token_matches("abc123", ""));
    }
}
