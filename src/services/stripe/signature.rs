//! Stripe webhook signature checking against an ordered list of endpoint
//! secrets.
//!
//! One deployment receives events from both the Stripe CLI forwarder and the
//! production endpoint, each signed with its own secret. Candidates are tried
//! in order and the first one that validates wins.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::OffsetDateTime;

use super::{StripeEvent, StripeServiceError};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;
const SIGNATURE_SCHEME: &str = "v1";

#[derive(Clone)]
pub struct WebhookSecret {
    pub label: String,
    secret: String,
}

impl WebhookSecret {
    /// Last four characters, for diagnostics.
    pub fn masked(&self) -> String {
        let tail: String = self
            .secret
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("…{}", tail)
    }
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSecret")
            .field("label", &self.label)
            .field("secret", &self.masked())
            .finish()
    }
}

/// Ordered candidate secrets. Empty secrets are dropped on insert.
#[derive(Clone, Debug, Default)]
pub struct WebhookSecrets(Vec<WebhookSecret>);

impl WebhookSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: impl Into<String>, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.trim().is_empty() {
            self.0.push(WebhookSecret {
                label: label.into(),
                secret,
            });
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WebhookSecret> {
        self.0.iter()
    }
}

#[derive(Debug, Clone)]
pub struct VerifiedEvent {
    pub event: StripeEvent,
    pub secret_used: String,
}

#[derive(Debug)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, StripeServiceError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            SIGNATURE_SCHEME => signatures.push(value.to_string()),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or_else(|| {
        StripeServiceError::Webhook("signature header is missing a timestamp".into())
    })?;
    if signatures.is_empty() {
        return Err(StripeServiceError::Webhook(
            "signature header has no v1 signatures".into(),
        ));
    }
    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`, the value Stripe puts in `v1=`.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Clone, Debug)]
pub struct WebhookVerifier {
    secrets: WebhookSecrets,
    tolerance_seconds: i64,
}

impl WebhookVerifier {
    pub fn new(secrets: WebhookSecrets, tolerance_seconds: i64) -> Self {
        Self {
            secrets,
            tolerance_seconds,
        }
    }

    pub fn secrets(&self) -> &WebhookSecrets {
        &self.secrets
    }

    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<VerifiedEvent, StripeServiceError> {
        self.verify_at(payload, signature_header, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<VerifiedEvent, StripeServiceError> {
        let header = parse_header(signature_header)?;
        let tolerance = u64::try_from(self.tolerance_seconds).unwrap_or(0);
        if now.abs_diff(header.timestamp) > tolerance {
            return Err(StripeServiceError::Webhook(format!(
                "timestamp {} outside the {}s tolerance",
                header.timestamp, self.tolerance_seconds
            )));
        }

        let mut last_err =
            StripeServiceError::Config("no webhook secrets configured".to_string());
        for candidate in self.secrets.iter() {
            let expected = compute_signature(&candidate.secret, header.timestamp, payload);
            let matched = header.signatures.iter().any(|provided| {
                subtle::ConstantTimeEq::ct_eq(expected.as_bytes(), provided.as_bytes())
                    .unwrap_u8()
                    == 1u8
            });
            if matched {
                let event = parse_event(payload)?;
                return Ok(VerifiedEvent {
                    event,
                    secret_used: candidate.label.clone(),
                });
            }
            last_err = StripeServiceError::Webhook(format!(
                "no signatures found matching the expected signature for the {} secret",
                candidate.label
            ));
        }
        Err(last_err)
    }
}

/// Parses a raw event body into the fields the handlers consume.
pub fn parse_event(payload: &[u8]) -> Result<StripeEvent, StripeServiceError> {
    let val: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
    let id = val
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| StripeServiceError::Serde("event is missing an id".into()))?
        .to_string();
    let ty = val
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    Ok(StripeEvent {
        id,
        r#type: ty,
        payload: val,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const BODY: &[u8] = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(
            WebhookSecrets::new()
                .with("cli", "whsec_cli")
                .with("production", "whsec_prod"),
            DEFAULT_TOLERANCE_SECONDS,
        )
    }

    fn header(secret: &str, ts: i64, body: &[u8]) -> String {
        format!("t={},v1={}", ts, compute_signature(secret, ts, body))
    }

    #[test]
    fn production_signature_reports_production_secret() {
        let verified = verifier()
            .verify_at(BODY, &header("whsec_prod", NOW, BODY), NOW)
            .unwrap();
        assert_eq!(verified.secret_used, "production");
        assert_eq!(verified.event.id, "evt_1");
        assert_eq!(verified.event.r#type, "checkout.session.completed");
    }

    #[test]
    fn cli_signature_wins_first() {
        let verified = verifier()
            .verify_at(BODY, &header("whsec_cli", NOW, BODY), NOW)
            .unwrap();
        assert_eq!(verified.secret_used, "cli");
    }

    #[test]
    fn any_of_several_v1_entries_may_match() {
        let sig = compute_signature("whsec_prod", NOW, BODY);
        let hdr = format!("t={NOW},v1=deadbeef,v0=ignored,v1={sig}");
        assert!(verifier().verify_at(BODY, &hdr, NOW).is_ok());
    }

    #[test]
    fn unknown_secret_surfaces_last_failure() {
        let err = verifier()
            .verify_at(BODY, &header("whsec_other", NOW, BODY), NOW)
            .unwrap_err();
        match err {
            StripeServiceError::Webhook(msg) => assert!(msg.contains("production")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn tampered_body_is_rejected() {
        let hdr = header("whsec_prod", NOW, BODY);
        let tampered = br#"{"id":"evt_1","type":"checkout.session.completed","x":1}"#;
        assert!(verifier().verify_at(tampered, &hdr, NOW).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let old = NOW - DEFAULT_TOLERANCE_SECONDS - 1;
        let err = verifier()
            .verify_at(BODY, &header("whsec_prod", old, BODY), NOW)
            .unwrap_err();
        assert!(matches!(err, StripeServiceError::Webhook(_)));
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(verifier().verify_at(BODY, "garbage", NOW).is_err());
        assert!(verifier().verify_at(BODY, "t=abc,v1=00", NOW).is_err());
        assert!(verifier().verify_at(BODY, &format!("t={NOW}"), NOW).is_err());
    }

    #[test]
    fn extreme_timestamps_are_rejected_without_overflow() {
        for ts in [i64::MIN, i64::MAX] {
            let header = format!("t={ts},v1=00");
            let err = verifier().verify_at(BODY, &header, NOW).unwrap_err();
            assert!(matches!(err, StripeServiceError::Webhook(_)));
        }
        let err = verifier()
            .verify_at(BODY, "t=1,v1=00", i64::MAX)
            .unwrap_err();
        assert!(matches!(err, StripeServiceError::Webhook(_)));
    }

    #[test]
    fn no_candidates_is_a_config_error() {
        let empty = WebhookVerifier::new(
            WebhookSecrets::new().with("production", "  "),
            DEFAULT_TOLERANCE_SECONDS,
        );
        assert!(empty.secrets().is_empty());
        let err = empty
            .verify_at(BODY, &header("whsec_prod", NOW, BODY), NOW)
            .unwrap_err();
        assert!(matches!(err, StripeServiceError::Config(_)));
    }

    #[test]
    fn masked_secret_shows_only_tail() {
        let secrets = WebhookSecrets::new().with("production", "whsec_abcdef");
        let first = secrets.iter().next().unwrap();
        assert_eq!(first.masked(), "…cdef");
        assert!(!format!("{first:?}").contains("whsec_abcdef"));
    }
}
