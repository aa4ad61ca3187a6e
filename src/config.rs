use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::models::plan::PlanTier;
use crate::services::stripe::signature::{WebhookSecrets, DEFAULT_TOLERANCE_SECONDS};
use crate::utils::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secrets: WebhookSecrets,
    pub webhook_tolerance_seconds: i64,
    pub price_plus: Option<String>,
    pub price_pro: Option<String>,
    pub price_premium: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

impl StripeSettings {
    pub fn price_for(&self, plan: PlanTier) -> Option<&str> {
        match plan {
            PlanTier::Free => None,
            PlanTier::Plus => self.price_plus.as_deref(),
            PlanTier::Pro => self.price_pro.as_deref(),
            PlanTier::Premium => self.price_premium.as_deref(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SupabaseSettings {
    pub url: String,
    pub service_role_key: String,
}

/// Global request rate limit: one token every `per_millisecond` ms, `burst` deep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub per_millisecond: u64,
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        // ~5 req/sec with short bursts for webhook redeliveries
        Self {
            per_millisecond: 200,
            burst: 20,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub bind_addr: SocketAddr,
    pub admin_token: Option<String>,
    pub stripe: StripeSettings,
    pub supabase: SupabaseSettings,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = required("DATABASE_URL")?;
        let frontend_origin = optional("FRONTEND_ORIGIN")
            .unwrap_or_else(|| "http://localhost:3000".to_string());
        let bind_addr = match optional("BIND_ADDR") {
            Some(raw) => raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?,
            None => SocketAddr::from(([127, 0, 0, 1], 8080)),
        };

        // CLI-forwarded events first, then the production endpoint.
        let webhook_secrets = WebhookSecrets::new()
            .with("cli", optional("STRIPE_WEBHOOK_SECRET_CLI").unwrap_or_default())
            .with("production", optional("STRIPE_WEBHOOK_SECRET").unwrap_or_default());
        if webhook_secrets.is_empty() {
            return Err(ConfigError::Missing(
                "STRIPE_WEBHOOK_SECRET or STRIPE_WEBHOOK_SECRET_CLI",
            ));
        }

        let stripe = StripeSettings {
            secret_key: required("STRIPE_SECRET_KEY")?,
            webhook_secrets,
            webhook_tolerance_seconds: parsed("WEBHOOK_TOLERANCE_SECONDS")?
                .unwrap_or(DEFAULT_TOLERANCE_SECONDS),
            price_plus: optional("STRIPE_PRICE_PLUS"),
            price_pro: optional("STRIPE_PRICE_PRO"),
            price_premium: optional("STRIPE_PRICE_PREMIUM"),
            success_url: optional("CHECKOUT_SUCCESS_URL")
                .unwrap_or_else(|| format!("{}/?checkout=success", frontend_origin)),
            cancel_url: optional("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|| format!("{}/?checkout=cancelled", frontend_origin)),
        };

        let supabase = SupabaseSettings {
            url: required("SUPABASE_URL")?,
            service_role_key: required("SUPABASE_SERVICE_ROLE_KEY")?,
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy::new(
            parsed("RECONCILE_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            parsed::<u64>("RECONCILE_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_backoff),
        );

        let rate_defaults = RateLimitSettings::default();
        let rate_limit = RateLimitSettings {
            per_millisecond: parsed("RATE_LIMITER_MILLISECONDS")?
                .unwrap_or(rate_defaults.per_millisecond),
            burst: parsed("RATE_LIMITER_BURST")?.unwrap_or(rate_defaults.burst),
        };
        if rate_limit.per_millisecond == 0 {
            return Err(ConfigError::Invalid {
                name: "RATE_LIMITER_MILLISECONDS",
                reason: "must be positive".to_string(),
            });
        }
        if rate_limit.burst == 0 {
            return Err(ConfigError::Invalid {
                name: "RATE_LIMITER_BURST",
                reason: "must be positive".to_string(),
            });
        }

        Ok(Config {
            database_url,
            frontend_origin,
            bind_addr,
            admin_token: optional("ADMIN_TOKEN"),
            stripe,
            supabase,
            retry,
            rate_limit,
        })
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional(name)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })
        })
        .transpose()
}
