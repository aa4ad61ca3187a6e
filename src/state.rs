use crate::config::Config;
use crate::services::entitlements::EntitlementSync;
use crate::services::stripe::{signature::WebhookVerifier, StripeService};
use crate::services::user_store::UserStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub user_store: Arc<dyn UserStore>,
    pub entitlements: Arc<EntitlementSync>,
    pub stripe: Arc<dyn StripeService>,
    pub webhook_verifier: Arc<WebhookVerifier>,
    pub config: Arc<Config>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::{RateLimitSettings, StripeSettings, SupabaseSettings};
    use crate::db::mock_audit_repository::MockAuditRepository;
    use crate::db::mock_stripe_event_log_repository::MockStripeEventLogRepository;
    use crate::services::stripe::signature::{WebhookSecrets, DEFAULT_TOLERANCE_SECONDS};
    use crate::services::stripe::MockStripeService;
    use crate::services::user_store::MockUserStore;
    use crate::utils::retry::RetryPolicy;

    pub const CLI_SECRET: &str = "whsec_cli_test";
    pub const PROD_SECRET: &str = "whsec_prod_test";
    pub const ADMIN_TOKEN: &str = "admin-test-token";

    pub fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/test".into(),
            frontend_origin: "https://mercado.test".into(),
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            admin_token: Some(ADMIN_TOKEN.into()),
            stripe: StripeSettings {
                secret_key: "sk_test_dummy".into(),
                webhook_secrets: WebhookSecrets::new()
                    .with("cli", CLI_SECRET)
                    .with("production", PROD_SECRET),
                webhook_tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
                price_plus: Some("price_plus".into()),
                price_pro: Some("price_pro".into()),
                price_premium: None,
                success_url: "https://mercado.test/?checkout=success".into(),
                cancel_url: "https://mercado.test/?checkout=cancelled".into(),
            },
            supabase: SupabaseSettings {
                url: "https://project.supabase.test".into(),
                service_role_key: "service-role".into(),
            },
            retry: RetryPolicy::immediate(3),
            rate_limit: RateLimitSettings::default(),
        }
    }

    /// Mocks behind an `AppState`, kept reachable for assertions.
    pub struct TestState {
        pub state: AppState,
        pub store: Arc<MockUserStore>,
        pub audit: Arc<MockAuditRepository>,
        pub event_log: Arc<MockStripeEventLogRepository>,
        pub stripe: Arc<MockStripeService>,
    }

    pub fn test_state_with(
        store: MockUserStore,
        stripe: MockStripeService,
        config: Config,
    ) -> TestState {
        let store = Arc::new(store);
        let audit = Arc::new(MockAuditRepository::default());
        let event_log = Arc::new(MockStripeEventLogRepository::default());
        let stripe = Arc::new(stripe);
        let entitlements = Arc::new(EntitlementSync::new(
            store.clone(),
            audit.clone(),
            event_log.clone(),
            config.retry,
        ));
        let verifier = WebhookVerifier::new(
            config.stripe.webhook_secrets.clone(),
            config.stripe.webhook_tolerance_seconds,
        );
        let state = AppState {
            user_store: store.clone(),
            entitlements,
            stripe: stripe.clone(),
            webhook_verifier: Arc::new(verifier),
            config: Arc::new(config),
        };
        TestState {
            state,
            store,
            audit,
            event_log,
            stripe,
        }
    }

    pub fn test_state(store: MockUserStore) -> TestState {
        test_state_with(store, MockStripeService::new(), test_config())
    }
}
