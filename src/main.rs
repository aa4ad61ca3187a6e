use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::response::IntoResponse;
use mercado_billing::{
    config::Config,
    db::{
        audit_repository::AuditRepository,
        postgres_audit_repository::PostgresAuditRepository,
        postgres_stripe_event_log_repository::PostgresStripeEventLogRepository,
        stripe_event_log_repository::StripeEventLogRepository,
        MIGRATOR,
    },
    responses::JsonResponse,
    routes::app_router,
    services::{
        entitlements::EntitlementSync,
        stripe::{signature::WebhookVerifier, LiveStripeService, StripeService},
        user_store::{SupabaseUserStore, UserStore},
    },
    utils::admin_auth::ADMIN_TOKEN_HEADER,
    AppState,
};
use reqwest::Client;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "tls")]
use axum_server::tls_rustls::RustlsConfig;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env().context("invalid configuration")?;

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(config.rate_limit.per_millisecond)
            .burst_size(config.rate_limit.burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .context("invalid rate limiter configuration")?,
    );

    // Background task to cleanup old IPs
    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let pg_pool = establish_connection(&config.database_url).await?;
    let audit_repo = Arc::new(PostgresAuditRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn AuditRepository>;
    let event_log_repo = Arc::new(PostgresStripeEventLogRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn StripeEventLogRepository>;

    let http_client = Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .context("failed to build http client")?;
    let user_store =
        Arc::new(SupabaseUserStore::from_settings(http_client, &config.supabase)) as Arc<dyn UserStore>;
    let stripe = Arc::new(LiveStripeService::from_settings(&config.stripe)) as Arc<dyn StripeService>;
    let webhook_verifier = Arc::new(WebhookVerifier::new(
        config.stripe.webhook_secrets.clone(),
        config.stripe.webhook_tolerance_seconds,
    ));
    let entitlements = Arc::new(EntitlementSync::new(
        user_store.clone(),
        audit_repo,
        event_log_repo,
        config.retry,
    ));

    let labels: Vec<&str> = config
        .stripe
        .webhook_secrets
        .iter()
        .map(|s| s.label.as_str())
        .collect();
    info!(
        secrets = ?labels,
        admin_enabled = config.admin_token.is_some(),
        max_attempts = config.retry.max_attempts,
        "billing service configured"
    );

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_origin
                .parse::<HeaderValue>()
                .context("FRONTEND_ORIGIN is not a valid header value")?,
        )
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(ADMIN_TOKEN_HEADER),
        ]);

    let addr = config.bind_addr;
    let state = AppState {
        user_store,
        entitlements,
        stripe,
        webhook_verifier,
        config: Arc::new(config),
    };

    let app = app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer {
            config: governor_conf,
        })
        .layer(cors);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    #[cfg(feature = "tls")]
    {
        // TLS: Only run this block when `--features tls` is used
        let tls_config = RustlsConfig::from_pem_file(
            std::env::var("DEV_CERT_LOCATION").context("DEV_CERT_LOCATION must be set")?,
            std::env::var("DEV_KEY_LOCATION").context("DEV_KEY_LOCATION must be set")?,
        )
        .await
        .context("failed to load TLS certs")?;

        info!(%addr, "listening with TLS");
        axum_server::bind_rustls(addr, tls_config)
            .serve(make_service)
            .await?;
        return Ok(());
    }

    #[allow(unreachable_code)]
    {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!(%addr, "listening without TLS");
        axum::serve(listener, make_service).await?;
        Ok(())
    }
}

/// Establish a connection to the database, verify it and apply migrations.
async fn establish_connection(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to the database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("failed to verify database connection")?;
    info!("successfully connected to the database");

    MIGRATOR
        .run(&pool)
        .await
        .context("failed to apply database migrations")?;
    info!(
        migrations = MIGRATOR.iter().count(),
        "database schema is up to date"
    );
    Ok(pool)
}
