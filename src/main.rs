use axum::{extract::DefaultBodyLimit, Router};
use moka::future::Cache;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kyc_onboard_api::config::Config;
use kyc_onboard_api::handlers::{self, AppState};
use kyc_onboard_api::orchestrator::KycOrchestrator;
use kyc_onboard_api::services::build_provider;
use kyc_onboard_api::store::KycStore;

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - KYC provider (live or simulated) and record store.
/// - In-flight application cache.
/// - HTTP routes and middleware (CORS, Rate Limiting, Body Limit).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kyc_onboard_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let provider = build_provider(&config)?;
    let store = Arc::new(KycStore::new());
    let orchestrator = KycOrchestrator::new(provider, store.clone())
        .reject_invalid_applications(config.reject_invalid_applications);
    tracing::info!("KYC orchestrator initialized");

    // Blocks concurrent applications for the same customer.
    // 5 minute TTL covers a stuck run; entries are removed when a run ends.
    let processing_customers = Cache::builder()
        .time_to_live(Duration::from_secs(300))
        .max_capacity(10_000)
        .build();

    let app_state = Arc::new(AppState {
        config: config.clone(),
        orchestrator,
        store,
        processing_customers,
    });

    // Per-IP rate limiter
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit_per_second)
            .burst_size(config.rate_limit_burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?,
    );

    let protected_routes = handlers::kyc_routes().layer(
        ServiceBuilder::new()
            // Multipart uploads are bounded by the body limit below instead
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check and index bypass rate limiting
    let app = Router::new()
        .merge(handlers::public_routes())
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
