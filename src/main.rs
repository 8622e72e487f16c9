mod config;
mod dispatcher;
mod errors;
mod formatter;
mod handlers;
mod models;
mod rate_limit;

use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dispatcher::EmailClient;
use crate::rate_limit::InMemoryCounterStore;

/// Main entry point for the application.
///
/// Initializes tracing, loads configuration (missing the email API key is
/// a hard startup error, so no request is ever accepted without a working
/// dispatcher), builds the email client and the admission guard, then
/// serves the Axum router.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alloggiati_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize the transactional email client
    let email_client = EmailClient::new(
        config.email_api_base_url.clone(),
        config.email_api_key.clone(),
        config.sender_name.clone(),
        config.sender_email.clone(),
        config.recipient_email.clone(),
    )
    .map_err(|e| anyhow::anyhow!("Failed to initialize email client: {}", e))?;
    tracing::info!("✓ Email client initialized: {}", config.email_api_base_url);

    // Admission guard: per-client submission counter with a resetting window
    let rate_limiter = Arc::new(InMemoryCounterStore::new(
        config.rate_limit_max,
        Duration::from_secs(config.rate_limit_window_secs),
    ));
    tracing::info!(
        "Rate limiter initialized: {} submissions per {}s window",
        config.rate_limit_max,
        config.rate_limit_window_secs
    );

    let port = config.port;
    let app_state = Arc::new(handlers::AppState {
        config,
        email_client,
        rate_limiter,
    });

    // Routes plus security layers
    let app = handlers::router(app_state)
        .layer(
            // Request size limit: submissions are small, 64KB is generous
            ServiceBuilder::new().layer(RequestBodyLimitLayer::new(64 * 1024)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
