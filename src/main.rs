use axum::{routing::get, Router};
use ledax_mapa::config::Config;
use ledax_mapa::data::{db::Database, db_storage::LeadStorage};
use ledax_mapa::handlers::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the lead map API.
///
/// Initializes logging, loads configuration, connects to the database,
/// makes sure the `leads` table exists and serves the read-only API:
/// - `GET /health`
/// - `GET /api/v1/leads`
/// - `GET /api/v1/leads/filter`
/// - `GET /api/v1/leads/:id`
/// - `GET /api/v1/filters`
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledax_mapa=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // The server never writes leads, but an empty deployment should still answer
    LeadStorage::new(db.pool.clone()).ensure_schema().await?;

    let app_state = Arc::new(AppState::new(db.pool.clone(), config.clone()));
    tracing::info!(
        "Facet cache initialized ({}s TTL)",
        config.facet_cache_ttl_secs
    );

    // 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    let protected_routes = Router::new()
        .route("/api/v1/leads", get(handlers::list_leads))
        .route("/api/v1/leads/filter", get(handlers::filter_leads))
        .route("/api/v1/leads/:id", get(handlers::get_lead))
        .route("/api/v1/filters", get(handlers::get_facets))
        .layer(
            ServiceBuilder::new()
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

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
