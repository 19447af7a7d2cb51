use crate::config::Config;
use crate::db_storage::LeadStorage;
use crate::errors::AppError;
use crate::models::{FacetValues, Lead, LeadFilters};
use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    Json,
};
use moka::future::Cache;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Lead queries over the pool.
    pub storage: LeadStorage,
    /// Facet responses keyed by canonical filter set. The store only changes on
    /// a full import, so a short TTL is enough to pick up new data.
    pub facet_cache: Cache<String, FacetValues>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let facet_cache = Cache::builder()
            .time_to_live(Duration::from_secs(config.facet_cache_ttl_secs))
            .max_capacity(1_000)
            .build();

        Self {
            storage: LeadStorage::new(db.clone()),
            db,
            config,
            facet_cache,
        }
    }
}

/// Health check endpoint.
///
/// Returns the service status, version, and whether the database answers.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "up",
        Err(e) => {
            tracing::warn!("Health check database probe failed: {}", e);
            "down"
        }
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "ledax-mapa",
            "version": env!("CARGO_PKG_VERSION"),
            "database": database
        })),
    )
}

/// GET /api/v1/leads
///
/// Every stored lead, unfiltered.
pub async fn list_leads(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Lead>>, AppError> {
    let leads = state.storage.list_all().await?;
    tracing::info!("GET /leads - {} leads", leads.len());
    Ok(Json(leads))
}

/// GET /api/v1/leads/filter
///
/// Leads matching the filter set. Multi-valued filters repeat their key.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `query` - Raw query string (`network`, `client_type`, `funnel`,
///   `representative`, `region`, `owner`, `date_from`, `date_to`, `search`).
///
/// # Returns
///
/// * `Result<Json<Vec<Lead>>, AppError>` - Matching leads, or 400 on a malformed date.
pub async fn filter_leads(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<Lead>>, AppError> {
    let filters = LeadFilters::from_query(query.as_deref())?;
    tracing::info!("GET /leads/filter - filters: {:?}", filters);

    let leads = state.storage.list_filtered(&filters).await?;
    Ok(Json(leads))
}

/// GET /api/v1/leads/:id
pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Lead>, AppError> {
    let lead = state
        .storage
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead with id {} not found", id)))?;
    Ok(Json(lead))
}

/// GET /api/v1/filters
///
/// Cascading facets: distinct values of each categorical field among the
/// leads that match the current filter set.
pub async fn get_facets(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<FacetValues>, AppError> {
    let filters = LeadFilters::from_query(query.as_deref())?;
    let cache_key = filters.cache_key();

    if let Some(cached) = state.facet_cache.get(&cache_key).await {
        tracing::debug!("Facet cache hit");
        return Ok(Json(cached));
    }

    let facets = state.storage.facets(&filters).await?;
    state.facet_cache.insert(cache_key, facets.clone()).await;

    Ok(Json(facets))
}
