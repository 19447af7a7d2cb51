//! Batch import: spreadsheet export -> geocoding -> lead store.
//!
//! Replaces every stored lead with the contents of the spreadsheet. The
//! geocode cache file survives between runs, so re-running only pays for
//! locations never seen before.

use clap::Parser;
use ledax_mapa::config::Config;
use ledax_mapa::core::pipeline::{EnrichmentPipeline, PipelineOptions};
use ledax_mapa::core::resolution::GeoResolver;
use ledax_mapa::data::db::Database;
use ledax_mapa::data::db_storage::LeadStorage;
use ledax_mapa::data::geocache::GeoCache;
use ledax_mapa::data::spreadsheet::read_lead_rows;
use ledax_mapa::integrations::geocoder::NominatimGeocoder;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "import_leads", about = "Geocode the leads spreadsheet into the database")]
struct Args {
    /// Spreadsheet export (CSV, `;` or `,` delimited)
    #[arg(long, env = "SPREADSHEET_PATH")]
    input: PathBuf,

    /// Geocode cache file; defaults to GEOCACHE_PATH
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Drop cached misses before the run so they are queried again
    #[arg(long)]
    retry_misses: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loaded before argument parsing so SPREADSHEET_PATH can come from .env
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    // Fail on a bad spreadsheet before touching the store
    let rows = read_lead_rows(&args.input).await?;

    let cache_path = args.cache.unwrap_or_else(|| config.geocache_path.clone());
    let mut cache = GeoCache::load(&cache_path).await;
    if args.retry_misses {
        let purged = cache.purge_negative();
        tracing::info!("Dropped {} cached misses", purged);
    }

    let db = Database::with_max_connections(&config.database_url, 2).await?;
    let storage = LeadStorage::new(db.pool.clone());
    storage.reset_schema().await?;

    let geocoder = NominatimGeocoder::from_config(&config)?;
    let resolver = GeoResolver::new(cache, geocoder, config.geocode_delay());
    let mut pipeline =
        EnrichmentPipeline::new(resolver, storage, PipelineOptions::from_config(&config));

    let summary = pipeline.run(&rows).await?;
    let stats = &summary.resolution;

    tracing::info!(
        "Done: {} rows, {} stored, {} geocoded, {} without location",
        summary.total_rows,
        summary.stored,
        summary.geocoded,
        summary.without_location
    );
    tracing::info!(
        "Resolution: {} cache hits, {} negative skips, {} remote calls",
        stats.cache_hits,
        stats.negative_skips,
        stats.remote_calls
    );

    Ok(())
}
