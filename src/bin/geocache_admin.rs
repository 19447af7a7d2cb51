//! Geocode cache maintenance.
//!
//! Cached misses never expire on their own; this is the manual way to let
//! the importer query them again.

use clap::{Parser, Subcommand};
use ledax_mapa::data::geocache::{CacheKey, GeoCache};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "geocache_admin", about = "Inspect and prune the geocode cache")]
struct Args {
    /// Cache file
    #[arg(long, env = "GEOCACHE_PATH", default_value = "data/geocache.json")]
    cache: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Entry counts
    Stats,
    /// Remove every cached miss
    PurgeMisses,
    /// Remove one entry, e.g. `CEP::01310100`
    Forget { key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cache = GeoCache::load(&args.cache).await;

    match args.command {
        Command::Stats => {
            println!("Cache file: {}", cache.path().display());
            println!("  entries:  {}", cache.len());
            println!("  resolved: {}", cache.positive_count());
            println!("  misses:   {}", cache.negative_count());
        }
        Command::PurgeMisses => {
            let purged = cache.purge_negative();
            cache.save().await?;
            tracing::info!("Removed {} cached misses, {} entries left", purged, cache.len());
        }
        Command::Forget { key } => {
            let key = CacheKey::from_raw(key);
            match cache.remove(&key) {
                Some(entry) => {
                    cache.save().await?;
                    tracing::info!("Removed {} (query '{}')", key, entry.query);
                }
                None => anyhow::bail!("no cache entry for {}", key),
            }
        }
    }

    Ok(())
}
