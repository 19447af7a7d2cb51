use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub geocache_path: PathBuf,
    pub geocoder_base_url: String,
    pub geocoder_user_agent: String,
    pub geocoder_country: String,
    pub geocoder_timeout_secs: u64,
    pub geocode_delay_ms: u64,
    pub cache_flush_every: usize,
    pub storage_commit_every: usize,
    pub facet_cache_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            geocache_path: std::env::var("GEOCACHE_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/geocache.json")),
            geocoder_base_url: std::env::var("GEOCODER_BASE_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string())
                .trim_end_matches('/')
                .to_string(),
            geocoder_user_agent: std::env::var("GEOCODER_USER_AGENT")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "ledax-mapa-etl/1.0".to_string()),
            geocoder_country: std::env::var("GEOCODER_COUNTRY")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "Brasil".to_string()),
            geocoder_timeout_secs: parse_number("GEOCODER_TIMEOUT_SECS", 10)?,
            geocode_delay_ms: parse_number("GEOCODE_DELAY_MS", 1000)?,
            cache_flush_every: parse_number("CACHE_FLUSH_EVERY", 100)?,
            storage_commit_every: parse_number("STORAGE_COMMIT_EVERY", 200)?,
            facet_cache_ttl_secs: parse_number("FACET_CACHE_TTL_SECS", 60)?,
        };

        config.validate()?;

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            config.database_url.chars().take(20).collect::<String>()
        );
        tracing::debug!("Geocoder Base URL: {}", config.geocoder_base_url);
        tracing::debug!("Geocache path: {}", config.geocache_path.display());
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Rejects values that would make the importer unusable.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.geocoder_base_url.starts_with("http://")
            && !self.geocoder_base_url.starts_with("https://")
        {
            anyhow::bail!("GEOCODER_BASE_URL must start with http:// or https://");
        }
        if self.geocoder_timeout_secs == 0 {
            anyhow::bail!("GEOCODER_TIMEOUT_SECS must be at least 1");
        }
        if self.cache_flush_every == 0 {
            anyhow::bail!("CACHE_FLUSH_EVERY must be at least 1");
        }
        if self.storage_commit_every == 0 {
            anyhow::bail!("STORAGE_COMMIT_EVERY must be at least 1");
        }
        Ok(())
    }

    pub fn geocode_delay(&self) -> Duration {
        Duration::from_millis(self.geocode_delay_ms)
    }

    pub fn geocoder_timeout(&self) -> Duration {
        Duration::from_secs(self.geocoder_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer", var)),
        _ => Ok(default),
    }
}
