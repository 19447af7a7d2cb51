use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Pool used by the API server.
const SERVER_MAX_CONNECTIONS: u32 = 10;

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        Self::with_max_connections(database_url, SERVER_MAX_CONNECTIONS).await
    }

    /// Connects with a custom pool size. The import binaries write from a
    /// single task and only need one or two connections.
    pub async fn with_max_connections(
        database_url: &str,
        max_connections: u32,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        tracing::debug!("Connected to database (max {} connections)", max_connections);

        Ok(Self { pool })
    }
}
