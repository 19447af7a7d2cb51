use crate::errors::{AppError, ResultExt};
use crate::models::{FacetField, FacetValues, Lead, LeadFilters, NewLead};
use crate::pipeline::LeadSink;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

/// Rows per INSERT statement; keeps bind parameters well under the protocol limit.
const INSERT_CHUNK: usize = 1000;

const LEAD_COLUMNS: &str = "id, title, network, sale_date, client_type, funnel, representative, \
     owner, region, sale_value, delivery_location, client_address, city, state, postal_code, \
     geocoded_address, geocoded_city, geocoded_state, latitude, longitude, created_at";

/// Database storage for enriched leads
#[derive(Clone)]
pub struct LeadStorage {
    pool: PgPool,
}

impl LeadStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `leads` table and its indexes if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS leads (
                id BIGSERIAL PRIMARY KEY,
                title TEXT,
                network TEXT,
                sale_date DATE,
                client_type TEXT,
                funnel TEXT,
                representative TEXT,
                owner TEXT,
                region TEXT,
                sale_value NUMERIC,
                delivery_location TEXT,
                client_address TEXT,
                city TEXT,
                state TEXT,
                postal_code TEXT,
                geocoded_address TEXT,
                geocoded_city TEXT,
                geocoded_state TEXT,
                latitude DOUBLE PRECISION,
                longitude DOUBLE PRECISION,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("creating leads table")?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS leads_network_idx ON leads (network)",
            "CREATE INDEX IF NOT EXISTS leads_sale_date_idx ON leads (sale_date)",
            "CREATE INDEX IF NOT EXISTS leads_region_idx ON leads (region)",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("creating leads index")?;
        }

        Ok(())
    }

    /// Drops and recreates the store; a full import replaces every lead.
    pub async fn reset_schema(&self) -> Result<(), AppError> {
        sqlx::query("DROP TABLE IF EXISTS leads")
            .execute(&self.pool)
            .await
            .context("dropping leads table")?;
        self.ensure_schema().await?;
        tracing::info!("Leads table reset");
        Ok(())
    }

    /// Inserts a batch of leads in one transaction.
    pub async fn insert_leads(&self, leads: &[NewLead]) -> Result<u64, AppError> {
        if leads.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;
        let mut written = 0;

        for chunk in leads.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO leads (title, network, sale_date, client_type, funnel, representative, \
                 owner, region, sale_value, delivery_location, client_address, city, state, \
                 postal_code, geocoded_address, geocoded_city, geocoded_state, latitude, longitude) ",
            );
            qb.push_values(chunk, |mut row, lead| {
                row.push_bind(lead.title.clone())
                    .push_bind(lead.network.clone())
                    .push_bind(lead.sale_date)
                    .push_bind(lead.client_type.clone())
                    .push_bind(lead.funnel.clone())
                    .push_bind(lead.representative.clone())
                    .push_bind(lead.owner.clone())
                    .push_bind(lead.region.clone())
                    .push_bind(lead.sale_value.clone())
                    .push_bind(lead.delivery_location.clone())
                    .push_bind(lead.client_address.clone())
                    .push_bind(lead.city.clone())
                    .push_bind(lead.state.clone())
                    .push_bind(lead.postal_code.clone())
                    .push_bind(lead.geocoded_address.clone())
                    .push_bind(lead.geocoded_city.clone())
                    .push_bind(lead.geocoded_state.clone())
                    .push_bind(lead.latitude)
                    .push_bind(lead.longitude);
            });

            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .context("inserting leads")?;
            written += result.rows_affected();
        }

        tx.commit().await.map_err(AppError::DatabaseError)?;
        tracing::debug!("Inserted {} leads", written);
        Ok(written)
    }

    /// All stored leads.
    pub async fn list_all(&self) -> Result<Vec<Lead>, AppError> {
        self.list_filtered(&LeadFilters::default()).await
    }

    /// One lead by id.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>(&format!(
            "SELECT {} FROM leads WHERE id = $1",
            LEAD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("loading lead")?;
        Ok(lead)
    }

    /// Leads matching the filter set, in insertion order.
    pub async fn list_filtered(&self, filters: &LeadFilters) -> Result<Vec<Lead>, AppError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM leads WHERE TRUE", LEAD_COLUMNS));
        push_filters(&mut qb, filters);
        qb.push(" ORDER BY id");

        let leads = qb
            .build_query_as::<Lead>()
            .fetch_all(&self.pool)
            .await
            .context("listing leads")?;
        Ok(leads)
    }

    /// Sorted distinct non-blank values of one facet under the filter set.
    pub async fn distinct_values(
        &self,
        field: FacetField,
        filters: &LeadFilters,
    ) -> Result<Vec<String>, AppError> {
        let column = field.column();
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT DISTINCT {} FROM leads WHERE TRUE", column));
        push_filters(&mut qb, filters);
        qb.push(format!(
            " AND {col} IS NOT NULL AND {col} <> '' ORDER BY {col}",
            col = column
        ));

        let values = qb
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("listing distinct {}", column))?;
        Ok(values)
    }

    /// Cascading facets: every facet computed under the same filter set.
    pub async fn facets(&self, filters: &LeadFilters) -> Result<FacetValues, AppError> {
        let mut facets = FacetValues::default();
        for field in FacetField::ALL {
            let values = self.distinct_values(field, filters).await?;
            facets.set(field, values);
        }
        Ok(facets)
    }
}

#[async_trait]
impl LeadSink for LeadStorage {
    async fn insert_batch(&mut self, leads: &[NewLead]) -> Result<u64, AppError> {
        self.insert_leads(leads).await
    }
}

/// Appends the WHERE clauses for a filter set. Expects the query to already
/// contain a `WHERE` clause.
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &LeadFilters) {
    let memberships = [
        ("network", &filters.network),
        ("client_type", &filters.client_type),
        ("funnel", &filters.funnel),
        ("representative", &filters.representative),
        ("region", &filters.region),
        ("owner", &filters.owner),
    ];
    for (column, values) in memberships {
        if values.is_empty() {
            continue;
        }
        qb.push(format!(" AND {} = ANY(", column));
        qb.push_bind(values.clone());
        qb.push(")");
    }

    if let Some(from) = filters.date_from {
        qb.push(" AND sale_date >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filters.date_to {
        qb.push(" AND sale_date <= ");
        qb.push_bind(to);
    }

    if let Some(search) = filters.search.as_deref() {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (");
        for (i, column) in SEARCH_COLUMNS.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(format!("{} ILIKE ", column));
            qb.push_bind(pattern.clone());
        }
        qb.push(")");
    }
}

const SEARCH_COLUMNS: [&str; 7] = [
    "title",
    "client_address",
    "delivery_location",
    "geocoded_address",
    "city",
    "state",
    "network",
];

/// Escapes LIKE wildcards so user input matches literally.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
