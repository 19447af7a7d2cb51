/// Record enrichment pipeline
///
/// Walks every spreadsheet row strictly in order:
/// 1. Normalize the raw fields (state code, postal code, date, value, region)
/// 2. Resolve the location through the priority resolver
/// 3. Hand enriched leads to storage in batches
/// 4. Checkpoint the geocode cache periodically and at the end
use crate::config::Config;
use crate::errors::AppError;
use crate::geocoder::Geocoder;
use crate::models::{LeadRow, NewLead};
use crate::normalize::{
    normalize_postal_code, normalize_state_code, parse_sale_date, parse_sale_value,
    region_for_state,
};
use crate::resolution::{GeoResolver, LocationFields, ResolutionStats, ResolvedLocation};
use async_trait::async_trait;
use serde::Serialize;

/// Storage collaborator receiving enriched leads.
#[async_trait]
pub trait LeadSink: Send {
    /// Persists one batch atomically; returns the number of rows written.
    async fn insert_batch(&mut self, leads: &[NewLead]) -> Result<u64, AppError>;
}

/// Checkpoint intervals, in processed records.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub cache_flush_every: usize,
    pub storage_commit_every: usize,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_flush_every: config.cache_flush_every,
            storage_commit_every: config.storage_commit_every,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            cache_flush_every: 100,
            storage_commit_every: 200,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub total_rows: usize,
    pub stored: u64,
    pub geocoded: usize,
    pub without_location: usize,
    pub resolution: ResolutionStats,
}

/// Extracts the location-bearing fields of a row, normalized.
pub fn location_fields(row: &LeadRow) -> LocationFields {
    LocationFields {
        address_override: row.address_override.clone(),
        delivery_location: row.delivery_location.clone(),
        client_address: row.client_address.clone(),
        postal_code: normalize_postal_code(row.postal_code.as_deref()),
        city: row.city.clone(),
        state: normalize_state_code(row.state.as_deref()),
    }
}

/// Assembles the enriched lead for a row and its resolution outcome.
pub fn enrich_row(row: &LeadRow, location: Option<ResolvedLocation>) -> NewLead {
    let state = normalize_state_code(row.state.as_deref());
    let region = state
        .as_deref()
        .and_then(region_for_state)
        .map(str::to_string);

    let (latitude, longitude, geocoded_address, geocoded_city, geocoded_state) = match location {
        Some(loc) => (
            Some(loc.latitude),
            Some(loc.longitude),
            Some(loc.geocoded_address),
            loc.city,
            loc.state,
        ),
        None => (None, None, None, None, None),
    };

    NewLead {
        title: row.title.clone(),
        network: row.network.clone(),
        sale_date: parse_sale_date(row.date.as_deref()),
        client_type: row.client_type.clone(),
        funnel: row.funnel.clone(),
        representative: row.representative.clone(),
        owner: row.owner.clone(),
        region,
        sale_value: parse_sale_value(row.sale_value.as_deref()),
        delivery_location: row.delivery_location.clone(),
        client_address: row.client_address.clone(),
        city: row.city.clone(),
        state,
        postal_code: normalize_postal_code(row.postal_code.as_deref()),
        geocoded_address,
        geocoded_city,
        geocoded_state,
        latitude,
        longitude,
    }
}

pub struct EnrichmentPipeline<G, S> {
    resolver: GeoResolver<G>,
    sink: S,
    options: PipelineOptions,
}

impl<G: Geocoder, S: LeadSink> EnrichmentPipeline<G, S> {
    pub fn new(resolver: GeoResolver<G>, sink: S, options: PipelineOptions) -> Self {
        Self {
            resolver,
            sink,
            options: PipelineOptions {
                cache_flush_every: options.cache_flush_every.max(1),
                storage_commit_every: options.storage_commit_every.max(1),
            },
        }
    }

    /// Processes every row. Only storage failures and the final cache flush
    /// abort the run; the cache is flushed before a storage error propagates.
    pub async fn run(&mut self, rows: &[LeadRow]) -> Result<PipelineSummary, AppError> {
        let total = rows.len();
        tracing::info!(
            "Importing {} rows (geocode cache: {} entries)",
            total,
            self.resolver.cache().len()
        );

        let mut summary = PipelineSummary {
            total_rows: total,
            ..Default::default()
        };
        let mut batch: Vec<NewLead> = Vec::with_capacity(self.options.storage_commit_every);

        for (idx, row) in rows.iter().enumerate() {
            let fields = location_fields(row);
            let location = self.resolver.resolve_for_record(&fields).await;
            match location {
                Some(_) => summary.geocoded += 1,
                None => {
                    summary.without_location += 1;
                    tracing::debug!("[{}/{}] No location for {:?}", idx + 1, total, row.title);
                }
            }
            batch.push(enrich_row(row, location));

            let processed = idx + 1;
            if processed % self.options.storage_commit_every == 0 {
                summary.stored += self.commit(&mut batch).await?;
                tracing::info!(
                    "[{}/{}] Committed, {} geocoded so far",
                    processed,
                    total,
                    summary.geocoded
                );
            }
            if processed % self.options.cache_flush_every == 0 {
                if let Err(e) = self.resolver.flush().await {
                    tracing::error!("Geocode cache checkpoint failed: {}", e);
                }
            }
        }

        summary.stored += self.commit(&mut batch).await?;
        self.resolver.flush().await?;
        summary.resolution = self.resolver.stats().clone();

        tracing::info!(
            "Import complete: {} rows, {} stored, {} geocoded, {} without location (cache: {} entries, {} remote calls)",
            summary.total_rows,
            summary.stored,
            summary.geocoded,
            summary.without_location,
            self.resolver.cache().len(),
            summary.resolution.remote_calls
        );

        Ok(summary)
    }

    async fn commit(&mut self, batch: &mut Vec<NewLead>) -> Result<u64, AppError> {
        if batch.is_empty() {
            return Ok(0);
        }

        match self.sink.insert_batch(batch.as_slice()).await {
            Ok(written) => {
                batch.clear();
                Ok(written)
            }
            Err(e) => {
                tracing::error!("Storage write failed, flushing geocode cache before aborting");
                if let Err(flush_err) = self.resolver.flush().await {
                    tracing::error!("Geocode cache flush failed: {}", flush_err);
                }
                Err(e)
            }
        }
    }

    pub fn resolver(&self) -> &GeoResolver<G> {
        &self.resolver
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_parts(self) -> (GeoResolver<G>, S) {
        (self.resolver, self.sink)
    }
}
