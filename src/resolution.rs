//! Priority geocoding resolution.
//!
//! For one record, candidate queries are tried from the most precise location
//! signal down to the bare state code. The cache is consulted before any
//! remote call, every remote attempt is cached (including misses), and the
//! first tier that yields coordinates wins.

use crate::errors::AppError;
use crate::geocache::{CacheKey, GeoCache, GeoCacheEntry};
use crate::geocoder::Geocoder;
use crate::normalize::{non_blank, normalize_postal_code, normalize_state_code};
use serde::Serialize;
use std::time::Duration;

/// Location tiers, most precise first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// Operator-provided address override.
    PreciseAddress,
    DeliveryLocation,
    ClientAddress,
    PostalCode,
    CityState,
    StateOnly,
}

impl CandidateKind {
    /// Stable tag used in cache keys. Changing these invalidates existing cache files.
    pub fn as_tag(&self) -> &'static str {
        match self {
            CandidateKind::PreciseAddress => "PRECISE",
            CandidateKind::DeliveryLocation => "LOCAL",
            CandidateKind::ClientAddress => "END",
            CandidateKind::PostalCode => "CEP",
            CandidateKind::CityState => "CIDADE",
            CandidateKind::StateOnly => "UF",
        }
    }
}

/// One query attempt derived from a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub value: String,
}

impl Candidate {
    fn new(kind: CandidateKind, value: String) -> Self {
        Self { kind, value }
    }

    pub fn cache_key(&self) -> Option<CacheKey> {
        CacheKey::new(self.kind, &self.value)
    }
}

/// The location-bearing fields of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationFields {
    pub address_override: Option<String>,
    pub delivery_location: Option<String>,
    pub client_address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// Successful resolution of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Candidate text that produced the coordinates.
    pub geocoded_address: String,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// Counters for one resolver lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
    pub records: usize,
    pub cache_hits: usize,
    pub negative_skips: usize,
    pub remote_calls: usize,
    pub resolved: usize,
    pub misses: usize,
}

/// Builds the ordered candidate list for a record.
///
/// Blank tiers are omitted, the postal code must be exactly 8 digits, and
/// `"{city} - {STATE}"` needs both halves. The override address is dropped
/// when it repeats the delivery location; every other tier keeps its own
/// candidate even when its text matches another tier.
pub fn build_candidates(fields: &LocationFields) -> Vec<Candidate> {
    let state = normalize_state_code(fields.state.as_deref());
    let city = non_blank(fields.city.as_deref());
    let delivery = non_blank(fields.delivery_location.as_deref());
    let precise = non_blank(fields.address_override.as_deref()).filter(|precise| {
        delivery
            .as_ref()
            .map_or(true, |d| d.to_uppercase() != precise.to_uppercase())
    });

    let tiers = [
        (CandidateKind::PreciseAddress, precise),
        (CandidateKind::DeliveryLocation, delivery),
        (
            CandidateKind::ClientAddress,
            non_blank(fields.client_address.as_deref()),
        ),
        (
            CandidateKind::PostalCode,
            normalize_postal_code(fields.postal_code.as_deref()),
        ),
        (
            CandidateKind::CityState,
            city.zip(state.clone())
                .map(|(city, state)| format!("{} - {}", city, state)),
        ),
        (CandidateKind::StateOnly, state),
    ];

    tiers
        .into_iter()
        .filter_map(|(kind, value)| value.map(|value| Candidate::new(kind, value)))
        .collect()
}

/// Resolution engine owning the cache for the duration of a run.
pub struct GeoResolver<G> {
    cache: GeoCache,
    geocoder: G,
    delay: Duration,
    stats: ResolutionStats,
}

impl<G: Geocoder> GeoResolver<G> {
    /// # Arguments
    ///
    /// * `cache` - Cache loaded at pipeline start.
    /// * `geocoder` - Remote resolver.
    /// * `delay` - Fixed pause after every remote call, hit or miss.
    pub fn new(cache: GeoCache, geocoder: G, delay: Duration) -> Self {
        Self {
            cache,
            geocoder,
            delay,
            stats: ResolutionStats::default(),
        }
    }

    /// Resolves one record. `None` means no tier produced coordinates.
    pub async fn resolve_for_record(&mut self, fields: &LocationFields) -> Option<ResolvedLocation> {
        self.stats.records += 1;

        let resolved = self.walk_candidates(build_candidates(fields)).await;
        match resolved {
            Some(_) => self.stats.resolved += 1,
            None => self.stats.misses += 1,
        }
        resolved
    }

    async fn walk_candidates(&mut self, candidates: Vec<Candidate>) -> Option<ResolvedLocation> {
        for candidate in candidates {
            let Some(key) = candidate.cache_key() else {
                continue;
            };

            if let Some(cached) = self.cache.lookup(&key) {
                match cached.coordinates() {
                    Some((lat, lon)) => {
                        self.stats.cache_hits += 1;
                        tracing::debug!("Cache hit for {}", key);
                        return Some(ResolvedLocation {
                            latitude: lat,
                            longitude: lon,
                            geocoded_address: candidate.value,
                            city: cached.city_resolved.clone(),
                            state: cached.state_resolved.clone(),
                        });
                    }
                    None => {
                        self.stats.negative_skips += 1;
                        tracing::debug!("Negative cache for {}, trying next tier", key);
                        continue;
                    }
                }
            }

            self.stats.remote_calls += 1;
            let found = self.geocoder.geocode(&candidate.value).await;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match found {
                Some(m) => {
                    self.cache.put(
                        key,
                        GeoCacheEntry::positive(
                            candidate.value.clone(),
                            m.lat,
                            m.lon,
                            m.city.clone(),
                            m.state.clone(),
                        ),
                    );
                    return Some(ResolvedLocation {
                        latitude: m.lat,
                        longitude: m.lon,
                        geocoded_address: candidate.value,
                        city: m.city,
                        state: m.state,
                    });
                }
                None => {
                    tracing::debug!("Remote miss for {}, caching negative result", key);
                    self.cache
                        .put(key, GeoCacheEntry::negative(candidate.value.clone()));
                }
            }
        }

        None
    }

    /// Persists the cache (periodic checkpoint or end of run).
    pub async fn flush(&self) -> Result<(), AppError> {
        self.cache.save().await
    }

    pub fn cache(&self) -> &GeoCache {
        &self.cache
    }

    pub fn geocoder(&self) -> &G {
        &self.geocoder
    }

    pub fn stats(&self) -> &ResolutionStats {
        &self.stats
    }

    pub fn into_cache(self) -> GeoCache {
        self.cache
    }
}
