use crate::config::Config;
use crate::errors::AppError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// A coordinate match plus whatever administrative area the provider inferred.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeMatch {
    pub lat: f64,
    pub lon: f64,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// Remote free-text geocoding.
///
/// Implementations never fail: timeouts, provider errors and empty results
/// all come back as `None`.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> Option<GeocodeMatch>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
}

/// Client for a Nominatim-compatible `/search` endpoint.
#[derive(Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    country: String,
}

impl NominatimGeocoder {
    /// Creates a new `NominatimGeocoder`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Provider root, e.g. `https://nominatim.openstreetmap.org`.
    /// * `user_agent` - Identifies the application, as the provider's usage policy requires.
    /// * `country` - Qualifier appended to every query to bias results.
    /// * `timeout` - Per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        user_agent: &str,
        country: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create geocoder client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            country: country.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.geocoder_base_url.clone(),
            &config.geocoder_user_agent,
            config.geocoder_country.clone(),
            config.geocoder_timeout(),
        )
    }

    /// Performs the request, surfacing every failure as an error.
    pub async fn search(&self, query: &str) -> Result<Option<GeocodeMatch>, AppError> {
        let qualified = format!("{}, {}", query, self.country);
        let url = reqwest::Url::parse_with_params(
            &format!("{}/search", self.base_url),
            &[
                ("q", qualified.as_str()),
                ("format", "jsonv2"),
                ("addressdetails", "1"),
                ("limit", "1"),
            ],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build URL: {}", e)))?;

        let response = self.client.get(url).send().await.map_err(|e| {
            AppError::ExternalApiError(format!("Geocoder request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Geocoder returned status {}: {}",
                status, error_text
            )));
        }

        let places: Vec<NominatimPlace> = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse geocoder response: {}", e))
        })?;

        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };

        let lat = place.lat.trim().parse::<f64>().map_err(|_| {
            AppError::ExternalApiError(format!("Invalid latitude '{}'", place.lat))
        })?;
        let lon = place.lon.trim().parse::<f64>().map_err(|_| {
            AppError::ExternalApiError(format!("Invalid longitude '{}'", place.lon))
        })?;

        if !lat.is_finite() || !lon.is_finite() {
            return Err(AppError::ExternalApiError(format!(
                "Non-finite coordinates ({}, {})",
                place.lat, place.lon
            )));
        }

        let address = place.address.unwrap_or_default();
        Ok(Some(GeocodeMatch {
            lat,
            lon,
            city: address.city.or(address.town).or(address.village),
            state: address.state,
        }))
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> Option<GeocodeMatch> {
        if query.trim().is_empty() {
            return None;
        }

        match self.search(query).await {
            Ok(Some(found)) => {
                tracing::debug!("Geocoded '{}' -> ({}, {})", query, found.lat, found.lon);
                Some(found)
            }
            Ok(None) => {
                tracing::debug!("No geocoding match for '{}'", query);
                None
            }
            Err(e) => {
                tracing::warn!("Geocoding '{}' failed: {}", query, e);
                None
            }
        }
    }
}
