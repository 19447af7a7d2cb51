use crate::errors::AppError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============ Database Models ============

/// A stored lead: spreadsheet fields, derived fields and geocoding output.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    /// Unique identifier for the lead.
    pub id: i64,
    /// Deal title.
    pub title: Option<String>,
    /// Retail network the deal belongs to.
    pub network: Option<String>,
    /// Deal date.
    pub sale_date: Option<NaiveDate>,
    /// Strategic client classification.
    pub client_type: Option<String>,
    /// Sales funnel stage.
    pub funnel: Option<String>,
    /// Sales representative.
    pub representative: Option<String>,
    /// Deal owner.
    pub owner: Option<String>,
    /// Macro-region derived from the state code.
    pub region: Option<String>,
    /// Deal value.
    pub sale_value: Option<BigDecimal>,
    /// Delivery location as typed in the spreadsheet.
    pub delivery_location: Option<String>,
    /// Client address as typed in the spreadsheet.
    pub client_address: Option<String>,
    /// Client city as typed in the spreadsheet.
    pub city: Option<String>,
    /// Normalized state code.
    pub state: Option<String>,
    /// Normalized 8-digit postal code.
    pub postal_code: Option<String>,
    /// Candidate text that actually produced the coordinates.
    pub geocoded_address: Option<String>,
    /// City reported by the geocoder.
    pub geocoded_city: Option<String>,
    /// State reported by the geocoder.
    pub geocoded_state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Timestamp of insertion.
    pub created_at: DateTime<Utc>,
}

/// A lead ready for insertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewLead {
    pub title: Option<String>,
    pub network: Option<String>,
    pub sale_date: Option<NaiveDate>,
    pub client_type: Option<String>,
    pub funnel: Option<String>,
    pub representative: Option<String>,
    pub owner: Option<String>,
    pub region: Option<String>,
    pub sale_value: Option<BigDecimal>,
    pub delivery_location: Option<String>,
    pub client_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub geocoded_address: Option<String>,
    pub geocoded_city: Option<String>,
    pub geocoded_state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

// ============ Spreadsheet Models ============

/// One spreadsheet row, cells trimmed, blanks as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeadRow {
    pub title: Option<String>,
    pub network: Option<String>,
    pub date: Option<String>,
    pub client_type: Option<String>,
    pub funnel: Option<String>,
    pub representative: Option<String>,
    pub owner: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub delivery_location: Option<String>,
    pub client_address: Option<String>,
    pub address_override: Option<String>,
    pub sale_value: Option<String>,
}

// ============ Query Models ============

/// Filter set shared by the listing and facet endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeadFilters {
    pub network: Vec<String>,
    pub client_type: Vec<String>,
    pub funnel: Vec<String>,
    pub representative: Vec<String>,
    pub region: Vec<String>,
    pub owner: Vec<String>,
    /// Inclusive lower bound on `sale_date`.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on `sale_date`.
    pub date_to: Option<NaiveDate>,
    /// Case-insensitive substring over the text fields.
    pub search: Option<String>,
}

impl LeadFilters {
    /// Parses a raw query string. Multi-valued filters repeat their key
    /// (`network=A&network=B`); blank values are ignored.
    pub fn from_query(raw: Option<&str>) -> Result<Self, AppError> {
        let mut filters = Self::default();
        let Some(raw) = raw else {
            return Ok(filters);
        };

        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "network" => filters.network.push(value.to_string()),
                "client_type" => filters.client_type.push(value.to_string()),
                "funnel" => filters.funnel.push(value.to_string()),
                "representative" => filters.representative.push(value.to_string()),
                "region" => filters.region.push(value.to_string()),
                "owner" => filters.owner.push(value.to_string()),
                "date_from" => filters.date_from = Some(parse_query_date("date_from", value)?),
                "date_to" => filters.date_to = Some(parse_query_date("date_to", value)?),
                "search" => filters.search = Some(value.to_string()),
                other => tracing::debug!("Ignoring unknown filter parameter '{}'", other),
            }
        }

        Ok(filters)
    }

    /// Canonical form used as the facet cache key: order of repeated values
    /// does not matter.
    pub fn cache_key(&self) -> String {
        let mut canonical = self.clone();
        for values in [
            &mut canonical.network,
            &mut canonical.client_type,
            &mut canonical.funnel,
            &mut canonical.representative,
            &mut canonical.region,
            &mut canonical.owner,
        ] {
            values.sort();
            values.dedup();
        }
        serde_json::to_string(&canonical).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn parse_query_date(name: &str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("{} must be a YYYY-MM-DD date", name)))
}

/// Categorical columns exposed as facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetField {
    Network,
    ClientType,
    Funnel,
    Representative,
    Region,
    Owner,
}

impl FacetField {
    pub const ALL: [FacetField; 6] = [
        FacetField::Network,
        FacetField::ClientType,
        FacetField::Funnel,
        FacetField::Representative,
        FacetField::Region,
        FacetField::Owner,
    ];

    /// Column name in the `leads` table.
    pub fn column(&self) -> &'static str {
        match self {
            FacetField::Network => "network",
            FacetField::ClientType => "client_type",
            FacetField::Funnel => "funnel",
            FacetField::Representative => "representative",
            FacetField::Region => "region",
            FacetField::Owner => "owner",
        }
    }
}

/// Distinct values per facet under a filter set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetValues {
    pub network: Vec<String>,
    pub client_type: Vec<String>,
    pub funnel: Vec<String>,
    pub representative: Vec<String>,
    pub region: Vec<String>,
    pub owner: Vec<String>,
}

impl FacetValues {
    pub fn set(&mut self, field: FacetField, values: Vec<String>) {
        let slot = match field {
            FacetField::Network => &mut self.network,
            FacetField::ClientType => &mut self.client_type,
            FacetField::Funnel => &mut self.funnel,
            FacetField::Representative => &mut self.representative,
            FacetField::Region => &mut self.region,
            FacetField::Owner => &mut self.owner,
        };
        *slot = values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_repeated_keys() {
        let filters =
            LeadFilters::from_query(Some("network=Rede%20A&network=Rede+B&region=Sul")).unwrap();
        assert_eq!(filters.network, vec!["Rede A", "Rede B"]);
        assert_eq!(filters.region, vec!["Sul"]);
        assert!(filters.funnel.is_empty());
    }

    #[test]
    fn test_filters_dates_and_search() {
        let filters =
            LeadFilters::from_query(Some("date_from=2024-01-01&date_to=2024-12-31&search=paulista"))
                .unwrap();
        assert_eq!(filters.date_from, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(filters.date_to, NaiveDate::from_ymd_opt(2024, 12, 31));
        assert_eq!(filters.search.as_deref(), Some("paulista"));
    }

    #[test]
    fn test_filters_bad_date_rejected() {
        let result = LeadFilters::from_query(Some("date_from=31/12/2024"));
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_filters_blank_and_absent() {
        assert!(LeadFilters::from_query(None).unwrap().is_empty());
        assert!(LeadFilters::from_query(Some("network=&search=%20"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_cache_key_ignores_value_order() {
        let a = LeadFilters::from_query(Some("owner=Ana&owner=Bruno")).unwrap();
        let b = LeadFilters::from_query(Some("owner=Bruno&owner=Ana")).unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
