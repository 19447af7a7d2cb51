//! Persistent geocode cache.
//!
//! The whole mapping lives in memory for the duration of a run and is written
//! back wholesale as a human-readable JSON document. Entries are created once
//! and never updated: a lookup that found nothing is stored with null
//! coordinates so the same query is never sent to the provider again.

use crate::errors::{AppError, ResultExt};
use crate::resolution::CandidateKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Cache key: `{KIND}::{UPPERCASED TRIMMED VALUE}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key for a candidate. Blank values never produce a key.
    pub fn new(kind: CandidateKind, value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        Some(Self(format!("{}::{}", kind.as_tag(), value.to_uppercase())))
    }

    /// Wraps an already-formatted key, e.g. one typed on the command line.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one attempted lookup, positive or negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoCacheEntry {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// The query text that was sent to the provider.
    #[serde(default)]
    pub query: String,
    #[serde(default, alias = "cidade_geocode")]
    pub city_resolved: Option<String>,
    #[serde(default, alias = "uf_geocode")]
    pub state_resolved: Option<String>,
}

impl GeoCacheEntry {
    pub fn positive(
        query: impl Into<String>,
        lat: f64,
        lon: f64,
        city: Option<String>,
        state: Option<String>,
    ) -> Self {
        Self {
            lat: Some(lat),
            lon: Some(lon),
            query: query.into(),
            city_resolved: city,
            state_resolved: state,
        }
    }

    pub fn negative(query: impl Into<String>) -> Self {
        Self {
            lat: None,
            lon: None,
            query: query.into(),
            city_resolved: None,
            state_resolved: None,
        }
    }

    /// Coordinates, present only when both halves were resolved.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lon)
    }

    pub fn is_negative(&self) -> bool {
        self.coordinates().is_none()
    }
}

/// File-backed key → entry mapping.
#[derive(Debug, Clone)]
pub struct GeoCache {
    path: PathBuf,
    entries: BTreeMap<String, GeoCacheEntry>,
}

impl GeoCache {
    /// Creates an empty cache that will be saved to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Loads the cache file. A missing or unreadable file yields an empty cache.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, GeoCacheEntry>>(&content)
            {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        "Geocode cache {} is corrupt, starting empty: {}",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No geocode cache at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!(
                    "Geocode cache {} is unreadable, starting empty: {}",
                    path.display(),
                    e
                );
                BTreeMap::new()
            }
        };

        let entries = adopt_legacy_keys(entries);
        tracing::info!(
            "Geocode cache loaded: {} entries from {}",
            entries.len(),
            path.display()
        );
        Self { path, entries }
    }

    /// Writes the full mapping to disk, creating missing parent directories.
    ///
    /// The document goes to a sibling temp file first and is renamed into
    /// place, so an interrupted write leaves the previous cache intact.
    pub async fn save(&self) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating cache directory {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(&self.entries)?;
        let tmp_path = temp_path_for(&self.path);
        fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("writing cache file {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("replacing cache file {}", self.path.display()))?;

        tracing::debug!(
            "Geocode cache saved: {} entries to {}",
            self.entries.len(),
            self.path.display()
        );
        Ok(())
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<&GeoCacheEntry> {
        self.entries.get(key.as_str())
    }

    /// Records an entry. An existing entry is kept as-is; returns whether the
    /// entry was inserted.
    pub fn put(&mut self, key: CacheKey, entry: GeoCacheEntry) -> bool {
        match self.entries.entry(key.0) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
            std::collections::btree_map::Entry::Occupied(slot) => {
                tracing::debug!("Cache entry {} already present, keeping it", slot.key());
                false
            }
        }
    }

    /// Removes one entry (manual invalidation).
    pub fn remove(&mut self, key: &CacheKey) -> Option<GeoCacheEntry> {
        self.entries.remove(key.as_str())
    }

    /// Removes every negative entry so those queries are retried remotely.
    pub fn purge_negative(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_negative());
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn positive_count(&self) -> usize {
        self.entries.values().filter(|e| !e.is_negative()).count()
    }

    pub fn negative_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_negative()).count()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &GeoCacheEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PartialEq for GeoCache {
    /// Two caches are equal when their mappings are equal, wherever they live.
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

/// Tag older cache files used for the override-address tier.
const LEGACY_PRECISE_TAG: &str = "end_a_considerar";

/// Re-keys override-address entries written under the legacy tag. Values were
/// already trimmed and uppercased, so only the tag changes. An entry already
/// present under the current tag wins.
fn adopt_legacy_keys(entries: BTreeMap<String, GeoCacheEntry>) -> BTreeMap<String, GeoCacheEntry> {
    let legacy_prefix = format!("{}::", LEGACY_PRECISE_TAG);
    let (legacy, mut current): (BTreeMap<_, _>, BTreeMap<_, _>) = entries
        .into_iter()
        .partition(|(key, _)| key.starts_with(&legacy_prefix));

    for (key, entry) in legacy {
        let value = &key[legacy_prefix.len()..];
        let renamed = format!("{}::{}", CandidateKind::PreciseAddress.as_tag(), value);
        current.entry(renamed).or_insert(entry);
    }
    current
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "geocache.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
