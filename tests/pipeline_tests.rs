/// Pipeline tests: batching, cache checkpoints and failure handling
/// Uses an in-memory sink and a geocoder that resolves any query it is given
use async_trait::async_trait;
use ledax_mapa::errors::AppError;
use ledax_mapa::geocache::GeoCache;
use ledax_mapa::geocoder::{GeocodeMatch, Geocoder};
use ledax_mapa::models::{LeadRow, NewLead};
use ledax_mapa::pipeline::{EnrichmentPipeline, LeadSink, PipelineOptions};
use ledax_mapa::resolution::GeoResolver;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolves every query except those mentioning "Desconhecido".
struct EverywhereGeocoder;

#[async_trait]
impl Geocoder for EverywhereGeocoder {
    async fn geocode(&self, query: &str) -> Option<GeocodeMatch> {
        if query.contains("Desconhecido") {
            return None;
        }
        Some(GeocodeMatch {
            lat: -25.0,
            lon: -49.0,
            city: None,
            state: None,
        })
    }
}

/// Records batches; optionally fails on the n-th batch (0-based).
#[derive(Default)]
struct MemorySink {
    batches: Vec<Vec<NewLead>>,
    fail_on_batch: Option<usize>,
    attempts: usize,
    /// When set, the number of entries in this cache file at each commit.
    watch_cache: Option<PathBuf>,
    cache_sizes: Vec<usize>,
}

fn entries_on_disk(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&s).ok())
        .map(|m| m.len())
        .unwrap_or(0)
}

#[async_trait]
impl LeadSink for MemorySink {
    async fn insert_batch(&mut self, leads: &[NewLead]) -> Result<u64, AppError> {
        if let Some(path) = &self.watch_cache {
            self.cache_sizes.push(entries_on_disk(path));
        }
        let attempt = self.attempts;
        self.attempts += 1;
        if self.fail_on_batch == Some(attempt) {
            return Err(AppError::InternalError("connection reset".to_string()));
        }
        self.batches.push(leads.to_vec());
        Ok(leads.len() as u64)
    }
}

fn rows(count: usize) -> Vec<LeadRow> {
    (0..count)
        .map(|i| LeadRow {
            title: Some(format!("Negócio {}", i)),
            client_address: Some(format!("Rua das Flores, {}", i)),
            city: Some("Curitiba".to_string()),
            state: Some("PR".to_string()),
            ..Default::default()
        })
        .collect()
}

fn pipeline(
    cache_path: &Path,
    sink: MemorySink,
    options: PipelineOptions,
) -> EnrichmentPipeline<EverywhereGeocoder, MemorySink> {
    let resolver = GeoResolver::new(GeoCache::new(cache_path), EverywhereGeocoder, Duration::ZERO);
    EnrichmentPipeline::new(resolver, sink, options)
}

#[tokio::test]
async fn test_batches_follow_commit_interval() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("geocache.json");
    let mut pipeline = pipeline(&cache_path, MemorySink::default(), PipelineOptions::default());

    let summary = pipeline.run(&rows(450)).await.unwrap();

    let sizes: Vec<usize> = pipeline.sink().batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![200, 200, 50]);
    assert_eq!(summary.total_rows, 450);
    assert_eq!(summary.stored, 450);
    assert_eq!(summary.geocoded, 450);
    assert_eq!(summary.resolution.remote_calls, 450);
}

#[tokio::test]
async fn test_records_keep_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let options = PipelineOptions {
        cache_flush_every: 3,
        storage_commit_every: 4,
    };
    let mut pipeline = pipeline(&dir.path().join("c.json"), MemorySink::default(), options);

    pipeline.run(&rows(10)).await.unwrap();

    let titles: Vec<String> = pipeline
        .sink()
        .batches
        .iter()
        .flatten()
        .filter_map(|lead| lead.title.clone())
        .collect();
    let expected: Vec<String> = (0..10).map(|i| format!("Negócio {}", i)).collect();
    assert_eq!(titles, expected);
}

#[tokio::test]
async fn test_final_cache_matches_saved_file() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("geocache.json");
    let mut input = rows(7);
    input.push(LeadRow {
        title: Some("Sem localização".to_string()),
        client_address: Some("Endereço Desconhecido".to_string()),
        ..Default::default()
    });

    let mut pipeline = pipeline(&cache_path, MemorySink::default(), PipelineOptions::default());
    let summary = pipeline.run(&input).await.unwrap();
    assert_eq!(summary.geocoded, 7);
    assert_eq!(summary.without_location, 1);

    let (resolver, _) = pipeline.into_parts();
    let saved = GeoCache::load(&cache_path).await;
    assert_eq!(saved, resolver.into_cache());
    assert_eq!(saved.len(), 8);
    assert_eq!(saved.negative_count(), 1);
}

#[tokio::test]
async fn test_empty_input_still_writes_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("geocache.json");
    let mut pipeline = pipeline(&cache_path, MemorySink::default(), PipelineOptions::default());

    let summary = pipeline.run(&[]).await.unwrap();

    assert_eq!(summary.total_rows, 0);
    assert_eq!(summary.stored, 0);
    assert!(pipeline.sink().batches.is_empty());
    assert!(cache_path.exists());
}

#[tokio::test]
async fn test_storage_failure_flushes_cache_before_aborting() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("geocache.json");
    let sink = MemorySink {
        fail_on_batch: Some(1),
        ..Default::default()
    };
    // Checkpoint interval larger than the input, so only the failure path writes
    let options = PipelineOptions {
        cache_flush_every: 1_000,
        storage_commit_every: 5,
    };
    let mut pipeline = pipeline(&cache_path, sink, options);

    let result = pipeline.run(&rows(20)).await;

    assert!(matches!(result, Err(AppError::InternalError(_))));
    assert_eq!(pipeline.sink().batches.len(), 1);

    // Rows 1..=10 were resolved before the second commit failed
    let saved = GeoCache::load(&cache_path).await;
    assert_eq!(saved.len(), 10);
}

#[tokio::test]
async fn test_periodic_checkpoint_writes_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("geocache.json");
    let sink = MemorySink {
        watch_cache: Some(cache_path.clone()),
        ..Default::default()
    };
    let options = PipelineOptions {
        cache_flush_every: 2,
        storage_commit_every: 5,
    };
    let mut pipeline = pipeline(&cache_path, sink, options);

    pipeline.run(&rows(12)).await.unwrap();

    // Commits at rows 5, 10 and 12 see the checkpoints from rows 4, 8 and 12;
    // at row 10 the commit runs before that row's checkpoint
    assert_eq!(pipeline.sink().cache_sizes, vec![4, 8, 12]);
    assert_eq!(entries_on_disk(&cache_path), 12);
}

#[tokio::test]
async fn test_zero_intervals_are_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let options = PipelineOptions {
        cache_flush_every: 0,
        storage_commit_every: 0,
    };
    let mut pipeline = pipeline(&dir.path().join("c.json"), MemorySink::default(), options);

    let summary = pipeline.run(&rows(3)).await.unwrap();
    assert_eq!(summary.stored, 3);
    assert_eq!(pipeline.sink().batches.len(), 3);
}
