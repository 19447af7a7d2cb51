/// Priority resolution tests
/// Drives the resolver with a scripted geocoder that records every query it receives
use async_trait::async_trait;
use ledax_mapa::geocache::{CacheKey, GeoCache, GeoCacheEntry};
use ledax_mapa::geocoder::{GeocodeMatch, Geocoder};
use ledax_mapa::resolution::{CandidateKind, GeoResolver, LocationFields};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Answers only the queries it was scripted with; everything else is a miss.
#[derive(Default)]
struct ScriptedGeocoder {
    answers: HashMap<String, GeocodeMatch>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGeocoder {
    fn answering(query: &str, lat: f64, lon: f64) -> Self {
        let mut geocoder = Self::default();
        geocoder.answers.insert(
            query.to_string(),
            GeocodeMatch {
                lat,
                lon,
                city: Some("São Paulo".to_string()),
                state: Some("São Paulo".to_string()),
            },
        );
        geocoder
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for ScriptedGeocoder {
    async fn geocode(&self, query: &str) -> Option<GeocodeMatch> {
        self.calls.lock().unwrap().push(query.to_string());
        self.answers.get(query).cloned()
    }
}

fn resolver(cache: GeoCache, geocoder: ScriptedGeocoder) -> GeoResolver<ScriptedGeocoder> {
    GeoResolver::new(cache, geocoder, Duration::ZERO)
}

fn paulista_fields() -> LocationFields {
    LocationFields {
        address_override: None,
        delivery_location: Some("Loja Paulista".to_string()),
        client_address: Some("Av. Paulista, 1000".to_string()),
        postal_code: Some("01310100".to_string()),
        city: Some("São Paulo".to_string()),
        state: Some("SP".to_string()),
    }
}

fn key(kind: CandidateKind, value: &str) -> CacheKey {
    CacheKey::new(kind, value).unwrap()
}

#[tokio::test]
async fn test_falls_through_tiers_until_postal_code_resolves() {
    let geocoder = ScriptedGeocoder::answering("01310100", -23.561, -46.656);
    let mut resolver = resolver(GeoCache::new("unused.json"), geocoder);

    let location = resolver
        .resolve_for_record(&paulista_fields())
        .await
        .expect("postal code should resolve");

    assert_eq!(location.latitude, -23.561);
    assert_eq!(location.longitude, -46.656);
    assert_eq!(location.geocoded_address, "01310100");
    assert_eq!(location.city.as_deref(), Some("São Paulo"));

    // Lower tiers are never attempted once one succeeds
    assert_eq!(
        resolver.geocoder().calls(),
        vec!["Loja Paulista", "Av. Paulista, 1000", "01310100"]
    );

    let cache = resolver.cache();
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.negative_count(), 2);
    assert!(cache
        .lookup(&key(CandidateKind::DeliveryLocation, "Loja Paulista"))
        .unwrap()
        .is_negative());
    assert_eq!(
        cache
            .lookup(&key(CandidateKind::PostalCode, "01310100"))
            .unwrap()
            .coordinates(),
        Some((-23.561, -46.656))
    );
}

#[tokio::test]
async fn test_override_address_is_tried_first() {
    let geocoder = ScriptedGeocoder::answering("Rua Haddock Lobo, 595", -23.557, -46.662);
    let mut resolver = resolver(GeoCache::new("unused.json"), geocoder);

    let fields = LocationFields {
        address_override: Some("Rua Haddock Lobo, 595".to_string()),
        ..paulista_fields()
    };
    let location = resolver.resolve_for_record(&fields).await.unwrap();

    assert_eq!(location.geocoded_address, "Rua Haddock Lobo, 595");
    assert_eq!(resolver.geocoder().calls(), vec!["Rua Haddock Lobo, 595"]);
}

#[tokio::test]
async fn test_cache_hit_skips_remote() {
    let mut cache = GeoCache::new("unused.json");
    cache.put(
        key(CandidateKind::DeliveryLocation, "loja paulista"),
        GeoCacheEntry::positive("Loja Paulista", -23.5, -46.6, None, Some("SP".into())),
    );
    let mut resolver = resolver(cache, ScriptedGeocoder::default());

    let location = resolver.resolve_for_record(&paulista_fields()).await.unwrap();

    assert_eq!(location.latitude, -23.5);
    assert_eq!(location.geocoded_address, "Loja Paulista");
    assert_eq!(location.state.as_deref(), Some("SP"));
    assert!(resolver.geocoder().calls().is_empty());
    assert_eq!(resolver.stats().cache_hits, 1);
    assert_eq!(resolver.stats().remote_calls, 0);
}

#[tokio::test]
async fn test_negative_entry_moves_to_next_tier_without_remote_call() {
    let mut cache = GeoCache::new("unused.json");
    cache.put(
        key(CandidateKind::DeliveryLocation, "Loja Paulista"),
        GeoCacheEntry::negative("Loja Paulista"),
    );
    let geocoder = ScriptedGeocoder::answering("Av. Paulista, 1000", -23.56, -46.65);
    let mut resolver = resolver(cache, geocoder);

    let location = resolver.resolve_for_record(&paulista_fields()).await.unwrap();

    assert_eq!(location.geocoded_address, "Av. Paulista, 1000");
    assert_eq!(resolver.geocoder().calls(), vec!["Av. Paulista, 1000"]);
    assert_eq!(resolver.stats().negative_skips, 1);
}

#[tokio::test]
async fn test_record_without_location_fields_is_a_quiet_miss() {
    let mut resolver = resolver(GeoCache::new("unused.json"), ScriptedGeocoder::default());

    let location = resolver
        .resolve_for_record(&LocationFields {
            delivery_location: Some("   ".to_string()),
            ..Default::default()
        })
        .await;

    assert!(location.is_none());
    assert!(resolver.geocoder().calls().is_empty());
    assert!(resolver.cache().is_empty());
    assert_eq!(resolver.stats().misses, 1);
}

#[tokio::test]
async fn test_full_miss_caches_every_attempt() {
    let mut resolver = resolver(GeoCache::new("unused.json"), ScriptedGeocoder::default());

    assert!(resolver.resolve_for_record(&paulista_fields()).await.is_none());

    assert_eq!(
        resolver.geocoder().calls(),
        vec![
            "Loja Paulista",
            "Av. Paulista, 1000",
            "01310100",
            "São Paulo - SP",
            "SP"
        ]
    );
    assert_eq!(resolver.cache().len(), 5);
    assert_eq!(resolver.cache().negative_count(), 5);

    // The same record again costs nothing
    assert!(resolver.resolve_for_record(&paulista_fields()).await.is_none());
    assert_eq!(resolver.geocoder().calls().len(), 5);
    assert_eq!(resolver.stats().negative_skips, 5);
    assert_eq!(resolver.stats().misses, 2);
}

#[tokio::test]
async fn test_equivalent_text_shares_cache_entry() {
    let geocoder = ScriptedGeocoder::answering("Av. Paulista, 1000", -23.56, -46.65);
    let mut resolver = resolver(GeoCache::new("unused.json"), geocoder);

    let first = LocationFields {
        client_address: Some("Av. Paulista, 1000".to_string()),
        ..Default::default()
    };
    let second = LocationFields {
        client_address: Some("  av. paulista, 1000 ".to_string()),
        ..Default::default()
    };

    let a = resolver.resolve_for_record(&first).await.unwrap();
    let b = resolver.resolve_for_record(&second).await.unwrap();

    assert_eq!((a.latitude, a.longitude), (b.latitude, b.longitude));
    assert_eq!(resolver.geocoder().calls().len(), 1);
    assert_eq!(resolver.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_city_state_needs_both_halves() {
    let mut resolver = resolver(GeoCache::new("unused.json"), ScriptedGeocoder::default());

    let fields = LocationFields {
        city: Some("Campinas".to_string()),
        ..Default::default()
    };
    assert!(resolver.resolve_for_record(&fields).await.is_none());
    assert!(resolver.geocoder().calls().is_empty());
}

#[tokio::test]
async fn test_cached_tier_beats_negative_entry_with_same_text() {
    let mut cache = GeoCache::new("unused.json");
    cache.put(
        key(CandidateKind::DeliveryLocation, "Rua A, 10"),
        GeoCacheEntry::negative("Rua A, 10"),
    );
    cache.put(
        key(CandidateKind::ClientAddress, "Rua A, 10"),
        GeoCacheEntry::positive("Rua A, 10", -25.0, -49.0, None, Some("Paraná".into())),
    );
    let mut resolver = resolver(cache, ScriptedGeocoder::default());

    let fields = LocationFields {
        delivery_location: Some("Rua A, 10".to_string()),
        client_address: Some("Rua A, 10".to_string()),
        state: Some("PR".to_string()),
        ..Default::default()
    };
    let location = resolver
        .resolve_for_record(&fields)
        .await
        .expect("client address entry should be used");

    assert_eq!((location.latitude, location.longitude), (-25.0, -49.0));
    assert!(resolver.geocoder().calls().is_empty());
    assert_eq!(resolver.stats().negative_skips, 1);
    assert_eq!(resolver.stats().cache_hits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_delay_follows_every_remote_call() {
    let delay = Duration::from_millis(1500);
    let geocoder = ScriptedGeocoder::answering("Av. Paulista, 1000", -23.56, -46.65);
    let mut resolver = GeoResolver::new(GeoCache::new("unused.json"), geocoder, delay);

    let unknown = LocationFields {
        delivery_location: Some("Lugar Nenhum".to_string()),
        ..Default::default()
    };
    let known = LocationFields {
        client_address: Some("Av. Paulista, 1000".to_string()),
        ..Default::default()
    };

    // Remote miss
    let started = tokio::time::Instant::now();
    assert!(resolver.resolve_for_record(&unknown).await.is_none());
    assert_eq!(started.elapsed(), delay);

    // Remote hit
    let started = tokio::time::Instant::now();
    assert!(resolver.resolve_for_record(&known).await.is_some());
    assert_eq!(started.elapsed(), delay);

    // Cache hit and negative skip: no remote call, no wait
    let started = tokio::time::Instant::now();
    assert!(resolver.resolve_for_record(&known).await.is_some());
    assert!(resolver.resolve_for_record(&unknown).await.is_none());
    assert_eq!(started.elapsed(), Duration::ZERO);

    assert_eq!(resolver.geocoder().calls().len(), 2);
}
