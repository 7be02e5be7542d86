//! Integration tests for the virtual store: key namespace, lazy chunk
//! materialization, and the observation hook.

mod common;

use std::sync::{Arc, Mutex};

use common::{MockProvider, TileMode};
use cube_store::{
    CachedStore, ChunkObservation, ChunkedStore, CubeConfig, CubeConfigParams, CubeStore,
    CubeStoreError, TimeAxis,
};

fn cube_config(time_period: Option<&str>, four_d: bool) -> CubeConfig {
    CubeConfig::new(CubeConfigParams {
        dataset_name: Some("S2L1C".to_string()),
        band_names: Some(vec!["B01".to_string(), "B08".to_string(), "B12".to_string()]),
        bbox: Some((10.2, 53.5, 10.3, 53.6)),
        spatial_res: Some(0.1 / 4000.0),
        time_range: Some((Some("2017-08-01".to_string()), Some("2017-08-31".to_string()))),
        time_period: time_period.map(|p| p.parse().unwrap()),
        four_d: Some(four_d),
        ..Default::default()
    })
    .unwrap()
}

type Observed = Arc<Mutex<Vec<ChunkObservation>>>;

fn observed_store(
    provider: Arc<MockProvider>,
    config: CubeConfig,
) -> (CubeStore, Observed) {
    let observed: Observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    let store = CubeStore::open_observed(
        provider,
        config,
        Some(Arc::new(move |observation: &ChunkObservation| {
            sink.lock().unwrap().push(observation.clone());
        })),
    )
    .unwrap();
    (store, observed)
}

fn observed_keys(observed: &Observed) -> Vec<String> {
    let mut keys: Vec<String> = observed
        .lock()
        .unwrap()
        .iter()
        .map(|o| format!("{}-{:?}", o.band_name, o.chunk_index))
        .collect();
    keys.sort();
    keys
}

#[test]
fn test_store_geometry() {
    let config = cube_config(Some("1D"), false);
    assert_eq!(config.size, (4000, 4000));
    assert_eq!(config.tile_size, (1000, 1000));
    assert_eq!(config.num_tiles, (4, 4));
    let (x1, y1, x2, y2) = config.bbox.as_tuple();
    assert!((x1 - 10.2).abs() < 1e-9);
    assert!((y1 - 53.5).abs() < 1e-9);
    assert!((x2 - 10.3).abs() < 1e-9);
    assert!((y2 - 53.6).abs() < 1e-9);
}

#[test]
fn test_3d_regular_cube() {
    let provider = Arc::new(MockProvider::new((1000, 1000), 1));
    let (store, observed) = observed_store(Arc::clone(&provider), cube_config(Some("1D"), false));

    assert_eq!(store.planner().time_axis().len(), 31);

    // Metadata reads never fire the observer.
    store.get(".zattrs").unwrap();
    store.get("B01/.zarray").unwrap();
    assert!(observed.lock().unwrap().is_empty());

    // One full time slice: every spatial tile exactly once.
    for y in 0..4 {
        for x in 0..4 {
            let chunk = store.get(&format!("B01/2.{}.{}", y, x)).unwrap();
            assert_eq!(chunk.len(), 1000 * 1000 * 4);
        }
    }
    assert_eq!(observed.lock().unwrap().len(), 16);

    let mut expected = Vec::new();
    for y in 0..4 {
        for x in 0..4 {
            expected.push(format!("B01-{:?}", vec![2usize, y, x]));
        }
    }
    expected.sort();
    assert_eq!(observed_keys(&observed), expected);

    // Corner chunk bboxes.
    let res = 0.1 / 4000.0;
    let delta = 1000.0 * res;
    let snapshot = observed.lock().unwrap();
    let corner = snapshot
        .iter()
        .find(|o| o.chunk_index == vec![2, 0, 0])
        .unwrap();
    let (x1, y1, x2, y2) = corner.bbox.as_tuple();
    assert!((x1 - 10.2).abs() < 1e-9);
    assert!((y1 - (53.6 - delta)).abs() < 1e-9);
    assert!((x2 - (10.2 + delta)).abs() < 1e-9);
    assert!((y2 - 53.6).abs() < 1e-9);

    let corner = snapshot
        .iter()
        .find(|o| o.chunk_index == vec![2, 3, 3])
        .unwrap();
    let (x1, y1, x2, y2) = corner.bbox.as_tuple();
    assert!((x1 - (10.3 - delta)).abs() < 1e-9);
    assert!((y1 - 53.5).abs() < 1e-9);
    assert!((x2 - 10.3).abs() < 1e-9);
    assert!((y2 - (53.5 + delta)).abs() < 1e-9);
    drop(snapshot);

    // One pixel column across the full time axis: same spatial tile each time.
    observed.lock().unwrap().clear();
    for t in 0..31 {
        store.get(&format!("B01/{}.1.3", t)).unwrap();
    }
    let snapshot = observed.lock().unwrap();
    assert_eq!(snapshot.len(), 31);
    assert!(snapshot.iter().all(|o| o.chunk_index[1..] == [1, 3]));
}

#[test]
fn test_3d_irregular_cube() {
    let provider = Arc::new(MockProvider::new((1000, 1000), 1));
    let (store, observed) = observed_store(Arc::clone(&provider), cube_config(None, false));

    // Mock features land every other day at 08:00: Aug 1, 3, ..., 29.
    let axis = store.planner().time_axis();
    assert_eq!(axis.len(), 15);
    match axis {
        TimeAxis::Irregular { ranges } => {
            let first = ranges[0];
            assert_eq!(
                cube_common::format_instant(first.start),
                "2017-08-01T08:00:00+00:00"
            );
            assert_eq!(first.start, first.end);
        }
        TimeAxis::Regular { .. } => panic!("expected an irregular axis"),
    }
    assert_eq!(
        cube_common::format_instant(axis.center(1).unwrap()),
        "2017-08-03T08:00:00+00:00"
    );

    // time/0 carries 15 slots.
    let time = store.get("time/0").unwrap();
    assert_eq!(time.len(), 15 * 8);

    for t in 0..15 {
        store.get(&format!("B01/{}.1.3", t)).unwrap();
    }
    assert_eq!(observed.lock().unwrap().len(), 15);

    // Requests are widened by the default 10-minute tolerance.
    let snapshot = observed.lock().unwrap();
    let first = snapshot.iter().find(|o| o.chunk_index[0] == 0).unwrap();
    assert_eq!(
        cube_common::format_instant(first.time_range.start),
        "2017-08-01T07:50:00+00:00"
    );
    assert_eq!(
        cube_common::format_instant(first.time_range.end),
        "2017-08-01T08:10:00+00:00"
    );
}

#[test]
fn test_4d_cube() {
    let provider = Arc::new(MockProvider::new((1000, 1000), 3));
    let (store, observed) = observed_store(Arc::clone(&provider), cube_config(Some("1D"), true));

    let keys = store.list_keys();
    assert!(keys.contains(&"band_data/.zarray".to_string()));
    assert!(keys.contains(&"band/0".to_string()));
    assert!(!keys.contains(&"B01/.zarray".to_string()));

    for y in 0..4 {
        for x in 0..4 {
            let chunk = store.get(&format!("band_data/2.{}.{}.0", y, x)).unwrap();
            assert_eq!(chunk.len(), 1000 * 1000 * 3 * 4);
        }
    }
    assert_eq!(observed.lock().unwrap().len(), 16);

    let snapshot = observed.lock().unwrap();
    assert!(snapshot.iter().all(|o| o.band_name == "band_data"));
    assert!(snapshot.iter().all(|o| o.chunk_index.len() == 4 && o.chunk_index[3] == 0));
    assert!(snapshot
        .iter()
        .all(|o| o.request.band_names == vec!["B01", "B08", "B12"]));
    drop(snapshot);

    // Only band-chunk 0 exists; named bands are not addressable.
    assert!(matches!(
        store.get("band_data/2.0.0.1"),
        Err(CubeStoreError::KeyNotFound(_))
    ));
    assert!(matches!(
        store.get("B01/2.0.0"),
        Err(CubeStoreError::KeyNotFound(_))
    ));
}

#[test]
fn test_default_bands_used_when_names_absent() {
    let config = CubeConfig::new(CubeConfigParams {
        dataset_name: Some("S2L2A".to_string()),
        bbox: Some((10.2, 53.5, 10.3, 53.6)),
        spatial_res: Some(0.1 / 4000.0),
        time_range: Some((Some("2017-08-01".to_string()), Some("2017-08-31".to_string()))),
        time_period: Some("1D".parse().unwrap()),
        ..Default::default()
    })
    .unwrap();

    // The config still serializes band_names as null.
    assert_eq!(config.to_dict()["band_names"], serde_json::Value::Null);

    let provider = Arc::new(MockProvider::new((1000, 1000), 1));
    let (store, observed) = observed_store(Arc::clone(&provider), config);

    // All catalog default bands are addressable.
    assert_eq!(store.planner().bands().len(), 15);
    assert!(store.contains("B01/0.0.0"));
    assert!(store.contains("SCL/0.0.0"));

    store.get("B05/2.1.3").unwrap();
    let snapshot = observed.lock().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].request.band_names, vec!["B05".to_string()]);
}

#[test]
fn test_contains_and_list_keys() {
    let provider = Arc::new(MockProvider::new((1000, 1000), 1));
    let (store, _) = observed_store(Arc::clone(&provider), cube_config(Some("1D"), false));

    assert!(store.contains(".zgroup"));
    assert!(store.contains("B01/.zarray"));
    assert!(store.contains("B01/0.0.0"));
    assert!(store.contains("B01/30.3.3"));
    assert!(!store.contains("B01/31.0.0"));
    assert!(!store.contains("B01/0.4.0"));
    assert!(!store.contains("B99/0.0.0"));
    assert!(!store.contains("garbage"));

    assert!(matches!(
        store.get("garbage"),
        Err(CubeStoreError::KeyNotFound(_))
    ));
    assert!(matches!(
        store.get("B01/31.0.0"),
        Err(CubeStoreError::KeyNotFound(_))
    ));

    // Sorted, deterministic, and metadata-only.
    let keys = store.list_keys();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert_eq!(keys, store.list_keys());
    // Metadata only: nothing in the listing parses as a chunk address.
    assert!(keys.iter().all(|k| cube_store::ChunkKey::parse(k).is_none()));
}

#[test]
fn test_cached_store_serves_repeat_reads() {
    let provider = Arc::new(MockProvider::new((1000, 1000), 1));
    let (store, observed) = observed_store(Arc::clone(&provider), cube_config(Some("1D"), false));
    let cached = CachedStore::new(store, 64 * 1024 * 1024);

    let first = cached.get("B01/2.1.3").unwrap();
    let second = cached.get("B01/2.1.3").unwrap();
    assert_eq!(first, second);

    // The second read came from the cache: one provider call, one observation.
    assert_eq!(provider.num_tile_requests(), 1);
    assert_eq!(observed.lock().unwrap().len(), 1);

    // The wrapper exposes the same key surface as the inner store.
    assert!(cached.contains("B01/2.1.3"));
    assert!(cached.list_keys().contains(&".zgroup".to_string()));
}

#[test]
fn test_catalog_pagination() {
    let config = CubeConfig::new(CubeConfigParams {
        dataset_name: Some("S2L1C".to_string()),
        band_names: Some(vec!["B01".to_string()]),
        bbox: Some((10.2, 53.5, 10.3, 53.6)),
        spatial_res: Some(0.1 / 4000.0),
        time_range: Some((Some("2017-01-01".to_string()), Some("2018-01-01".to_string()))),
        ..Default::default()
    })
    .unwrap();

    let provider = Arc::new(MockProvider::new((1000, 1000), 1));
    let provider_dyn: Arc<dyn cube_store::TileProvider> = provider.clone();
    let store = CubeStore::open(provider_dyn, config).unwrap();

    // 183 features, every other day: two catalog pages.
    assert_eq!(store.planner().time_axis().len(), 183);
    let queries = provider.feature_queries.lock().unwrap().clone();
    assert_eq!(queries, vec![(100, 0), (100, 100)]);
}

#[test]
fn test_empty_tile_substitutes_fill() {
    let provider = Arc::new(MockProvider::with_mode((1000, 1000), 1, TileMode::Empty));
    let (store, observed) = observed_store(Arc::clone(&provider), cube_config(Some("1D"), false));

    let chunk = store.get("B01/0.0.0").unwrap();
    assert_eq!(chunk.len(), 1000 * 1000 * 4);
    let first = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    assert!(first.is_nan());

    // Fill substitution still counts as a successful fetch.
    assert_eq!(observed.lock().unwrap().len(), 1);
}

#[test]
fn test_shape_mismatch_surfaces_and_skips_observer() {
    let provider = Arc::new(MockProvider::with_mode((1000, 1000), 1, TileMode::WrongShape));
    let (store, observed) = observed_store(Arc::clone(&provider), cube_config(Some("1D"), false));

    assert!(matches!(
        store.get("B01/0.0.0"),
        Err(CubeStoreError::TileShapeMismatch { .. })
    ));
    assert!(observed.lock().unwrap().is_empty());
}
