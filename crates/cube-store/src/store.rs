//! The virtual key/value store facade.
//!
//! `CubeStore` serves the synthesized metadata map (built once at open,
//! read-only afterwards) and materializes chunk keys lazily through the
//! planner, the provider, and the decoder. Any number of threads may call
//! `get` concurrently; the only blocking point is the provider call inside
//! a chunk fetch.

use bytes::Bytes;
use lru::LruCache;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use cube_common::{BoundingBox, TimeRange};

use crate::catalog::DatasetCatalog;
use crate::config::CubeConfig;
use crate::decode::{decode_tile, fill_chunk, ChunkGeometry};
use crate::error::{CubeStoreError, Result};
use crate::metadata::synthesize_metadata;
use crate::planner::{ChunkKey, ChunkRequestPlanner, TileRequest};
use crate::provider::TileProvider;
use crate::time_axis::{query_time_ranges, TimeAxis};

/// The narrow store capability: a flat, read-only key/value view.
///
/// Wrappers (caching layers, instrumentation) implement the same trait.
pub trait ChunkedStore: Send + Sync {
    /// All synthesized metadata keys, in deterministic (sorted) order.
    fn list_keys(&self) -> Vec<String>;

    /// True for any metadata key and any in-range chunk key.
    fn contains(&self, key: &str) -> bool;

    /// Fetch a key. Metadata keys never block; chunk keys are materialized
    /// on demand.
    fn get(&self, key: &str) -> Result<Bytes>;
}

/// The record handed to the observer after each successful chunk fetch.
#[derive(Debug, Clone)]
pub struct ChunkObservation {
    /// The chunk's variable: a band name, or `band_data` for 4D cubes.
    pub band_name: String,
    /// `(t, y, x)` or `(t, y, x, b)`.
    pub chunk_index: Vec<usize>,
    pub bbox: BoundingBox,
    pub time_range: TimeRange,
    pub request: TileRequest,
}

/// Per-chunk observation hook. Invoked under no lock; must be internally
/// thread-safe when reads are concurrent.
pub type Observer = Arc<dyn Fn(&ChunkObservation) + Send + Sync>;

/// Virtual store over one cube configuration and one provider.
pub struct CubeStore {
    provider: Arc<dyn TileProvider>,
    planner: ChunkRequestPlanner,
    vfs: BTreeMap<String, Bytes>,
    observer: Option<Observer>,
}

impl CubeStore {
    /// Open a cube store: resolve the dataset, build the time axis, and
    /// synthesize the metadata map.
    ///
    /// Irregular cubes (no `time_period`) query the provider's feature
    /// catalog here; everything else is derived from the config.
    pub fn open(provider: Arc<dyn TileProvider>, config: CubeConfig) -> Result<Self> {
        Self::open_observed(provider, config, None)
    }

    /// Like [`CubeStore::open`], with a per-chunk observation hook.
    pub fn open_observed(
        provider: Arc<dyn TileProvider>,
        config: CubeConfig,
        observer: Option<Observer>,
    ) -> Result<Self> {
        let catalog = DatasetCatalog::new();
        let bands = catalog.resolve_bands(&config)?;

        let time_axis = match config.time_period {
            Some(period) => TimeAxis::regular(config.time_range, period),
            None => {
                let collection = catalog
                    .dataset(&config.dataset_name)
                    .map(|entry| entry.collection.to_string())
                    .or_else(|| config.collection_id.as_ref().map(|id| format!("byoc-{}", id)))
                    .ok_or_else(|| CubeStoreError::UnknownDataset(config.dataset_name.clone()))?;
                let ranges =
                    query_time_ranges(provider.as_ref(), &collection, config.bbox, config.time_range)?;
                TimeAxis::irregular(ranges)
            }
        };

        info!(
            dataset = %config.dataset_name,
            width = config.size.0,
            height = config.size.1,
            num_times = time_axis.len(),
            num_bands = bands.len(),
            four_d = config.four_d,
            "opened cube store"
        );

        let vfs = synthesize_metadata(&config, &bands, &time_axis)?;
        let planner = ChunkRequestPlanner::new(config, bands, time_axis)?;

        Ok(Self {
            provider,
            planner,
            vfs,
            observer,
        })
    }

    pub fn planner(&self) -> &ChunkRequestPlanner {
        &self.planner
    }

    fn fetch_chunk(&self, key: &str, parsed: &ChunkKey) -> Result<Bytes> {
        let request = self.planner.plan(parsed)?;

        let geometry = ChunkGeometry {
            width: request.width,
            height: request.height,
            components: request.band_names.len() as u32,
            sample_type: request.sample_type,
        };

        debug!(
            key = %key,
            bbox = ?request.bbox.as_tuple(),
            "fetching chunk"
        );
        let response = self.provider.fetch_tile(&request)?;

        let bytes = match decode_tile(&response, &geometry) {
            Ok(bytes) => bytes,
            // An empty tile means no data for the subrange; substitute fill.
            Err(CubeStoreError::EmptyTile) => fill_chunk(&geometry, &request.fill_values),
            Err(err) => return Err(err),
        };

        if let Some(observer) = &self.observer {
            let mut chunk_index = vec![parsed.time, parsed.y, parsed.x];
            if let Some(band) = parsed.band {
                chunk_index.push(band);
            }
            observer(&ChunkObservation {
                band_name: parsed.variable.clone(),
                chunk_index,
                bbox: request.bbox,
                time_range: request.time_range,
                request,
            });
        }

        Ok(bytes)
    }
}

impl ChunkedStore for CubeStore {
    fn list_keys(&self) -> Vec<String> {
        self.vfs.keys().cloned().collect()
    }

    fn contains(&self, key: &str) -> bool {
        if self.vfs.contains_key(key) {
            return true;
        }
        match ChunkKey::parse(key) {
            Some(parsed) => self.planner.covers(&parsed),
            None => false,
        }
    }

    fn get(&self, key: &str) -> Result<Bytes> {
        if let Some(bytes) = self.vfs.get(key) {
            return Ok(bytes.clone());
        }

        let parsed =
            ChunkKey::parse(key).ok_or_else(|| CubeStoreError::KeyNotFound(key.to_string()))?;
        self.fetch_chunk(key, &parsed)
    }
}

struct CacheState {
    entries: LruCache<String, Bytes>,
    current_bytes: usize,
}

/// Byte-bounded LRU wrapper implementing the same store capability.
///
/// Coalescing of concurrent builds of the same key is out of scope: two
/// simultaneous misses on one key both fall through to the inner store.
pub struct CachedStore<S> {
    inner: S,
    state: Mutex<CacheState>,
    max_bytes: usize,
}

impl<S: ChunkedStore> CachedStore<S> {
    /// Wrap `inner` with a cache holding at most `max_bytes` of values.
    pub fn new(inner: S, max_bytes: usize) -> Self {
        Self {
            inner,
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                current_bytes: 0,
            }),
            max_bytes,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ChunkedStore> ChunkedStore for CachedStore<S> {
    fn list_keys(&self) -> Vec<String> {
        self.inner.list_keys()
    }

    fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }

    fn get(&self, key: &str) -> Result<Bytes> {
        if let Ok(mut state) = self.state.lock() {
            if let Some(bytes) = state.entries.get(key) {
                return Ok(bytes.clone());
            }
        }

        // Fetch outside the lock so slow chunk builds do not serialize.
        let bytes = self.inner.get(key)?;

        if bytes.len() <= self.max_bytes {
            if let Ok(mut state) = self.state.lock() {
                while state.current_bytes + bytes.len() > self.max_bytes {
                    match state.entries.pop_lru() {
                        Some((_, evicted)) => {
                            state.current_bytes =
                                state.current_bytes.saturating_sub(evicted.len());
                        }
                        None => break,
                    }
                }
                state.current_bytes += bytes.len();
                state.entries.put(key.to_string(), bytes.clone());
            }
        }

        Ok(bytes)
    }
}
