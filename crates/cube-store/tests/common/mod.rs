//! Shared test support: a scripted tile provider.

use bytes::Bytes;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Duration;
use cube_store::{
    FeatureQuery, Result, SampleType, TileFeature, TileProvider, TileRequest, TileResponse,
};

/// What the mock returns for tile requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileMode {
    /// zlib level-8 compressed float32 zeros of the expected shape.
    Zeros,
    /// A zero-length body.
    Empty,
    /// A body declaring twice the expected width.
    WrongShape,
}

/// Scripted provider: features every 48 h starting 8 h into the queried
/// range, and synthetic float32 tiles.
pub struct MockProvider {
    tile_size: (u32, u32),
    components: u32,
    mode: TileMode,
    pub tile_requests: AtomicUsize,
    pub feature_queries: Mutex<Vec<(usize, usize)>>,
}

impl MockProvider {
    pub fn new(tile_size: (u32, u32), components: u32) -> Self {
        Self::with_mode(tile_size, components, TileMode::Zeros)
    }

    pub fn with_mode(tile_size: (u32, u32), components: u32, mode: TileMode) -> Self {
        Self {
            tile_size,
            components,
            mode,
            tile_requests: AtomicUsize::new(0),
            feature_queries: Mutex::new(Vec::new()),
        }
    }

    pub fn num_tile_requests(&self) -> usize {
        self.tile_requests.load(Ordering::SeqCst)
    }
}

impl TileProvider for MockProvider {
    fn fetch_features(&self, query: &FeatureQuery) -> Result<Vec<TileFeature>> {
        self.feature_queries
            .lock()
            .unwrap()
            .push((query.limit, query.offset));

        let mut features = Vec::new();
        let mut instant = query.time_range.start + Duration::hours(8);
        while instant < query.time_range.end {
            let rendered = instant.format("%Y-%m-%dT%H:%M:%S").to_string();
            let (date, time) = rendered.split_once('T').unwrap();
            features.push(
                serde_json::from_value(serde_json::json!({
                    "type": "Feature",
                    "properties": { "date": date, "time": time },
                }))
                .unwrap(),
            );
            instant += Duration::hours(48);
        }

        let page: Vec<TileFeature> = features
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();
        Ok(page)
    }

    fn fetch_tile(&self, _request: &TileRequest) -> Result<TileResponse> {
        self.tile_requests.fetch_add(1, Ordering::SeqCst);

        let (width, height) = self.tile_size;
        let num_samples = width as usize * height as usize * self.components as usize;

        let (declared_width, content) = match self.mode {
            TileMode::Zeros => {
                let raw = vec![0u8; num_samples * 4];
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(8));
                encoder.write_all(&raw).unwrap();
                (width, encoder.finish().unwrap())
            }
            TileMode::Empty => (width, Vec::new()),
            TileMode::WrongShape => (width * 2, vec![0u8; num_samples * 4]),
        };

        Ok(TileResponse {
            width: declared_width,
            height,
            components: self.components,
            sample_type: SampleType::Float32,
            content: Bytes::from(content),
        })
    }
}
