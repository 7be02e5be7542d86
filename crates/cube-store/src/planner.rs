//! Chunk-key parsing and translation into pixel-tile requests.

use cube_common::{BoundingBox, TimeRange};

use crate::catalog::{ResolvedBand, SampleType};
use crate::config::{CubeConfig, MosaickingOrder, Resampling};
use crate::constants::BAND_DATA_ARRAY_NAME;
use crate::error::{CubeStoreError, Result};
use crate::time_axis::TimeAxis;

/// A parsed chunk address.
///
/// 3D: `<band_name>/<t>.<y>.<x>`; 4D: `band_data/<t>.<y>.<x>.<b>` with the
/// whole band dimension in one chunk, so `b` is only ever 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkKey {
    pub variable: String,
    pub time: usize,
    pub y: usize,
    pub x: usize,
    pub band: Option<usize>,
}

impl ChunkKey {
    /// Parse a chunk key; returns `None` for anything outside the grammar.
    pub fn parse(key: &str) -> Option<Self> {
        let (variable, indices) = key.split_once('/')?;
        if variable.is_empty() {
            return None;
        }

        let parts: Vec<&str> = indices.split('.').collect();
        if parts.len() != 3 && parts.len() != 4 {
            return None;
        }
        if !parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
        {
            return None;
        }

        let mut numbers = parts.iter().map(|p| p.parse::<usize>());
        let time = numbers.next()?.ok()?;
        let y = numbers.next()?.ok()?;
        let x = numbers.next()?.ok()?;
        let band = match numbers.next() {
            Some(value) => Some(value.ok()?),
            None => None,
        };

        Some(Self {
            variable: variable.to_string(),
            time,
            y,
            x,
            band,
        })
    }
}

/// A fully populated pixel-tile request descriptor.
///
/// The planner never performs I/O; the store hands this to the external
/// client unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    pub dataset_name: String,
    pub collection_id: Option<String>,
    pub crs_uri: String,
    pub bbox: BoundingBox,
    pub spatial_res: f64,
    pub width: u32,
    pub height: u32,
    pub band_names: Vec<String>,
    pub sample_type: SampleType,
    pub fill_values: Vec<Option<f64>>,
    pub time_range: TimeRange,
    pub upsampling: Resampling,
    pub downsampling: Resampling,
    pub mosaicking_order: MosaickingOrder,
}

/// Maps chunk keys to tile requests for one opened cube.
#[derive(Debug, Clone)]
pub struct ChunkRequestPlanner {
    config: CubeConfig,
    bands: Vec<ResolvedBand>,
    time_axis: TimeAxis,
}

impl ChunkRequestPlanner {
    pub fn new(config: CubeConfig, bands: Vec<ResolvedBand>, time_axis: TimeAxis) -> Result<Self> {
        if bands.is_empty() {
            return Err(CubeStoreError::InvalidConfig(
                "cannot plan requests for a cube without bands".to_string(),
            ));
        }
        if config.four_d {
            let sample_type = bands[0].sample_type;
            if bands.iter().any(|b| b.sample_type != sample_type) {
                return Err(CubeStoreError::InvalidConfig(
                    "a 4D cube requires one sample type across all bands".to_string(),
                ));
            }
        }
        Ok(Self {
            config,
            bands,
            time_axis,
        })
    }

    pub fn config(&self) -> &CubeConfig {
        &self.config
    }

    pub fn bands(&self) -> &[ResolvedBand] {
        &self.bands
    }

    pub fn time_axis(&self) -> &TimeAxis {
        &self.time_axis
    }

    /// Whether a parsed chunk key addresses a chunk of this cube.
    pub fn covers(&self, key: &ChunkKey) -> bool {
        if self.chunk_bands(key).is_err() {
            return false;
        }
        let (num_tiles_x, num_tiles_y) = self.config.num_tiles;
        key.time < self.time_axis.len()
            && key.y < num_tiles_y as usize
            && key.x < num_tiles_x as usize
    }

    /// The bands a chunk of `variable` carries: the one named band in 3D,
    /// the full list in declared order in 4D.
    fn chunk_bands(&self, key: &ChunkKey) -> Result<Vec<&ResolvedBand>> {
        let not_found = || CubeStoreError::KeyNotFound(render_key(key));

        if self.config.four_d {
            if key.variable != BAND_DATA_ARRAY_NAME || key.band != Some(0) {
                return Err(not_found());
            }
            Ok(self.bands.iter().collect())
        } else {
            if key.band.is_some() {
                return Err(not_found());
            }
            let band = self
                .bands
                .iter()
                .find(|b| b.name == key.variable)
                .ok_or_else(not_found)?;
            Ok(vec![band])
        }
    }

    /// Translate a chunk key into a tile request.
    ///
    /// Fails with `KeyNotFound` when the variable is not part of the cube or
    /// an index is out of range.
    pub fn plan(&self, key: &ChunkKey) -> Result<TileRequest> {
        let bands = self.chunk_bands(key)?;

        let (num_tiles_x, num_tiles_y) = self.config.num_tiles;
        if key.time >= self.time_axis.len()
            || key.y >= num_tiles_y as usize
            || key.x >= num_tiles_x as usize
        {
            return Err(CubeStoreError::KeyNotFound(render_key(key)));
        }

        let (tw, th) = self.config.tile_size;
        let res = self.config.spatial_res;
        let bbox = self.config.bbox;

        let x_low = bbox.min_x + key.x as f64 * f64::from(tw) * res;
        let x_high = (x_low + f64::from(tw) * res).min(bbox.max_x);
        let y_high = bbox.max_y - key.y as f64 * f64::from(th) * res;
        let y_low = (y_high - f64::from(th) * res).max(bbox.min_y);

        let mut time_range = self
            .time_axis
            .bounds(key.time)
            .ok_or_else(|| CubeStoreError::KeyNotFound(render_key(key)))?;
        if let Some(tolerance) = self.config.time_tolerance {
            time_range = time_range.widen(tolerance);
        }

        Ok(TileRequest {
            dataset_name: self.config.dataset_name.clone(),
            collection_id: self.config.collection_id.clone(),
            crs_uri: self.config.crs.uri(),
            bbox: BoundingBox::new(x_low, y_low, x_high, y_high),
            spatial_res: res,
            width: tw,
            height: th,
            band_names: bands.iter().map(|b| b.name.clone()).collect(),
            sample_type: bands[0].sample_type,
            fill_values: bands.iter().map(|b| b.fill_value).collect(),
            time_range,
            upsampling: self.config.upsampling,
            downsampling: self.config.downsampling,
            mosaicking_order: self.config.mosaicking_order,
        })
    }
}

fn render_key(key: &ChunkKey) -> String {
    match key.band {
        Some(band) => format!("{}/{}.{}.{}.{}", key.variable, key.time, key.y, key.x, band),
        None => format!("{}/{}.{}.{}", key.variable, key.time, key.y, key.x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DatasetCatalog;
    use crate::config::CubeConfigParams;
    use cube_common::parse_instant;

    fn planner(four_d: bool) -> ChunkRequestPlanner {
        let config = CubeConfig::new(CubeConfigParams {
            dataset_name: Some("S2L1C".to_string()),
            band_names: Some(vec!["B01".to_string(), "B08".to_string(), "B12".to_string()]),
            bbox: Some((10.2, 53.5, 10.3, 53.6)),
            spatial_res: Some(0.1 / 4000.0),
            time_range: Some((Some("2017-08-01".to_string()), Some("2017-08-31".to_string()))),
            time_period: Some("1D".parse().unwrap()),
            four_d: Some(four_d),
            ..Default::default()
        })
        .unwrap();
        let bands = DatasetCatalog::new().resolve_bands(&config).unwrap();
        let axis = TimeAxis::regular(config.time_range, "1D".parse().unwrap());
        ChunkRequestPlanner::new(config, bands, axis).unwrap()
    }

    #[test]
    fn test_parse_chunk_keys() {
        let key = ChunkKey::parse("B01/2.1.3").unwrap();
        assert_eq!(key.variable, "B01");
        assert_eq!((key.time, key.y, key.x, key.band), (2, 1, 3, None));

        let key = ChunkKey::parse("band_data/2.1.3.0").unwrap();
        assert_eq!(key.variable, "band_data");
        assert_eq!((key.time, key.y, key.x, key.band), (2, 1, 3, Some(0)));

        assert!(ChunkKey::parse(".zgroup").is_none());
        assert!(ChunkKey::parse("B01/.zarray").is_none());
        assert!(ChunkKey::parse("B01/2.1").is_none());
        assert!(ChunkKey::parse("B01/2.1.3.0.4").is_none());
        assert!(ChunkKey::parse("B01/2.a.3").is_none());
        assert!(ChunkKey::parse("B01/2..3").is_none());
        assert!(ChunkKey::parse("/2.1.3").is_none());
    }

    #[test]
    fn test_plan_corner_bboxes() {
        let planner = planner(false);
        let res = 0.1 / 4000.0;
        let delta = 1000.0 * res;

        let request = planner
            .plan(&ChunkKey::parse("B01/2.0.0").unwrap())
            .unwrap();
        let (x1, y1, x2, y2) = request.bbox.as_tuple();
        assert!((x1 - 10.2).abs() < 1e-9);
        assert!((y1 - (53.6 - delta)).abs() < 1e-9);
        assert!((x2 - (10.2 + delta)).abs() < 1e-9);
        assert!((y2 - 53.6).abs() < 1e-9);
        assert_eq!((request.width, request.height), (1000, 1000));
        assert_eq!(request.band_names, vec!["B01".to_string()]);

        let request = planner
            .plan(&ChunkKey::parse("B01/2.3.3").unwrap())
            .unwrap();
        let (x1, y1, x2, y2) = request.bbox.as_tuple();
        assert!((x1 - (10.3 - delta)).abs() < 1e-9);
        assert!((y1 - 53.5).abs() < 1e-9);
        assert!((x2 - 10.3).abs() < 1e-9);
        assert!((y2 - (53.5 + delta)).abs() < 1e-9);
    }

    #[test]
    fn test_plan_time_subrange() {
        let planner = planner(false);
        let request = planner
            .plan(&ChunkKey::parse("B01/2.0.0").unwrap())
            .unwrap();
        assert_eq!(request.time_range.start, parse_instant("2017-08-03").unwrap());
        assert_eq!(request.time_range.end, parse_instant("2017-08-04").unwrap());
    }

    #[test]
    fn test_plan_4d_carries_all_bands() {
        let planner = planner(true);
        let request = planner
            .plan(&ChunkKey::parse("band_data/2.1.3.0").unwrap())
            .unwrap();
        assert_eq!(
            request.band_names,
            vec!["B01".to_string(), "B08".to_string(), "B12".to_string()]
        );

        // Only band-chunk 0 exists.
        assert!(matches!(
            planner.plan(&ChunkKey::parse("band_data/2.1.3.1").unwrap()),
            Err(CubeStoreError::KeyNotFound(_))
        ));
        // A named band is not addressable in a 4D cube.
        assert!(matches!(
            planner.plan(&ChunkKey::parse("B01/2.1.3").unwrap()),
            Err(CubeStoreError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_plan_rejects_out_of_range() {
        let planner = planner(false);
        for key in ["B01/31.0.0", "B01/2.4.0", "B01/2.0.4", "B99/0.0.0", "B01/2.1.3.0"] {
            assert!(matches!(
                planner.plan(&ChunkKey::parse(key).unwrap()),
                Err(CubeStoreError::KeyNotFound(_))
            ));
        }
    }
}
