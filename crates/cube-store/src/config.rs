//! Cube configuration: request validation, bbox/tile snapping, time
//! normalization, and the ordered dictionary form.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fmt;

use cube_common::{format_instant, parse_instant, BoundingBox, CrsId, TimeDelta, TimeRange};

use crate::catalog::SampleType;
use crate::constants::{default_time_tolerance, DEFAULT_TILE_SIZE, SH_MAX_IMAGE_SIZE};
use crate::error::{CubeStoreError, Result};

/// Resampling method for the pixel-tile requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Resampling {
    #[default]
    Nearest,
    Bilinear,
    Bicubic,
}

impl Resampling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resampling::Nearest => "NEAREST",
            Resampling::Bilinear => "BILINEAR",
            Resampling::Bicubic => "BICUBIC",
        }
    }
}

impl fmt::Display for Resampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order in which overlapping acquisitions are mosaicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MosaickingOrder {
    #[default]
    #[serde(rename = "mostRecent")]
    MostRecent,
    #[serde(rename = "leastRecent")]
    LeastRecent,
    #[serde(rename = "leastCC")]
    LeastCc,
}

impl MosaickingOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            MosaickingOrder::MostRecent => "mostRecent",
            MosaickingOrder::LeastRecent => "leastRecent",
            MosaickingOrder::LeastCc => "leastCC",
        }
    }
}

impl fmt::Display for MosaickingOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-band parameter given either as one scalar for all bands or as a
/// sequence aligned with the band list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarOrVec<T> {
    Scalar(T),
    Vec(Vec<T>),
}

/// Tile size given either as one edge length or as `(width, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TileSizeSpec {
    Edge(u32),
    Pair(u32, u32),
}

impl TileSizeSpec {
    fn dims(&self) -> (u32, u32) {
        match *self {
            TileSizeSpec::Edge(edge) => (edge, edge),
            TileSizeSpec::Pair(w, h) => (w, h),
        }
    }
}

/// The named parameter set accepted for cube configuration.
///
/// Every recognized parameter is enumerated here; [`CubeConfig::from_dict`]
/// rejects anything else by name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CubeConfigParams {
    pub dataset_name: Option<String>,
    pub band_names: Option<Vec<String>>,
    pub band_sample_types: Option<ScalarOrVec<SampleType>>,
    pub band_fill_values: Option<ScalarOrVec<f64>>,
    pub band_units: Option<ScalarOrVec<String>>,
    pub collection_id: Option<String>,
    pub crs: Option<String>,
    /// `geometry` is a legacy alias for `bbox`.
    #[serde(alias = "geometry")]
    pub bbox: Option<(f64, f64, f64, f64)>,
    pub spatial_res: Option<f64>,
    pub tile_size: Option<TileSizeSpec>,
    pub time_range: Option<(Option<String>, Option<String>)>,
    pub time_period: Option<TimeDelta>,
    pub time_tolerance: Option<TimeDelta>,
    pub four_d: Option<bool>,
    pub upsampling: Option<Resampling>,
    pub downsampling: Option<Resampling>,
    pub mosaicking_order: Option<MosaickingOrder>,
}

/// Parameter names accepted by [`CubeConfig::from_dict`], including the
/// legacy `geometry` alias.
const RECOGNIZED_PARAMS: [&str; 18] = [
    "band_fill_values",
    "band_names",
    "band_sample_types",
    "band_units",
    "bbox",
    "collection_id",
    "crs",
    "dataset_name",
    "downsampling",
    "four_d",
    "geometry",
    "mosaicking_order",
    "spatial_res",
    "tile_size",
    "time_period",
    "time_range",
    "time_tolerance",
    "upsampling",
];

/// A validated, normalized cube configuration. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeConfig {
    pub dataset_name: String,
    pub band_names: Option<Vec<String>>,
    pub band_sample_types: Option<ScalarOrVec<SampleType>>,
    pub band_fill_values: Option<ScalarOrVec<f64>>,
    pub band_units: Option<ScalarOrVec<String>>,
    pub collection_id: Option<String>,
    pub crs: CrsId,
    /// Snapped so that width and height are whole pixel multiples.
    pub bbox: BoundingBox,
    pub spatial_res: f64,
    /// Adjusted per the snapping rules; always divides `size` evenly.
    pub tile_size: (u32, u32),
    /// Image size in pixels, `(width, height)`.
    pub size: (u32, u32),
    pub num_tiles: (u32, u32),
    pub time_range: TimeRange,
    pub time_period: Option<TimeDelta>,
    pub time_tolerance: Option<TimeDelta>,
    pub four_d: bool,
    pub upsampling: Resampling,
    pub downsampling: Resampling,
    pub mosaicking_order: MosaickingOrder,
}

impl CubeConfig {
    /// Validate and normalize a parameter set into a cube configuration.
    pub fn new(params: CubeConfigParams) -> Result<Self> {
        let dataset_name = params
            .dataset_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| invalid("dataset_name must be a non-empty string"))?;

        if let Some(names) = &params.band_names {
            if names.is_empty() {
                return Err(invalid("band_names must not be empty when given"));
            }
            let mut seen = HashSet::new();
            for name in names {
                if !seen.insert(name.as_str()) {
                    return Err(invalid(format!("duplicate band name '{}'", name)));
                }
            }
        }

        let crs = match &params.crs {
            Some(crs) => CrsId::parse(crs)?,
            None => CrsId::default(),
        };

        let bbox = BoundingBox::from(
            params
                .bbox
                .ok_or_else(|| invalid("bbox (or geometry) is required"))?,
        );
        if !bbox.is_valid() {
            return Err(invalid(format!(
                "invalid bbox {:?}: x1 < x2 and y1 < y2 required",
                bbox.as_tuple()
            )));
        }

        let spatial_res = params
            .spatial_res
            .ok_or_else(|| invalid("spatial_res is required"))?;
        if spatial_res <= 0.0 {
            return Err(invalid("spatial_res must be positive"));
        }

        let (tw, th) = params
            .tile_size
            .unwrap_or(TileSizeSpec::Edge(DEFAULT_TILE_SIZE))
            .dims();
        if tw == 0 || th == 0 {
            return Err(invalid("tile_size must be positive"));
        }

        let w0 = (bbox.width() / spatial_res).round() as i64;
        let h0 = (bbox.height() / spatial_res).round() as i64;
        if w0 < 1 || h0 < 1 {
            return Err(invalid("bbox is empty at the given spatial_res"));
        }

        let (size, tile_size) = adjust_sizes(w0 as u32, h0 as u32, (tw, th));
        if tile_size.0 > SH_MAX_IMAGE_SIZE || tile_size.1 > SH_MAX_IMAGE_SIZE {
            return Err(invalid(format!(
                "tile size {}x{} exceeds the maximum image size of {}",
                tile_size.0, tile_size.1, SH_MAX_IMAGE_SIZE
            )));
        }
        let num_tiles = (size.0 / tile_size.0, size.1 / tile_size.1);

        let bbox = BoundingBox::new(
            bbox.min_x,
            bbox.min_y,
            bbox.min_x + f64::from(size.0) * spatial_res,
            bbox.min_y + f64::from(size.1) * spatial_res,
        );

        let (t1, t2) = params.time_range.unwrap_or((None, None));
        let start = match t1 {
            Some(s) => parse_instant(&s)?,
            None => DateTime::<Utc>::UNIX_EPOCH,
        };
        let end = match t2 {
            Some(s) => parse_instant(&s)?,
            None => today(),
        };
        if start > end {
            return Err(invalid("time_range start is after its end"));
        }

        let (time_period, time_tolerance) = match (params.time_period, params.time_tolerance) {
            (Some(_), Some(_)) => {
                return Err(invalid(
                    "time_period and time_tolerance are mutually exclusive",
                ))
            }
            (Some(period), None) if !period.is_positive() => {
                return Err(invalid("time_period must be positive"))
            }
            (None, Some(tolerance)) if !tolerance.is_positive() => {
                return Err(invalid("time_tolerance must be positive"))
            }
            (Some(period), None) => (Some(period), None),
            (None, Some(tolerance)) => (None, Some(tolerance)),
            (None, None) => (None, Some(default_time_tolerance())),
        };

        Ok(Self {
            dataset_name,
            band_names: params.band_names,
            band_sample_types: params.band_sample_types,
            band_fill_values: params.band_fill_values,
            band_units: params.band_units,
            collection_id: params.collection_id,
            crs,
            bbox,
            spatial_res,
            tile_size,
            size,
            num_tiles,
            time_range: TimeRange::new(start, end),
            time_period,
            time_tolerance,
            four_d: params.four_d.unwrap_or(false),
            upsampling: params.upsampling.unwrap_or_default(),
            downsampling: params.downsampling.unwrap_or_default(),
            mosaicking_order: params.mosaicking_order.unwrap_or_default(),
        })
    }

    /// Build a configuration from a dictionary, rejecting unknown keys.
    pub fn from_dict(dict: Value) -> Result<Self> {
        let object = dict
            .as_object()
            .ok_or_else(|| invalid("cube configuration must be a mapping"))?;

        let mut unknown: Vec<&str> = object
            .keys()
            .map(String::as_str)
            .filter(|key| !RECOGNIZED_PARAMS.contains(key))
            .collect();
        unknown.sort_unstable();

        match unknown.as_slice() {
            [] => {}
            [name] => {
                return Err(invalid(format!(
                    "Found invalid parameter '{}' in cube configuration",
                    name
                )))
            }
            names => {
                let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
                return Err(invalid(format!(
                    "Found invalid parameters in cube configuration: {}",
                    quoted.join(", ")
                )));
            }
        }

        let params: CubeConfigParams = serde_json::from_value(dict)?;
        Self::new(params)
    }

    /// The dictionary form: exactly the recognized value keys, in a fixed
    /// order. [`CubeConfig::from_dict`] is the inverse.
    pub fn to_dict(&self) -> Value {
        let mut dict = Map::new();
        dict.insert("band_names".into(), json!(self.band_names));
        dict.insert("band_sample_types".into(), json!(self.band_sample_types));
        dict.insert("band_fill_values".into(), json!(self.band_fill_values));
        dict.insert("band_units".into(), json!(self.band_units));
        dict.insert("collection_id".into(), json!(self.collection_id));
        dict.insert("crs".into(), json!(self.crs.to_string()));
        dict.insert("dataset_name".into(), json!(self.dataset_name));
        dict.insert("four_d".into(), json!(self.four_d));
        dict.insert("bbox".into(), json!(self.bbox.as_tuple()));
        dict.insert("spatial_res".into(), json!(self.spatial_res));
        dict.insert("upsampling".into(), json!(self.upsampling.as_str()));
        dict.insert("downsampling".into(), json!(self.downsampling.as_str()));
        dict.insert(
            "mosaicking_order".into(),
            json!(self.mosaicking_order.as_str()),
        );
        dict.insert("tile_size".into(), json!([self.tile_size.0, self.tile_size.1]));
        dict.insert(
            "time_period".into(),
            json!(self.time_period.map(|p| p.to_string())),
        );
        dict.insert(
            "time_range".into(),
            json!([
                format_instant(self.time_range.start),
                format_instant(self.time_range.end),
            ]),
        );
        dict.insert(
            "time_tolerance".into(),
            json!(self.time_tolerance.map(|t| t.to_string())),
        );
        Value::Object(dict)
    }

    /// Legacy accessor; `geometry` is a synonym for `bbox`.
    pub fn geometry(&self) -> BoundingBox {
        self.bbox
    }

    pub fn is_geographic_crs(&self) -> bool {
        self.crs.is_geographic()
    }

    pub fn is_wgs84_crs(&self) -> bool {
        self.crs.is_wgs84()
    }
}

/// Today's date at second resolution, midnight UTC.
fn today() -> DateTime<Utc> {
    chrono::TimeZone::from_utc_datetime(
        &Utc,
        &Utc::now().date_naive().and_time(NaiveTime::MIN),
    )
}

fn invalid(message: impl Into<String>) -> CubeStoreError {
    CubeStoreError::InvalidConfig(message.into())
}

/// Snap the nominal pixel size to the tile grid.
///
/// A cube smaller than 1.5 tiles in both dimensions collapses to a single
/// tile of exactly its own size; anything larger is rounded up to whole
/// tile multiples.
fn adjust_sizes(w0: u32, h0: u32, (tw, th): (u32, u32)) -> ((u32, u32), (u32, u32)) {
    if 2 * w0 < 3 * tw && 2 * h0 < 3 * th {
        ((w0, h0), (w0, h0))
    } else {
        ((ceil_multiple(w0, tw), ceil_multiple(h0, th)), (tw, th))
    }
}

fn ceil_multiple(value: u32, step: u32) -> u32 {
    value.div_ceil(step) * step
}
