//! Static dataset catalog: known dataset names, their default band lists,
//! and per-band sample type, fill value, and units.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::CubeConfig;
use crate::constants::DEFAULT_BAND_UNITS;
use crate::error::{CubeStoreError, Result};

/// Pixel sample type of a band, as declared by the process API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SampleType {
    Uint8,
    Uint16,
    Uint32,
    Int8,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl SampleType {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleType::Uint8 | SampleType::Int8 => 1,
            SampleType::Uint16 | SampleType::Int16 => 2,
            SampleType::Uint32 | SampleType::Int32 | SampleType::Float32 => 4,
            SampleType::Float64 => 8,
        }
    }

    /// The numpy-style dtype string used in synthesized array metadata.
    pub fn zarr_dtype(&self) -> &'static str {
        match self {
            SampleType::Uint8 => "|u1",
            SampleType::Uint16 => "<u2",
            SampleType::Uint32 => "<u4",
            SampleType::Int8 => "|i1",
            SampleType::Int16 => "<i2",
            SampleType::Int32 => "<i4",
            SampleType::Float32 => "<f4",
            SampleType::Float64 => "<f8",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SampleType::Uint8 => "UINT8",
            SampleType::Uint16 => "UINT16",
            SampleType::Uint32 => "UINT32",
            SampleType::Int8 => "INT8",
            SampleType::Int16 => "INT16",
            SampleType::Int32 => "INT32",
            SampleType::Float32 => "FLOAT32",
            SampleType::Float64 => "FLOAT64",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SampleType::Float32 | SampleType::Float64)
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SampleType {
    type Err = CubeStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UINT8" => Ok(SampleType::Uint8),
            "UINT16" => Ok(SampleType::Uint16),
            "UINT32" => Ok(SampleType::Uint32),
            "INT8" => Ok(SampleType::Int8),
            "INT16" => Ok(SampleType::Int16),
            "INT32" => Ok(SampleType::Int32),
            "FLOAT32" => Ok(SampleType::Float32),
            "FLOAT64" => Ok(SampleType::Float64),
            _ => Err(CubeStoreError::Provider(format!("unknown sample type: {}", s))),
        }
    }
}

/// Catalog defaults for one band.
#[derive(Debug, Clone, Copy)]
pub struct BandDefaults {
    pub sample_type: SampleType,
    pub fill_value: Option<f64>,
    pub units: &'static str,
}

const REFLECTANCE: BandDefaults = BandDefaults {
    sample_type: SampleType::Float32,
    fill_value: None,
    units: "reflectance",
};

const CLASS_MAP: BandDefaults = BandDefaults {
    sample_type: SampleType::Uint8,
    fill_value: Some(0.0),
    units: DEFAULT_BAND_UNITS,
};

const BACKSCATTER: BandDefaults = BandDefaults {
    sample_type: SampleType::Float32,
    fill_value: None,
    units: "linear power",
};

/// One known dataset: its feature-catalog collection and band defaults.
#[derive(Debug, Clone)]
pub struct DatasetEntry {
    pub name: &'static str,
    /// Collection identifier used for feature catalog queries.
    pub collection: &'static str,
    bands: Vec<(&'static str, BandDefaults)>,
}

impl DatasetEntry {
    /// Default band list, in declared order.
    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|(name, _)| (*name).to_string()).collect()
    }

    pub fn band(&self, name: &str) -> Option<&BandDefaults> {
        self.bands.iter().find(|(n, _)| *n == name).map(|(_, d)| d)
    }
}

const S2_SPECTRAL_BANDS: [&str; 13] = [
    "B01", "B02", "B03", "B04", "B05", "B06", "B07", "B08", "B8A", "B09", "B10", "B11", "B12",
];

fn s2_bands() -> Vec<(&'static str, BandDefaults)> {
    S2_SPECTRAL_BANDS.iter().map(|name| (*name, REFLECTANCE)).collect()
}

/// Static lookup of known datasets.
#[derive(Debug, Clone)]
pub struct DatasetCatalog {
    entries: Vec<DatasetEntry>,
}

impl Default for DatasetCatalog {
    fn default() -> Self {
        let mut s2l2a = s2_bands();
        // L2A has no B10 (removed by atmospheric correction) but adds the
        // scene classification and probability layers.
        s2l2a.retain(|(name, _)| *name != "B10");
        s2l2a.push(("SCL", CLASS_MAP));
        s2l2a.push(("SNW", CLASS_MAP));
        s2l2a.push(("CLD", CLASS_MAP));

        let entries = vec![
            DatasetEntry {
                name: "S2L1C",
                collection: "sentinel-2-l1c",
                bands: s2_bands(),
            },
            DatasetEntry {
                name: "S2L2A",
                collection: "sentinel-2-l2a",
                bands: s2l2a,
            },
            DatasetEntry {
                name: "S1GRD",
                collection: "sentinel-1-grd",
                bands: vec![
                    ("VV", BACKSCATTER),
                    ("VH", BACKSCATTER),
                    ("HH", BACKSCATTER),
                    ("HV", BACKSCATTER),
                ],
            },
            DatasetEntry {
                name: "DEM",
                collection: "dem",
                bands: vec![(
                    "DEM",
                    BandDefaults {
                        sample_type: SampleType::Float32,
                        fill_value: None,
                        units: "m",
                    },
                )],
            },
        ];

        Self { entries }
    }
}

impl DatasetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Resolve the effective band list for a config: user band names or the
    /// catalog default order, with user scalar-or-sequence overrides applied.
    ///
    /// A dataset missing from the catalog is accepted as BYOC when the config
    /// carries a `collection_id` and explicit `band_names`; otherwise it is
    /// an [`CubeStoreError::UnknownDataset`].
    pub fn resolve_bands(&self, config: &CubeConfig) -> Result<Vec<ResolvedBand>> {
        let entry = self.dataset(&config.dataset_name);

        let names: Vec<String> = match (&config.band_names, entry) {
            (Some(names), _) => names.clone(),
            (None, Some(entry)) => entry.band_names(),
            (None, None) => {
                return Err(CubeStoreError::UnknownDataset(config.dataset_name.clone()))
            }
        };

        let byoc = BandDefaults {
            sample_type: SampleType::Float32,
            fill_value: None,
            units: DEFAULT_BAND_UNITS,
        };

        let mut bands = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let defaults = match entry {
                Some(entry) => *entry.band(name).ok_or_else(|| CubeStoreError::UnknownBand {
                    dataset: config.dataset_name.clone(),
                    band: name.clone(),
                })?,
                None if config.collection_id.is_some() => byoc,
                None => return Err(CubeStoreError::UnknownDataset(config.dataset_name.clone())),
            };

            let sample_type = match &config.band_sample_types {
                Some(spec) => *pick(spec, i, names.len(), "band_sample_types")?,
                None => defaults.sample_type,
            };
            let fill_value = match &config.band_fill_values {
                Some(spec) => Some(*pick(spec, i, names.len(), "band_fill_values")?),
                None => defaults.fill_value,
            };
            let units = match &config.band_units {
                Some(spec) => pick(spec, i, names.len(), "band_units")?.clone(),
                None => defaults.units.to_string(),
            };

            bands.push(ResolvedBand {
                name: name.clone(),
                sample_type,
                fill_value,
                units,
            });
        }

        Ok(bands)
    }
}

/// One element of a scalar-or-sequence parameter, validated against the band count.
fn pick<'a, T>(
    spec: &'a crate::config::ScalarOrVec<T>,
    index: usize,
    num_bands: usize,
    param: &str,
) -> Result<&'a T> {
    use crate::config::ScalarOrVec;
    match spec {
        ScalarOrVec::Scalar(value) => Ok(value),
        ScalarOrVec::Vec(values) if values.len() == num_bands => Ok(&values[index]),
        ScalarOrVec::Vec(values) => Err(CubeStoreError::InvalidConfig(format!(
            "{} has {} entries but {} bands are configured",
            param,
            values.len(),
            num_bands
        ))),
    }
}

/// A band with all per-band information resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBand {
    pub name: String,
    pub sample_type: SampleType,
    pub fill_value: Option<f64>,
    pub units: String,
}
