//! Constants of the provider protocol with externally visible meaning.

use cube_common::TimeDelta;

pub const DEFAULT_SH_API_URL: &str = "https://services.sentinel-hub.com";
pub const DEFAULT_SH_OAUTH2_URL: &str = "https://services.sentinel-hub.com/oauth";

/// The feature catalog serves at most this many features per page.
pub const SH_CATALOG_FEATURE_LIMIT: usize = 100;

pub const DEFAULT_RETRY_BACKOFF_MAX: u64 = 40; // milliseconds
pub const DEFAULT_RETRY_BACKOFF_BASE: f64 = 1.001;
pub const DEFAULT_NUM_RETRIES: u32 = 200;

pub const DEFAULT_BAND_UNITS: &str = "DN";

/// Spatial chunk edge used when the user gives no tile size.
pub const DEFAULT_TILE_SIZE: u32 = 1000;

/// The process API rejects images larger than this in either dimension.
pub const SH_MAX_IMAGE_SIZE: u32 = 2500;

/// Name of the single data variable of a 4D cube.
pub const BAND_DATA_ARRAY_NAME: &str = "band_data";

/// Tolerance applied to irregular time axes when none is configured.
pub fn default_time_tolerance() -> TimeDelta {
    TimeDelta::minutes(10)
}
