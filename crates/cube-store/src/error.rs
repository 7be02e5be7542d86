//! Error types for the cube store.

use thiserror::Error;

/// Errors raised while configuring, opening, or reading a cube store.
#[derive(Error, Debug)]
pub enum CubeStoreError {
    /// Invalid or conflicting cube configuration parameters.
    #[error("{0}")]
    InvalidConfig(String),

    /// CRS neither in short form nor a known definition URI.
    #[error(transparent)]
    UnknownCrs(#[from] cube_common::CrsParseError),

    /// Dataset name not present in the dataset catalog.
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),

    /// Requested band not listed for the dataset.
    #[error("unknown band '{band}' for dataset '{dataset}'")]
    UnknownBand { dataset: String, band: String },

    /// Key outside the synthesized set and not a valid chunk address.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Tile response does not match the expected chunk geometry.
    #[error("tile shape mismatch: expected {expected_width}x{expected_height}x{expected_components}, got {width}x{height}x{components}")]
    TileShapeMismatch {
        expected_width: u32,
        expected_height: u32,
        expected_components: u32,
        width: u32,
        height: u32,
        components: u32,
    },

    /// Tile response carried a zero-length body.
    #[error("empty tile response")]
    EmptyTile,

    /// Feature catalog query failed.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Pixel-tile request failed.
    #[error("provider error: {0}")]
    Provider(String),
}

impl From<cube_common::TimeParseError> for CubeStoreError {
    fn from(err: cube_common::TimeParseError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

impl From<serde_json::Error> for CubeStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

/// Result type for cube store operations.
pub type Result<T> = std::result::Result<T, CubeStoreError>;
