//! The narrow collaborator surface the store depends on.
//!
//! The core owns no socket: callers pass a [`TileProvider`] implementation
//! (an HTTP client, a test mock) and the store only ever sees these types.

use bytes::Bytes;
use serde::Deserialize;

use cube_common::{BoundingBox, TimeRange};

use crate::catalog::SampleType;
use crate::error::Result;
use crate::planner::TileRequest;

/// One page of a feature catalog query.
#[derive(Debug, Clone)]
pub struct FeatureQuery {
    /// Collection identifier (catalog collection or BYOC collection id).
    pub collection: String,
    pub bbox: BoundingBox,
    pub time_range: TimeRange,
    /// Page size; the catalog caps this at `SH_CATALOG_FEATURE_LIMIT`.
    pub limit: usize,
    pub offset: usize,
}

/// A catalog feature describing one acquisition footprint.
#[derive(Debug, Clone, Deserialize)]
pub struct TileFeature {
    pub properties: TileFeatureProperties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TileFeatureProperties {
    /// Acquisition date, `yyyy-mm-dd`.
    pub date: String,
    /// Acquisition time of day, `hh:mm:ss`.
    pub time: String,
}

/// A decoded pixel-tile response.
///
/// The transport layer maps the provider's `SH-Width`, `SH-Height`,
/// `SH-Components`, and `SH-SampleType` headers into the declared fields;
/// `content` is the body, raw or zlib-wrapped.
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub width: u32,
    pub height: u32,
    pub components: u32,
    pub sample_type: SampleType,
    pub content: Bytes,
}

/// External data provider: feature catalog plus pixel tiles.
///
/// Implementations must be thread-safe; the store issues calls from any
/// caller thread and never serializes them.
pub trait TileProvider: Send + Sync {
    /// Fetch one page of catalog features intersecting the query.
    fn fetch_features(&self, query: &FeatureQuery) -> Result<Vec<TileFeature>>;

    /// Fetch the pixel tile described by a planned request.
    fn fetch_tile(&self, request: &TileRequest) -> Result<TileResponse>;
}
