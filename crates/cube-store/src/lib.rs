//! Virtual chunked-array store over a remote tiled Earth-observation archive.
//!
//! A [`CubeStore`] presents a data cube (`time × lat × lon [× band]`) as the
//! flat key/value map of a chunked on-disk array: metadata documents plus
//! `var/t.y.x` chunk keys. Metadata and coordinate chunks are synthesized
//! eagerly from the [`CubeConfig`] geometry; data chunks are materialized
//! lazily by translating each key into a pixel-tile request against a
//! [`TileProvider`].

pub mod catalog;
pub mod config;
pub mod constants;
pub mod decode;
pub mod error;
pub mod metadata;
pub mod planner;
pub mod provider;
pub mod store;
pub mod time_axis;

pub use catalog::{DatasetCatalog, ResolvedBand, SampleType};
pub use config::{CubeConfig, CubeConfigParams, MosaickingOrder, Resampling};
pub use error::{CubeStoreError, Result};
pub use planner::{ChunkKey, ChunkRequestPlanner, TileRequest};
pub use provider::{FeatureQuery, TileFeature, TileProvider, TileResponse};
pub use store::{CachedStore, ChunkObservation, ChunkedStore, CubeStore, Observer};
pub use time_axis::TimeAxis;
