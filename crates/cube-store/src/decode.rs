//! Tile payload decoding into the chunk byte layout.
//!
//! The chunk layout (3D `(y, x)`, 4D `(y, x, band)`) equals the provider's
//! row-major interleaved layout, so decoding is validation plus an optional
//! zlib inflation, never a transpose.

use bytes::{Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use std::io::Read;

use crate::catalog::SampleType;
use crate::error::{CubeStoreError, Result};
use crate::provider::TileResponse;

/// The chunk geometry a tile response must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkGeometry {
    pub width: u32,
    pub height: u32,
    pub components: u32,
    pub sample_type: SampleType,
}

impl ChunkGeometry {
    pub fn byte_len(&self) -> usize {
        self.width as usize
            * self.height as usize
            * self.components as usize
            * self.sample_type.bytes_per_sample()
    }
}

/// Decode a tile response into chunk bytes.
///
/// Fails with `EmptyTile` for a zero-length body (the caller substitutes
/// fill values) and `TileShapeMismatch` when the declared dimensions
/// disagree with the expected chunk geometry.
pub fn decode_tile(response: &TileResponse, expected: &ChunkGeometry) -> Result<Bytes> {
    if response.content.is_empty() {
        return Err(CubeStoreError::EmptyTile);
    }

    if response.width != expected.width
        || response.height != expected.height
        || response.components != expected.components
    {
        return Err(CubeStoreError::TileShapeMismatch {
            expected_width: expected.width,
            expected_height: expected.height,
            expected_components: expected.components,
            width: response.width,
            height: response.height,
            components: response.components,
        });
    }

    if response.sample_type != expected.sample_type {
        return Err(CubeStoreError::Provider(format!(
            "tile declares sample type {}, expected {}",
            response.sample_type, expected.sample_type
        )));
    }

    let expected_len = expected.byte_len();
    let body = if response.content.len() == expected_len {
        response.content.clone()
    } else if looks_like_zlib(&response.content) {
        let mut decoded = Vec::with_capacity(expected_len);
        ZlibDecoder::new(response.content.as_ref())
            .read_to_end(&mut decoded)
            .map_err(|e| CubeStoreError::Provider(format!("zlib tile envelope: {}", e)))?;
        Bytes::from(decoded)
    } else {
        return Err(CubeStoreError::Provider(format!(
            "tile body has {} bytes, expected {}",
            response.content.len(),
            expected_len
        )));
    };

    if body.len() != expected_len {
        return Err(CubeStoreError::Provider(format!(
            "decoded tile has {} bytes, expected {}",
            body.len(),
            expected_len
        )));
    }

    Ok(body)
}

/// Synthesize a chunk filled with per-band fill values.
///
/// Bands with no configured fill get NaN for float sample types and zero
/// otherwise.
pub fn fill_chunk(geometry: &ChunkGeometry, fill_values: &[Option<f64>]) -> Bytes {
    let patterns: Vec<Vec<u8>> = fill_values
        .iter()
        .map(|fill| encode_sample(geometry.sample_type, *fill))
        .collect();

    let num_pixels = geometry.width as usize * geometry.height as usize;
    let mut chunk = BytesMut::with_capacity(geometry.byte_len());
    for _ in 0..num_pixels {
        for pattern in &patterns {
            chunk.extend_from_slice(pattern);
        }
    }
    chunk.freeze()
}

/// Little-endian encoding of one sample.
fn encode_sample(sample_type: SampleType, fill: Option<f64>) -> Vec<u8> {
    match sample_type {
        SampleType::Uint8 => vec![fill.unwrap_or(0.0) as u8],
        SampleType::Int8 => vec![(fill.unwrap_or(0.0) as i8) as u8],
        SampleType::Uint16 => (fill.unwrap_or(0.0) as u16).to_le_bytes().to_vec(),
        SampleType::Int16 => (fill.unwrap_or(0.0) as i16).to_le_bytes().to_vec(),
        SampleType::Uint32 => (fill.unwrap_or(0.0) as u32).to_le_bytes().to_vec(),
        SampleType::Int32 => (fill.unwrap_or(0.0) as i32).to_le_bytes().to_vec(),
        SampleType::Float32 => (fill.map(|v| v as f32).unwrap_or(f32::NAN))
            .to_le_bytes()
            .to_vec(),
        SampleType::Float64 => fill.unwrap_or(f64::NAN).to_le_bytes().to_vec(),
    }
}

/// A zlib stream starts with 0x78 and a header checksum divisible by 31.
fn looks_like_zlib(body: &[u8]) -> bool {
    body.len() >= 2 && body[0] == 0x78 && (u16::from(body[0]) << 8 | u16::from(body[1])) % 31 == 0
}
