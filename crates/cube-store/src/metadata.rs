//! Synthesis of the chunked-array metadata documents and the eagerly
//! materialized coordinate chunks.
//!
//! The store's key namespace is the zarr-v2 on-disk layout: a `.zgroup` and
//! `.zattrs` at the root, `<var>/.zarray` + `<var>/.zattrs` per variable,
//! and dot-delimited chunk indices. Coordinate chunks (`lon/0`, `lat/0`,
//! `time/0`, `time_bnds/0.0`, and `band/0` for 4D cubes) are derived from
//! the config alone and never fetched remotely.

use bytes::Bytes;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::catalog::ResolvedBand;
use crate::config::CubeConfig;
use crate::constants::BAND_DATA_ARRAY_NAME;
use crate::error::Result;
use crate::time_axis::TimeAxis;

const TIME_UNITS: &str = "seconds since 1970-01-01T00:00:00Z";
const TIME_CALENDAR: &str = "proleptic_gregorian";

/// Build the complete metadata map for an opened cube.
pub fn synthesize_metadata(
    config: &CubeConfig,
    bands: &[ResolvedBand],
    time_axis: &TimeAxis,
) -> Result<BTreeMap<String, Bytes>> {
    let mut vfs = BTreeMap::new();
    let (width, height) = config.size;
    let (tile_width, tile_height) = config.tile_size;
    let num_times = time_axis.len();

    vfs.insert(".zgroup".to_string(), doc(&json!({ "zarr_format": 2 }))?);
    vfs.insert(".zattrs".to_string(), doc(&group_attrs(config))?);

    let (lon_units, lat_units) = if config.crs.is_geographic() {
        ("degrees_east", "degrees_north")
    } else {
        ("m", "m")
    };

    // lon: cell centers, west to east.
    let lon_values: Vec<f64> = (0..width)
        .map(|i| config.bbox.min_x + (f64::from(i) + 0.5) * config.spatial_res)
        .collect();
    insert_array(
        &mut vfs,
        "lon",
        &json!({
            "chunks": [width],
            "compressor": null,
            "dtype": "<f8",
            "fill_value": null,
            "filters": null,
            "order": "C",
            "shape": [width],
            "zarr_format": 2,
        }),
        &json!({
            "_ARRAY_DIMENSIONS": ["lon"],
            "standard_name": "longitude",
            "units": lon_units,
        }),
    )?;
    vfs.insert("lon/0".to_string(), encode_f64(&lon_values));

    // lat: cell centers, north-up.
    let lat_values: Vec<f64> = (0..height)
        .map(|j| config.bbox.max_y - (f64::from(j) + 0.5) * config.spatial_res)
        .collect();
    insert_array(
        &mut vfs,
        "lat",
        &json!({
            "chunks": [height],
            "compressor": null,
            "dtype": "<f8",
            "fill_value": null,
            "filters": null,
            "order": "C",
            "shape": [height],
            "zarr_format": 2,
        }),
        &json!({
            "_ARRAY_DIMENSIONS": ["lat"],
            "standard_name": "latitude",
            "units": lat_units,
        }),
    )?;
    vfs.insert("lat/0".to_string(), encode_f64(&lat_values));

    // time: slot centers, with bounds linkage.
    let centers: Vec<i64> = time_axis.centers().iter().map(|c| c.timestamp()).collect();
    insert_array(
        &mut vfs,
        "time",
        &json!({
            "chunks": [num_times],
            "compressor": null,
            "dtype": "<i8",
            "fill_value": null,
            "filters": null,
            "order": "C",
            "shape": [num_times],
            "zarr_format": 2,
        }),
        &json!({
            "_ARRAY_DIMENSIONS": ["time"],
            "standard_name": "time",
            "units": TIME_UNITS,
            "calendar": TIME_CALENDAR,
            "bounds": "time_bnds",
        }),
    )?;
    vfs.insert("time/0".to_string(), encode_i64(&centers));

    let mut bounds = Vec::with_capacity(num_times * 2);
    for index in 0..num_times {
        if let Some(range) = time_axis.bounds(index) {
            bounds.push(range.start.timestamp());
            bounds.push(range.end.timestamp());
        }
    }
    insert_array(
        &mut vfs,
        "time_bnds",
        &json!({
            "chunks": [num_times, 2],
            "compressor": null,
            "dtype": "<i8",
            "fill_value": null,
            "filters": null,
            "order": "C",
            "shape": [num_times, 2],
            "zarr_format": 2,
        }),
        &json!({
            "_ARRAY_DIMENSIONS": ["time", "bnds"],
            "units": TIME_UNITS,
            "calendar": TIME_CALENDAR,
        }),
    )?;
    vfs.insert("time_bnds/0.0".to_string(), encode_i64(&bounds));

    if config.four_d {
        // The band dimension carries its labels as a coordinate.
        let labels: Vec<&str> = bands.iter().map(|b| b.name.as_str()).collect();
        let label_width = labels.iter().map(|l| l.chars().count()).max().unwrap_or(1);
        insert_array(
            &mut vfs,
            "band",
            &json!({
                "chunks": [bands.len()],
                "compressor": null,
                "dtype": format!("<U{}", label_width),
                "fill_value": null,
                "filters": null,
                "order": "C",
                "shape": [bands.len()],
                "zarr_format": 2,
            }),
            &json!({ "_ARRAY_DIMENSIONS": ["band"] }),
        )?;
        vfs.insert("band/0".to_string(), encode_labels(&labels, label_width));

        let band = &bands[0];
        insert_array(
            &mut vfs,
            BAND_DATA_ARRAY_NAME,
            &json!({
                "chunks": [1, tile_height, tile_width, bands.len()],
                "compressor": null,
                "dtype": band.sample_type.zarr_dtype(),
                "fill_value": fill_value_json(band),
                "filters": null,
                "order": "C",
                "shape": [num_times, height, width, bands.len()],
                "zarr_format": 2,
            }),
            &json!({
                "_ARRAY_DIMENSIONS": ["time", "lat", "lon", "band"],
                "units": band.units,
                "sample_type": band.sample_type.as_str(),
            }),
        )?;
    } else {
        for band in bands {
            insert_array(
                &mut vfs,
                &band.name,
                &json!({
                    "chunks": [1, tile_height, tile_width],
                    "compressor": null,
                    "dtype": band.sample_type.zarr_dtype(),
                    "fill_value": fill_value_json(band),
                    "filters": null,
                    "order": "C",
                    "shape": [num_times, height, width],
                    "zarr_format": 2,
                }),
                &json!({
                    "_ARRAY_DIMENSIONS": ["time", "lat", "lon"],
                    "units": band.units,
                    "sample_type": band.sample_type.as_str(),
                }),
            )?;
        }
    }

    Ok(vfs)
}

fn group_attrs(config: &CubeConfig) -> Value {
    json!({
        "Conventions": "CF-1.7",
        "dataset_name": config.dataset_name,
        "crs": config.crs.to_string(),
        "crs_uri": config.crs.uri(),
        "bbox": config.bbox.as_tuple(),
        "spatial_res": config.spatial_res,
        "time_range": [
            cube_common::format_instant(config.time_range.start),
            cube_common::format_instant(config.time_range.end),
        ],
        "source": "Sentinel Hub process API",
    })
}

fn fill_value_json(band: &ResolvedBand) -> Value {
    match band.fill_value {
        Some(value) => json!(value),
        None if band.sample_type.is_float() => json!("NaN"),
        None => json!(0),
    }
}

fn insert_array(
    vfs: &mut BTreeMap<String, Bytes>,
    name: &str,
    zarray: &Value,
    zattrs: &Value,
) -> Result<()> {
    vfs.insert(format!("{}/.zarray", name), doc(zarray)?);
    vfs.insert(format!("{}/.zattrs", name), doc(zattrs)?);
    Ok(())
}

fn doc(value: &Value) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec_pretty(value)?))
}

fn encode_f64(values: &[f64]) -> Bytes {
    let mut bytes = Vec::with_capacity(values.len() * 8);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    Bytes::from(bytes)
}

fn encode_i64(values: &[i64]) -> Bytes {
    let mut bytes = Vec::with_capacity(values.len() * 8);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    Bytes::from(bytes)
}

/// Fixed-width little-endian UTF-32, the layout of a numpy `<U` array.
fn encode_labels(labels: &[&str], width: usize) -> Bytes {
    let mut bytes = Vec::with_capacity(labels.len() * width * 4);
    for label in labels {
        let mut count = 0;
        for ch in label.chars().take(width) {
            bytes.extend_from_slice(&(ch as u32).to_le_bytes());
            count += 1;
        }
        for _ in count..width {
            bytes.extend_from_slice(&0u32.to_le_bytes());
        }
    }
    Bytes::from(bytes)
}
