//! Time axis construction: regular axes from a period, irregular axes from
//! the provider's feature catalog.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use cube_common::{parse_instant, TimeDelta, TimeRange};

use crate::constants::SH_CATALOG_FEATURE_LIMIT;
use crate::error::{CubeStoreError, Result};
use crate::provider::{FeatureQuery, TileFeature, TileProvider};

/// The time dimension of a cube.
///
/// Coordinate values are slot centers; `bounds` are the slot ranges that
/// chunk requests are planned against.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeAxis {
    /// Evenly spaced slots covering `start..` with the given period.
    Regular {
        start: DateTime<Utc>,
        period: TimeDelta,
        count: usize,
    },
    /// One slot per observed acquisition day, in ascending order.
    Irregular { ranges: Vec<TimeRange> },
}

impl TimeAxis {
    /// Build a regular axis over `range` with the given period.
    ///
    /// The end of the range is treated as inclusive: a daily period over
    /// `2017-08-01..2017-08-31` yields 31 slots, not 30.
    pub fn regular(range: TimeRange, period: TimeDelta) -> Self {
        let count = (range.duration().num_seconds() / period.num_seconds()) + 1;
        Self::Regular {
            start: range.start,
            period,
            count: count.max(0) as usize,
        }
    }

    pub fn irregular(ranges: Vec<TimeRange>) -> Self {
        Self::Irregular { ranges }
    }

    pub fn len(&self) -> usize {
        match self {
            TimeAxis::Regular { count, .. } => *count,
            TimeAxis::Irregular { ranges } => ranges.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bounds of slot `index`.
    pub fn bounds(&self, index: usize) -> Option<TimeRange> {
        match self {
            TimeAxis::Regular { start, period, count } => {
                if index >= *count {
                    return None;
                }
                let step = period.as_duration();
                let low = *start + step * index as i32;
                Some(TimeRange::new(low, low + step))
            }
            TimeAxis::Irregular { ranges } => ranges.get(index).copied(),
        }
    }

    /// The coordinate value of slot `index`: its bounds midpoint.
    pub fn center(&self, index: usize) -> Option<DateTime<Utc>> {
        self.bounds(index).map(|bounds| bounds.midpoint())
    }

    pub fn centers(&self) -> Vec<DateTime<Utc>> {
        (0..self.len()).filter_map(|i| self.center(i)).collect()
    }
}

/// Coalesce catalog features into per-day time ranges.
///
/// Features are ordered by their combined `date` + `time` instant; all
/// features sharing a calendar date merge into one `(earliest, latest)`
/// range, one range per observed day, ascending.
pub fn features_to_time_ranges(features: &[TileFeature]) -> Result<Vec<TimeRange>> {
    let mut per_day: BTreeMap<NaiveDate, TimeRange> = BTreeMap::new();

    for feature in features {
        let props = &feature.properties;
        let day: NaiveDate = props
            .date
            .parse()
            .map_err(|_| CubeStoreError::Catalog(format!("invalid feature date: {}", props.date)))?;
        let instant = parse_instant(&format!("{}T{}", props.date, props.time))
            .map_err(|_| CubeStoreError::Catalog(format!("invalid feature time: {}", props.time)))?;

        per_day
            .entry(day)
            .and_modify(|range| {
                range.start = range.start.min(instant);
                range.end = range.end.max(instant);
            })
            .or_insert_with(|| TimeRange::new(instant, instant));
    }

    Ok(per_day.into_values().collect())
}

/// Page through the feature catalog and coalesce the result into per-day
/// time ranges.
pub fn query_time_ranges(
    provider: &dyn TileProvider,
    collection: &str,
    bbox: cube_common::BoundingBox,
    time_range: TimeRange,
) -> Result<Vec<TimeRange>> {
    let mut features = Vec::new();
    let mut offset = 0;

    loop {
        let page = provider.fetch_features(&FeatureQuery {
            collection: collection.to_string(),
            bbox,
            time_range,
            limit: SH_CATALOG_FEATURE_LIMIT,
            offset,
        })?;
        let page_len = page.len();
        features.extend(page);
        if page_len < SH_CATALOG_FEATURE_LIMIT {
            break;
        }
        offset += SH_CATALOG_FEATURE_LIMIT;
    }

    debug!(
        collection = %collection,
        num_features = features.len(),
        "collected catalog features"
    );

    features_to_time_ranges(&features)
}
