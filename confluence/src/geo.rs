//! Great-circle distances and the one-coordinate-per-zip-prefix reduction.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::record_batch::RecordBatch;
use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::debug;

use crate::error::FeatureError;
use crate::schema::Table;
use crate::table::{f64_column, string_column};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometers between two points given in decimal
/// degrees. NaN in, NaN out.
pub fn haversine_distance(lng1: f64, lat1: f64, lng2: f64, lat2: f64) -> f64 {
    let (lng1, lat1, lng2, lat2) = (
        lng1.to_radians(),
        lat1.to_radians(),
        lng2.to_radians(),
        lat2.to_radians(),
    );
    let dlng = lng2 - lng1;
    let dlat = lat2 - lat1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Apply [`haversine_distance`] row-wise over four coordinate columns.
///
/// A row with any null coordinate, or whose distance is NaN, yields a null
/// cell. Rows are processed in parallel; output order matches input order.
pub fn distance_column(
    seller_lng: &Float64Array,
    seller_lat: &Float64Array,
    customer_lng: &Float64Array,
    customer_lat: &Float64Array,
) -> Float64Array {
    let coord = |a: &Float64Array, i: usize| (!a.is_null(i)).then(|| a.value(i));
    let distances: Vec<Option<f64>> = (0..seller_lng.len())
        .into_par_iter()
        .map(|i| {
            let d = haversine_distance(
                coord(seller_lng, i)?,
                coord(seller_lat, i)?,
                coord(customer_lng, i)?,
                coord(customer_lat, i)?,
            );
            (!d.is_nan()).then_some(d)
        })
        .collect();
    Float64Array::from(distances)
}

// ============================================================================
// Zip-prefix reduction
// ============================================================================

/// How multiple geolocation rows for one zip prefix collapse into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeoReducer {
    /// First non-null latitude and longitude in input order. Depends on the
    /// order rows arrive in.
    #[default]
    First,
    /// Mean of all non-null latitudes and longitudes. Order independent.
    Centroid,
}

impl fmt::Display for GeoReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GeoReducer::First => "first",
            GeoReducer::Centroid => "centroid",
        })
    }
}

impl FromStr for GeoReducer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(GeoReducer::First),
            "centroid" | "mean" => Ok(GeoReducer::Centroid),
            other => Err(format!("unknown geo reducer '{other}' (expected first or centroid)")),
        }
    }
}

#[derive(Default)]
struct CoordAccumulator {
    first_lat: Option<f64>,
    first_lng: Option<f64>,
    sum_lat: f64,
    sum_lng: f64,
    count_lat: u32,
    count_lng: u32,
}

impl CoordAccumulator {
    fn push(&mut self, lat: Option<f64>, lng: Option<f64>) {
        if let Some(lat) = lat {
            self.first_lat.get_or_insert(lat);
            self.sum_lat += lat;
            self.count_lat += 1;
        }
        if let Some(lng) = lng {
            self.first_lng.get_or_insert(lng);
            self.sum_lng += lng;
            self.count_lng += 1;
        }
    }

    fn finish(&self, reducer: GeoReducer) -> (Option<f64>, Option<f64>) {
        let mean = |sum: f64, count: u32| (count > 0).then(|| sum / count as f64);
        match reducer {
            GeoReducer::First => (self.first_lat, self.first_lng),
            GeoReducer::Centroid => (
                mean(self.sum_lat, self.count_lat),
                mean(self.sum_lng, self.count_lng),
            ),
        }
    }
}

/// Collapse a normalized geolocation table to exactly one row per zip prefix.
///
/// Rows with a null prefix are dropped. Prefixes are emitted in first-seen
/// order. Joining against the result can never fan out.
pub fn reduce_geolocation(
    geolocation: &RecordBatch,
    reducer: GeoReducer,
) -> Result<RecordBatch, FeatureError> {
    let name = Table::Geolocation.name();
    let prefixes = string_column(geolocation, name, "geolocation_zip_code_prefix")?;
    let lats = f64_column(geolocation, name, "geolocation_lat")?;
    let lngs = f64_column(geolocation, name, "geolocation_lng")?;

    let mut groups: IndexMap<&str, CoordAccumulator> = IndexMap::new();
    for i in 0..geolocation.num_rows() {
        if prefixes.is_null(i) {
            continue;
        }
        let lat = (!lats.is_null(i)).then(|| lats.value(i));
        let lng = (!lngs.is_null(i)).then(|| lngs.value(i));
        groups.entry(prefixes.value(i)).or_default().push(lat, lng);
    }

    let mut out_prefix = Vec::with_capacity(groups.len());
    let mut out_lat = Vec::with_capacity(groups.len());
    let mut out_lng = Vec::with_capacity(groups.len());
    for (prefix, acc) in &groups {
        let (lat, lng) = acc.finish(reducer);
        out_prefix.push(*prefix);
        out_lat.push(lat);
        out_lng.push(lng);
    }
    debug!(
        "Reduced geolocation from {} rows to {} zip prefixes ({:?})",
        geolocation.num_rows(),
        groups.len(),
        reducer
    );

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(out_prefix)),
        Arc::new(Float64Array::from(out_lat)),
        Arc::new(Float64Array::from(out_lng)),
    ];
    Ok(RecordBatch::try_new(
        Arc::new(Table::Geolocation.schema()),
        columns,
    )?)
}
