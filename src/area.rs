use std::time::Instant;

use geo::{GeodesicArea, Geometry};
use log::info;

use crate::{
    data::{Table, Value},
    geometry,
    schema::ACRES,
};

pub const SQUARE_METERS_PER_ACRE: f64 = 4046.856_422_4;

/// Area on the WGS84 ellipsoid, in acres. Coordinates must be geographic.
///
/// Each polygon contributes its absolute area, so ring orientation does not
/// matter. Non-polygonal and empty geometries measure 0.
pub fn geodesic_acres(geometry: &Geometry<f64>) -> f64 {
    let Some(parts) = geometry::polygonal_parts(geometry.clone()) else {
        return 0.0;
    };
    let square_meters: f64 = parts
        .iter()
        .filter(|polygon| polygon.exterior().0.len() >= 4)
        .map(|polygon| {
            let (_perimeter, area) = polygon.geodesic_perimeter_area_signed();
            area.abs()
        })
        .sum();
    if square_meters.is_finite() {
        square_meters / SQUARE_METERS_PER_ACRE
    } else {
        0.0
    }
}

pub fn compute_acres(table: Table) -> Table {
    let started = Instant::now();
    let table = table.set_column(ACRES, |row| {
        Value::Float(row.geometry.as_ref().map_or(0.0, geodesic_acres))
    });
    info!(
        "[area] Computed geodesic acres for {} rows ({:.2?})",
        table.len(),
        started.elapsed()
    );
    table
}
