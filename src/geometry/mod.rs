//! Geometry primitives used by the sanitizer, area calculator and writers.

pub mod crs;
pub mod repair;
pub mod wkb;

use geo::{Geometry, MultiPolygon, Polygon};

/// Collapses a geometry into its polygonal parts.
///
/// Returns `None` for geometries without any polygon (points, lines, or a
/// collection of those).
pub fn polygonal_parts(geometry: Geometry<f64>) -> Option<MultiPolygon<f64>> {
    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    collect_polygons(geometry, &mut polygons);
    if polygons.is_empty() {
        None
    } else {
        Some(MultiPolygon::new(polygons))
    }
}

fn collect_polygons(geometry: Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(polygon) => out.push(polygon),
        Geometry::MultiPolygon(multi) => out.extend(multi.0),
        Geometry::Rect(rect) => out.push(rect.to_polygon()),
        Geometry::Triangle(triangle) => out.push(triangle.to_polygon()),
        Geometry::GeometryCollection(collection) => {
            for member in collection.0 {
                collect_polygons(member, out);
            }
        }
        _ => {}
    }
}

pub fn is_empty(geometry: &Geometry<f64>) -> bool {
    match geometry {
        Geometry::Polygon(polygon) => polygon.exterior().0.is_empty(),
        Geometry::MultiPolygon(multi) => multi.0.iter().all(|p| p.exterior().0.is_empty()),
        Geometry::GeometryCollection(collection) => collection.0.iter().all(is_empty),
        Geometry::LineString(line) => line.0.is_empty(),
        Geometry::MultiLineString(multi) => multi.0.iter().all(|l| l.0.is_empty()),
        Geometry::MultiPoint(multi) => multi.0.is_empty(),
        Geometry::Point(_) | Geometry::Line(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
            false
        }
    }
}

/// Geometry type name as written into layer listings and GeoParquet metadata.
pub fn type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) | Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
    }
}
