//! ISO well-known-binary encoding (little endian, 2D).
//!
//! The bytes double as the geometry fingerprint used for duplicate detection,
//! so the encoding must stay byte-for-byte stable: identical coordinates in
//! identical order always produce identical output.

use geo::{Coord, Geometry, LineString, Polygon};

const LITTLE_ENDIAN: u8 = 1;

const POINT: u32 = 1;
const LINE_STRING: u32 = 2;
const POLYGON: u32 = 3;
const MULTI_POINT: u32 = 4;
const MULTI_LINE_STRING: u32 = 5;
const MULTI_POLYGON: u32 = 6;
const GEOMETRY_COLLECTION: u32 = 7;

pub fn to_wkb(geometry: &Geometry<f64>) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    write_geometry(&mut out, geometry);
    out
}

/// Fingerprint for an optional geometry; `None` yields an empty key.
pub fn fingerprint(geometry: Option<&Geometry<f64>>) -> Vec<u8> {
    geometry.map(to_wkb).unwrap_or_default()
}

fn write_geometry(out: &mut Vec<u8>, geometry: &Geometry<f64>) {
    match geometry {
        Geometry::Point(point) => {
            header(out, POINT);
            coord(out, point.0);
        }
        Geometry::Line(line) => {
            header(out, LINE_STRING);
            count(out, 2);
            coord(out, line.start);
            coord(out, line.end);
        }
        Geometry::LineString(line) => {
            header(out, LINE_STRING);
            ring(out, line);
        }
        Geometry::Polygon(polygon) => write_polygon(out, polygon),
        Geometry::MultiPoint(multi) => {
            header(out, MULTI_POINT);
            count(out, multi.0.len());
            for point in &multi.0 {
                header(out, POINT);
                coord(out, point.0);
            }
        }
        Geometry::MultiLineString(multi) => {
            header(out, MULTI_LINE_STRING);
            count(out, multi.0.len());
            for line in &multi.0 {
                header(out, LINE_STRING);
                ring(out, line);
            }
        }
        Geometry::MultiPolygon(multi) => {
            header(out, MULTI_POLYGON);
            count(out, multi.0.len());
            for polygon in &multi.0 {
                write_polygon(out, polygon);
            }
        }
        Geometry::GeometryCollection(collection) => {
            header(out, GEOMETRY_COLLECTION);
            count(out, collection.0.len());
            for member in &collection.0 {
                write_geometry(out, member);
            }
        }
        Geometry::Rect(rect) => write_polygon(out, &rect.to_polygon()),
        Geometry::Triangle(triangle) => write_polygon(out, &triangle.to_polygon()),
    }
}

fn write_polygon(out: &mut Vec<u8>, polygon: &Polygon<f64>) {
    header(out, POLYGON);
    if polygon.exterior().0.is_empty() {
        count(out, 0);
        return;
    }
    count(out, 1 + polygon.interiors().len());
    ring(out, polygon.exterior());
    for interior in polygon.interiors() {
        ring(out, interior);
    }
}

fn header(out: &mut Vec<u8>, kind: u32) {
    out.push(LITTLE_ENDIAN);
    out.extend_from_slice(&kind.to_le_bytes());
}

fn count(out: &mut Vec<u8>, n: usize) {
    out.extend_from_slice(&(n as u32).to_le_bytes());
}

fn ring(out: &mut Vec<u8>, line: &LineString<f64>) {
    count(out, line.0.len());
    for c in &line.0 {
        coord(out, *c);
    }
}

fn coord(out: &mut Vec<u8>, c: Coord<f64>) {
    out.extend_from_slice(&c.x.to_le_bytes());
    out.extend_from_slice(&c.y.to_le_bytes());
}
