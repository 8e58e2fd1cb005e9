//! Structural validity checks and topology repair for parcel polygons.

use geo::{
    Area, BooleanOps, BoundingRect, Coord, Geometry, GeometryCollection, Intersects, Line,
    LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
    algorithm::line_intersection::{LineIntersection, line_intersection},
};

use super::polygonal_parts;

/// True when the geometry is structurally valid.
///
/// Polygons need finite coordinates, closed rings of at least four points, a
/// non-degenerate shell, no self-intersecting or crossing rings and holes
/// inside the shell; the parts of a multipolygon must not overlap. Points and
/// lines need finite coordinates, and every line at least two distinct points.
pub fn is_valid(geometry: &Geometry<f64>) -> bool {
    match geometry {
        Geometry::Polygon(polygon) => polygon_is_valid(polygon),
        Geometry::MultiPolygon(multi) => {
            !multi.0.is_empty()
                && multi.0.iter().all(polygon_is_valid)
                && !parts_overlap(&multi.0)
        }
        Geometry::Rect(rect) => polygon_is_valid(&rect.to_polygon()),
        Geometry::Triangle(triangle) => polygon_is_valid(&triangle.to_polygon()),
        Geometry::Point(point) => coord_is_finite(&point.0),
        Geometry::MultiPoint(multi) => multi.0.iter().all(|point| coord_is_finite(&point.0)),
        Geometry::Line(line) => {
            coord_is_finite(&line.start) && coord_is_finite(&line.end) && line.start != line.end
        }
        Geometry::LineString(line) => line_is_valid(line),
        Geometry::MultiLineString(multi) => multi.0.iter().all(line_is_valid),
        Geometry::GeometryCollection(collection) => collection.0.iter().all(is_valid),
    }
}

/// Repairs a geometry.
///
/// Anything holding polygons is rebuilt into a valid polygon or multipolygon,
/// dissolving overlapping parts. Points and lines lose non-finite and repeated
/// coordinates. Returns `None` when nothing with a positive area (or, for
/// points and lines, nothing at all) survives; the caller treats that as an
/// empty geometry.
pub fn make_valid(geometry: Geometry<f64>) -> Option<Geometry<f64>> {
    if has_polygonal_part(&geometry) {
        polygonal_parts(geometry).and_then(repair_polygonal)
    } else {
        repair_linear(geometry)
    }
}

fn has_polygonal_part(geometry: &Geometry<f64>) -> bool {
    match geometry {
        Geometry::Polygon(_)
        | Geometry::MultiPolygon(_)
        | Geometry::Rect(_)
        | Geometry::Triangle(_) => true,
        Geometry::GeometryCollection(collection) => collection.0.iter().any(has_polygonal_part),
        _ => false,
    }
}

fn repair_polygonal(parts: MultiPolygon<f64>) -> Option<Geometry<f64>> {
    let cleaned = parts
        .0
        .into_iter()
        .filter_map(clean_polygon)
        .filter_map(resolve_polygon);

    // Unioning one part at a time keeps each overlay operand valid.
    let dissolved = cleaned.fold(None, |acc: Option<MultiPolygon<f64>>, part| {
        Some(match acc {
            None => part,
            Some(acc) => acc.union(&part),
        })
    })?;

    let mut polygons: Vec<Polygon<f64>> = dissolved
        .0
        .into_iter()
        .filter(|polygon| polygon.unsigned_area() > 0.0)
        .collect();
    match polygons.len() {
        0 => None,
        1 => polygons.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(MultiPolygon::new(polygons))),
    }
}

/// A single cleaned polygon as a valid multipolygon, or `None` if it collapses.
fn resolve_polygon(polygon: Polygon<f64>) -> Option<MultiPolygon<f64>> {
    let resolved = if polygon_is_valid(&polygon) {
        MultiPolygon::new(vec![polygon])
    } else {
        // The overlay splits edges at every intersection and rebuilds rings,
        // which removes self-intersections.
        MultiPolygon::new(vec![polygon]).union(&MultiPolygon::new(Vec::new()))
    };
    let kept: Vec<Polygon<f64>> = resolved
        .0
        .into_iter()
        .filter(|polygon| polygon.unsigned_area() > 0.0)
        .collect();
    (!kept.is_empty()).then(|| MultiPolygon::new(kept))
}

fn repair_linear(geometry: Geometry<f64>) -> Option<Geometry<f64>> {
    match geometry {
        Geometry::Point(point) => coord_is_finite(&point.0).then_some(Geometry::Point(point)),
        Geometry::MultiPoint(multi) => {
            let points: Vec<Point<f64>> = multi
                .0
                .into_iter()
                .filter(|point| coord_is_finite(&point.0))
                .collect();
            (!points.is_empty()).then(|| Geometry::MultiPoint(MultiPoint::new(points)))
        }
        Geometry::Line(line) => clean_line(LineString::new(vec![line.start, line.end]))
            .map(Geometry::LineString),
        Geometry::LineString(line) => clean_line(line).map(Geometry::LineString),
        Geometry::MultiLineString(multi) => {
            let lines: Vec<LineString<f64>> = multi.0.into_iter().filter_map(clean_line).collect();
            (!lines.is_empty()).then(|| Geometry::MultiLineString(MultiLineString::new(lines)))
        }
        Geometry::GeometryCollection(collection) => {
            let members: Vec<Geometry<f64>> =
                collection.0.into_iter().filter_map(repair_linear).collect();
            (!members.is_empty())
                .then(|| Geometry::GeometryCollection(GeometryCollection(members)))
        }
        Geometry::Polygon(_)
        | Geometry::MultiPolygon(_)
        | Geometry::Rect(_)
        | Geometry::Triangle(_) => None,
    }
}

fn clean_line(line: LineString<f64>) -> Option<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = line.0.into_iter().filter(coord_is_finite).collect();
    coords.dedup();
    (coords.len() >= 2).then(|| LineString::new(coords))
}

fn coord_is_finite(coord: &Coord<f64>) -> bool {
    coord.x.is_finite() && coord.y.is_finite()
}

fn line_is_valid(line: &LineString<f64>) -> bool {
    line.0.iter().all(coord_is_finite) && line.0.windows(2).any(|pair| pair[0] != pair[1])
}

/// True when any two parts share interior area; touching along an edge or at
/// a vertex does not count.
fn parts_overlap(parts: &[Polygon<f64>]) -> bool {
    for (i, a) in parts.iter().enumerate() {
        for b in &parts[i + 1..] {
            let (Some(box_a), Some(box_b)) = (a.bounding_rect(), b.bounding_rect()) else {
                continue;
            };
            if !box_a.intersects(&box_b) {
                continue;
            }
            if a.intersection(b).unsigned_area() > 0.0 {
                return true;
            }
        }
    }
    false
}

fn clean_polygon(polygon: Polygon<f64>) -> Option<Polygon<f64>> {
    let (exterior, interiors) = polygon.into_inner();
    let exterior = clean_ring(exterior)?;
    let interiors = interiors.into_iter().filter_map(clean_ring).collect();
    Some(Polygon::new(exterior, interiors))
}

fn clean_ring(ring: LineString<f64>) -> Option<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = ring
        .0
        .into_iter()
        .filter(coord_is_finite)
        .collect();
    coords.dedup();
    if coords.len() > 1 && coords.first() != coords.last() {
        let first = coords[0];
        coords.push(first);
    }
    (coords.len() >= 4).then(|| LineString::new(coords))
}

fn polygon_is_valid(polygon: &Polygon<f64>) -> bool {
    let rings: Vec<&LineString<f64>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .collect();
    if !rings.iter().all(|ring| ring_is_well_formed(ring)) {
        return false;
    }
    let shell = Polygon::new(polygon.exterior().clone(), Vec::new());
    if shell.unsigned_area() <= 0.0 {
        return false;
    }
    if rings.iter().any(|ring| ring_self_intersects(ring)) {
        return false;
    }
    for (i, a) in rings.iter().enumerate() {
        for b in rings.iter().skip(i + 1) {
            if rings_cross(a, b) {
                return false;
            }
        }
    }
    polygon
        .interiors()
        .iter()
        .all(|hole| shell.intersects(&Point::from(hole.0[0])))
}

fn ring_is_well_formed(ring: &LineString<f64>) -> bool {
    ring.0.len() >= 4
        && ring.is_closed()
        && ring.0.iter().all(coord_is_finite)
}

fn ring_self_intersects(ring: &LineString<f64>) -> bool {
    let segments: Vec<Line<f64>> = ring.lines().collect();
    let n = segments.len();
    for i in 0..n {
        for j in (i + 1)..n {
            if !bboxes_touch(&segments[i], &segments[j]) {
                continue;
            }
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(segments[i], segments[j]) {
                None => {}
                Some(LineIntersection::Collinear { .. }) => return true,
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(LineIntersection::SinglePoint { .. }) => return true,
            }
        }
    }
    false
}

// Rings may touch at a point but must not cross or share an edge.
fn rings_cross(a: &LineString<f64>, b: &LineString<f64>) -> bool {
    for sa in a.lines() {
        for sb in b.lines() {
            if !bboxes_touch(&sa, &sb) {
                continue;
            }
            match line_intersection(sa, sb) {
                Some(LineIntersection::Collinear { .. }) => return true,
                Some(LineIntersection::SinglePoint { is_proper: true, .. }) => return true,
                _ => {}
            }
        }
    }
    false
}

fn bboxes_touch(a: &Line<f64>, b: &Line<f64>) -> bool {
    let (a_min_x, a_max_x) = min_max(a.start.x, a.end.x);
    let (a_min_y, a_max_y) = min_max(a.start.y, a.end.y);
    let (b_min_x, b_max_x) = min_max(b.start.x, b.end.x);
    let (b_min_y, b_max_y) = min_max(b.start.y, b.end.y);
    a_min_x <= b_max_x && b_min_x <= a_max_x && a_min_y <= b_max_y && b_min_y <= a_max_y
}

fn min_max(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}
