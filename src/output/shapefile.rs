//! Legacy shapefile mirror, shipped as a single zip archive holding the
//! `.shp`, `.shx`, `.dbf`, `.prj` and `.cpg` members.

use std::{
    fs::{self, File},
    io::{self, Seek, Write},
    path::Path,
};

use geo::{Geometry, LineString, Polygon};
use shapefile::{
    Multipoint, Point, PolygonRing, Polyline, Writer,
    dbase::{FieldName, FieldValue, Record, TableWriterBuilder},
};
use zip::{CompressionMethod, ZipWriter, write::FileOptions};

use crate::{
    error::{PipelineError, Result},
    geometry,
    output::staging_dir,
    schema::{ACRES, COUNTY, OWNER_NAME, PARCEL_ID, ParcelRecord, ParcelTable, STATE},
};

const WGS84_PRJ: &str = "GEOGCS[\"GCS_WGS_1984\",DATUM[\"D_WGS_1984\",\
SPHEROID[\"WGS_1984\",6378137.0,298.257223563]],PRIMEM[\"Greenwich\",0.0],\
UNIT[\"Degree\",0.0174532925199433]]";
const CODE_PAGE: &str = "UTF-8";
const MEMBERS: &[&str] = &["shp", "shx", "dbf", "prj", "cpg"];

const TEXT_WIDTH: u8 = 254;
const ACRES_WIDTH: u8 = 19;
const ACRES_DECIMALS: u8 = 6;

fn field(name: &str) -> Result<FieldName> {
    FieldName::try_from(name)
        .map_err(|err| PipelineError::output(format!("invalid dBASE field name '{name}': {err:?}")))
}

fn table_builder() -> Result<TableWriterBuilder> {
    Ok(TableWriterBuilder::new()
        .add_character_field(field(PARCEL_ID)?, TEXT_WIDTH)
        .add_character_field(field(OWNER_NAME)?, TEXT_WIDTH)
        .add_character_field(field(COUNTY)?, TEXT_WIDTH)
        .add_character_field(field(STATE)?, TEXT_WIDTH)
        .add_numeric_field(field(ACRES)?, ACRES_WIDTH, ACRES_DECIMALS))
}

fn to_record(record: &ParcelRecord) -> Record {
    let mut dbf = Record::default();
    dbf.insert(
        PARCEL_ID.to_string(),
        FieldValue::Character(Some(record.parcel_id.clone())),
    );
    dbf.insert(
        OWNER_NAME.to_string(),
        FieldValue::Character(record.owner_name.clone()),
    );
    dbf.insert(COUNTY.to_string(), FieldValue::Character(record.county.clone()));
    dbf.insert(STATE.to_string(), FieldValue::Character(Some(record.state.clone())));
    dbf.insert(ACRES.to_string(), FieldValue::Numeric(Some(record.acres)));
    dbf
}

fn ring_points(ring: &LineString<f64>) -> Vec<Point> {
    ring.coords().map(|c| Point::new(c.x, c.y)).collect()
}

/// One record's shape. A shapefile holds a single shape type, so every
/// record of a layer must convert to the same variant.
#[derive(Debug, Clone, PartialEq)]
enum Shape {
    Polygon(shapefile::Polygon),
    Polyline(Polyline),
    Point(Point),
    Multipoint(Multipoint),
}

impl Shape {
    fn kind(&self) -> &'static str {
        match self {
            Shape::Polygon(_) => "polygon",
            Shape::Polyline(_) => "polyline",
            Shape::Point(_) => "point",
            Shape::Multipoint(_) => "multipoint",
        }
    }
}

/// Converts a geometry; polygon ring winding is normalised by the writer.
fn to_shape(geometry: &Geometry<f64>) -> Option<Shape> {
    match geometry {
        Geometry::Point(point) => Some(Shape::Point(Point::new(point.x(), point.y()))),
        Geometry::MultiPoint(multi) => Some(Shape::Multipoint(Multipoint::new(
            multi.0.iter().map(|p| Point::new(p.x(), p.y())).collect(),
        ))),
        Geometry::Line(line) => Some(Shape::Polyline(Polyline::new(vec![
            Point::new(line.start.x, line.start.y),
            Point::new(line.end.x, line.end.y),
        ]))),
        Geometry::LineString(line) => Some(Shape::Polyline(Polyline::new(ring_points(line)))),
        Geometry::MultiLineString(multi) => Some(Shape::Polyline(Polyline::with_parts(
            multi.0.iter().map(ring_points).collect(),
        ))),
        _ => to_polygon(geometry).map(Shape::Polygon),
    }
}

fn to_polygon(geometry: &Geometry<f64>) -> Option<shapefile::Polygon> {
    let parts = geometry::polygonal_parts(geometry.clone())?;
    let rings = parts
        .iter()
        .flat_map(|polygon: &Polygon<f64>| {
            std::iter::once(PolygonRing::Outer(ring_points(polygon.exterior()))).chain(
                polygon
                    .interiors()
                    .iter()
                    .map(|hole| PolygonRing::Inner(ring_points(hole))),
            )
        })
        .collect::<Vec<_>>();
    Some(shapefile::Polygon::with_rings(rings))
}

fn write_layer(parcels: &ParcelTable, shp_path: &Path) -> Result<()> {
    let mut shapes = Vec::with_capacity(parcels.len());
    for record in parcels.records() {
        let shape = to_shape(&record.geometry).ok_or_else(|| {
            PipelineError::output(format!(
                "parcel {} has a geometry a shapefile cannot hold",
                record.parcel_id
            ))
        })?;
        if let Some(first) = shapes.first().map(|(shape, _): &(Shape, _)| shape.kind()) {
            if shape.kind() != first {
                return Err(PipelineError::output(format!(
                    "parcel {} is a {} but the shapefile holds {first}s; \
                     a shapefile cannot mix shape types",
                    record.parcel_id,
                    shape.kind()
                )));
            }
        }
        shapes.push((shape, to_record(record)));
    }

    let mut writer = Writer::from_path(shp_path, table_builder()?)
        .map_err(|e| PipelineError::output(format!("shapefile writer init failed: {e}")))?;
    for (shape, record) in &shapes {
        let written = match shape {
            Shape::Polygon(shape) => writer.write_shape_and_record(shape, record),
            Shape::Polyline(shape) => writer.write_shape_and_record(shape, record),
            Shape::Point(shape) => writer.write_shape_and_record(shape, record),
            Shape::Multipoint(shape) => writer.write_shape_and_record(shape, record),
        };
        written.map_err(|e| PipelineError::output(format!("shapefile write failed: {e}")))?;
    }
    // Headers are finalised when the writer is dropped.
    drop(writer);
    fs::write(shp_path.with_extension("prj"), WGS84_PRJ)
        .and_then(|()| fs::write(shp_path.with_extension("cpg"), CODE_PAGE))
        .map_err(|e| PipelineError::output(format!("writing shapefile sidecars failed: {e}")))
}

fn zip_members<W: Write + Seek>(shp_path: &Path, stem: &str, sink: W) -> io::Result<()> {
    let mut zip = ZipWriter::new(sink);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for extension in MEMBERS {
        zip.start_file(format!("{stem}.{extension}"), options)?;
        let mut member = File::open(shp_path.with_extension(extension))?;
        io::copy(&mut member, &mut zip)?;
    }
    zip.finish()?;
    Ok(())
}

/// Writes the shapefile into a scratch directory next to `target`, then zips
/// it into `sink`. Member names use the target's file stem.
pub fn write_shapefile_zip<W: Write + Seek>(
    parcels: &ParcelTable,
    target: &Path,
    sink: W,
) -> Result<()> {
    let stem = target
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("parcels");
    let scratch = tempfile::Builder::new()
        .prefix(".parcel-etl-shp-")
        .tempdir_in(staging_dir(target)?)
        .map_err(|e| PipelineError::output(format!("cannot create shapefile scratch dir: {e}")))?;
    let shp_path = scratch.path().join(format!("{stem}.shp"));
    write_layer(parcels, &shp_path)?;
    zip_members(&shp_path, stem, sink)
        .map_err(|e| PipelineError::output(format!("zipping shapefile failed: {e}")))
}
