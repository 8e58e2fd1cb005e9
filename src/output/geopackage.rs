//! GeoPackage mirror: a SQLite database holding the parcels as one feature
//! table, `ny_parcels_clean`, in EPSG:4326.

use std::path::Path;

use geo::{BoundingRect, Geometry};
use rusqlite::{Connection, params};

use crate::{
    error::{PipelineError, Result},
    geometry::{self, crs::WGS84_EPSG, wkb::to_wkb},
    schema::{ACRES, COUNTY, GEOMETRY, OWNER_NAME, PARCEL_ID, ParcelTable, STATE},
};

pub const GEOPACKAGE_LAYER: &str = "ny_parcels_clean";

/// `GPKG` in ASCII.
const APPLICATION_ID: i32 = 0x4750_4B47;
/// GeoPackage 1.2.
const USER_VERSION: i32 = 10_200;

const FLAG_LITTLE_ENDIAN: u8 = 0b0000_0001;
const FLAG_XY_ENVELOPE: u8 = 0b0000_0010;
const FLAG_EMPTY: u8 = 0b0001_0000;

const WGS84_WKT: &str = "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,\
298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,\
AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],\
AUTHORITY[\"EPSG\",\"4326\"]]";

const CORE_TABLES: &str = "
CREATE TABLE gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
);
CREATE TABLE gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT uk_gc_table_name UNIQUE (table_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
INSERT INTO gpkg_spatial_ref_sys VALUES
    ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined',
     'undefined cartesian coordinate reference system'),
    ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined',
     'undefined geographic coordinate reference system');
";

fn failed(err: rusqlite::Error) -> PipelineError {
    PipelineError::output(format!("geopackage write failed: {err}"))
}

/// Standard GeoPackage binary: the `GP` header with an XY envelope, followed
/// by the WKB body.
pub fn gpkg_geometry(geometry: &Geometry<f64>) -> Vec<u8> {
    let envelope = if geometry::is_empty(geometry) {
        None
    } else {
        geometry.bounding_rect()
    };
    let mut out = Vec::with_capacity(8 + 32 + 64);
    out.extend_from_slice(b"GP");
    out.push(0);
    match envelope {
        Some(rect) => {
            out.push(FLAG_LITTLE_ENDIAN | FLAG_XY_ENVELOPE);
            out.extend_from_slice(&(WGS84_EPSG as i32).to_le_bytes());
            for value in [rect.min().x, rect.max().x, rect.min().y, rect.max().y] {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        None => {
            out.push(FLAG_LITTLE_ENDIAN | FLAG_EMPTY);
            out.extend_from_slice(&(WGS84_EPSG as i32).to_le_bytes());
        }
    }
    out.extend_from_slice(&to_wkb(geometry));
    out
}

/// Column type registered for the layer: the single geometry type when all
/// records agree, `GEOMETRY` otherwise.
fn geometry_type_name(parcels: &ParcelTable) -> String {
    match parcels.geometry_types().as_slice() {
        [only] => only.to_ascii_uppercase(),
        _ => "GEOMETRY".to_string(),
    }
}

/// Writes a new GeoPackage at `path`; an existing empty file is reused.
pub fn write_geopackage(parcels: &ParcelTable, path: &Path) -> Result<()> {
    let mut conn = Connection::open(path).map_err(failed)?;
    conn.execute_batch(&format!(
        "PRAGMA application_id = {APPLICATION_ID}; PRAGMA user_version = {USER_VERSION};"
    ))
    .map_err(failed)?;

    let tx = conn.transaction().map_err(failed)?;
    tx.execute_batch(CORE_TABLES).map_err(failed)?;
    tx.execute(
        "INSERT INTO gpkg_spatial_ref_sys VALUES (?1, ?2, 'EPSG', ?2, ?3, ?4)",
        params![
            "WGS 84 geodetic",
            WGS84_EPSG,
            WGS84_WKT,
            "longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid"
        ],
    )
    .map_err(failed)?;

    let bounds = parcels.bounds();
    tx.execute(
        "INSERT INTO gpkg_contents (table_name, data_type, identifier, min_x, min_y, max_x, max_y, srs_id)
         VALUES (?1, 'features', ?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            GEOPACKAGE_LAYER,
            bounds.map(|rect| rect.min().x),
            bounds.map(|rect| rect.min().y),
            bounds.map(|rect| rect.max().x),
            bounds.map(|rect| rect.max().y),
            WGS84_EPSG
        ],
    )
    .map_err(failed)?;
    tx.execute(
        "INSERT INTO gpkg_geometry_columns VALUES (?1, ?2, ?3, ?4, 0, 0)",
        params![GEOPACKAGE_LAYER, GEOMETRY, geometry_type_name(parcels), WGS84_EPSG],
    )
    .map_err(failed)?;
    tx.execute_batch(&format!(
        "CREATE TABLE \"{GEOPACKAGE_LAYER}\" (
            fid INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            {GEOMETRY} {geometry_type},
            {PARCEL_ID} TEXT NOT NULL,
            {OWNER_NAME} TEXT,
            {COUNTY} TEXT,
            {STATE} TEXT NOT NULL,
            {ACRES} REAL NOT NULL
        );",
        geometry_type = geometry_type_name(parcels)
    ))
    .map_err(failed)?;

    {
        let mut insert = tx
            .prepare(&format!(
                "INSERT INTO \"{GEOPACKAGE_LAYER}\"
                    ({GEOMETRY}, {PARCEL_ID}, {OWNER_NAME}, {COUNTY}, {STATE}, {ACRES})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ))
            .map_err(failed)?;
        for record in parcels.records() {
            insert
                .execute(params![
                    gpkg_geometry(&record.geometry),
                    record.parcel_id,
                    record.owner_name,
                    record.county,
                    record.state,
                    record.acres
                ])
                .map_err(failed)?;
        }
    }
    tx.commit().map_err(failed)
}
