//! GeoParquet 1.0 writer: one snappy-compressed file, WKB geometry column and
//! the `geo` file metadata entry naming it as the primary column.

use std::{io::Write, sync::Arc};

use arrow::{
    array::{ArrayRef, BinaryArray, Float64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{
    arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties,
    format::KeyValue,
};
use serde_json::json;

use crate::{
    error::{PipelineError, Result},
    geometry::wkb::to_wkb,
    schema::{ACRES, COUNTY, GEOMETRY, OWNER_NAME, PARCEL_ID, ParcelTable, STATE},
};

pub const GEO_METADATA_KEY: &str = "geo";
const GEOPARQUET_VERSION: &str = "1.0.0";

pub fn parcel_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(PARCEL_ID, DataType::Utf8, false),
        Field::new(OWNER_NAME, DataType::Utf8, true),
        Field::new(COUNTY, DataType::Utf8, true),
        Field::new(STATE, DataType::Utf8, false),
        Field::new(ACRES, DataType::Float64, false),
        Field::new(GEOMETRY, DataType::Binary, false),
    ]))
}

/// The `geo` metadata document. CRS is omitted, which GeoParquet defines as
/// OGC:CRS84 (WGS84 longitude/latitude).
pub fn geo_metadata(parcels: &ParcelTable) -> serde_json::Value {
    let mut column = json!({
        "encoding": "WKB",
        "geometry_types": parcels.geometry_types(),
    });
    if let Some(rect) = parcels.bounds() {
        column["bbox"] = json!([rect.min().x, rect.min().y, rect.max().x, rect.max().y]);
    }
    let mut columns = serde_json::Map::new();
    columns.insert(GEOMETRY.to_string(), column);
    json!({
        "version": GEOPARQUET_VERSION,
        "primary_column": GEOMETRY,
        "columns": columns,
    })
}

fn writer_properties(parcels: &ParcelTable) -> WriterProperties {
    let geo = KeyValue {
        key: GEO_METADATA_KEY.to_string(),
        value: Some(geo_metadata(parcels).to_string()),
    };
    let created_by = KeyValue {
        key: "created_by".to_string(),
        value: Some(format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))),
    };
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![geo, created_by]))
        .build()
}

fn record_batch(parcels: &ParcelTable) -> Result<RecordBatch> {
    let records = parcels.records();
    let wkb: Vec<Vec<u8>> = records.iter().map(|r| to_wkb(&r.geometry)).collect();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.parcel_id.as_str()),
        )),
        Arc::new(StringArray::from(
            records.iter().map(|r| r.owner_name.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            records.iter().map(|r| r.county.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.state.as_str()),
        )),
        Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.acres))),
        Arc::new(BinaryArray::from_iter_values(wkb.iter())),
    ];
    RecordBatch::try_new(parcel_schema(), columns)
        .map_err(|e| PipelineError::output(format!("building record batch failed: {e}")))
}

pub fn write_geoparquet<W: Write + Send>(parcels: &ParcelTable, sink: W) -> Result<()> {
    let batch = record_batch(parcels)?;
    let mut writer = ArrowWriter::try_new(sink, parcel_schema(), Some(writer_properties(parcels)))
        .map_err(|e| PipelineError::output(format!("parquet writer init failed: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| PipelineError::output(format!("parquet write failed: {e}")))?;
    writer
        .close()
        .map_err(|e| PipelineError::output(format!("parquet close failed: {e}")))?;
    Ok(())
}
