mod common;

use std::fs::File;

use arrow::array::{Array, BinaryArray, Float64Array, StringArray};
use common::{LayerFixture, TestWorkspace, parcel, square, ten_parcel_layer};
use parcel_etl::{
    config::PipelineConfig,
    container::GeoJsonContainer,
    error::PipelineError,
    geometry::crs::ProjReprojector,
    layer::Selection,
    pipeline::{RunReport, run_pipeline},
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::json;

fn config_for(workspace: &TestWorkspace, input: std::path::PathBuf) -> PipelineConfig {
    PipelineConfig {
        input: Some(input),
        output: Some(workspace.path().join("out/parcels.parquet")),
        retry_delay_secs: 0,
        ..PipelineConfig::default()
    }
}

fn run(config: &PipelineConfig) -> Result<RunReport, PipelineError> {
    let container = GeoJsonContainer::open(config.input.as_deref().unwrap())?;
    run_pipeline(config, &container, &ProjReprojector::new())
}

#[test]
fn ten_rows_with_two_duplicates_and_a_null_identity_yield_seven() {
    let workspace = TestWorkspace::new();
    let input = workspace.layer("gdb", "ny_tax_parcels", &ten_parcel_layer());
    let config = config_for(&workspace, input);

    let report = run(&config).unwrap();
    assert_eq!(report.rows_read(), 10);
    assert_eq!(report.filter.missing_identity, 1);
    assert_eq!(report.dedup.by_parcel_id, Some(2));
    assert_eq!(report.rows_written, 7);
    assert_eq!(report.artifacts, vec![config.output.clone().unwrap()]);

    let file = File::open(config.output.as_ref().unwrap()).unwrap();
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
    let geo = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kv| kv.iter().find(|entry| entry.key == "geo").cloned())
        .and_then(|entry| entry.value)
        .expect("geo metadata present");
    let geo: serde_json::Value = serde_json::from_str(&geo).unwrap();
    assert_eq!(geo["primary_column"], "geometry");

    let batches: Vec<_> = builder.build().unwrap().map(|b| b.unwrap()).collect();
    let batch = &batches[0];
    let names: Vec<_> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    assert_eq!(
        names,
        ["parcel_id", "owner_name", "county", "state", "acres", "geometry"]
    );
    assert_eq!(batch.num_rows(), 7);

    let ids = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
    let ids: Vec<&str> = (0..ids.len()).map(|i| ids.value(i)).collect();
    assert_eq!(
        ids,
        ["0101-1", "0101-2", "0101-3", "0101-4", "0202-1", "0202-2", "0202-3"]
    );
    let states = batch.column(3).as_any().downcast_ref::<StringArray>().unwrap();
    assert!((0..states.len()).all(|i| states.value(i) == "new york"));
    let acres = batch.column(4).as_any().downcast_ref::<Float64Array>().unwrap();
    assert!((0..acres.len()).all(|i| acres.value(i) > 0.0));
    let geometry = batch.column(5).as_any().downcast_ref::<BinaryArray>().unwrap();
    assert!(!geometry.value(0).is_empty());
}

#[test]
fn water_addresses_and_null_like_ids_are_excluded() {
    let workspace = TestWorkspace::new();
    let layer = LayerFixture::new()
        .feature(parcel("Erie", json!("1"), "A", "Lake Water Rd"), square(-78.0, 42.0, 0.01))
        .feature(parcel("Erie", json!("NULL"), "B", "1 Dry St"), square(-78.1, 42.0, 0.01))
        .feature(parcel("Erie", json!("  "), "C", "2 Dry St"), square(-78.2, 42.0, 0.01))
        .feature(parcel("Erie", json!(17), "D", "3 Dry St"), square(-78.3, 42.0, 0.01));
    let input = workspace.layer("gdb", "parcels", &layer);

    let report = run(&config_for(&workspace, input)).unwrap();
    assert_eq!(report.filter.water_address, 1);
    assert_eq!(report.filter.missing_identity, 2);
    assert_eq!(report.rows_written, 1);
    assert!(report.sanitize.assumed_wgs84);
}

#[test]
fn polygon_layer_is_chosen_by_keyword() {
    let workspace = TestWorkspace::new();
    let roads = LayerFixture::new().feature(
        json!({"name": "I-90"}),
        json!({"type": "LineString", "coordinates": [[0, 0], [1, 1]]}),
    );
    workspace.layer("gdb", "a_roads", &roads);
    let input = workspace.layer("gdb", "tax_parcels", &ten_parcel_layer());

    let report = run(&config_for(&workspace, input)).unwrap();
    assert_eq!(report.layer.name, "tax_parcels");
    assert_eq!(report.layer.selection, Selection::Keyword("parcel".into()));
}

#[test]
fn web_mercator_layers_are_reprojected_before_area() {
    let workspace = TestWorkspace::new();
    // Roughly 100 m x 100 m near the equator.
    let layer = LayerFixture::new().crs("EPSG:3857").feature(
        parcel("Erie", json!("1"), "A", "x"),
        json!({
            "type": "Polygon",
            "coordinates": [[[0, 0], [100, 0], [100, 100], [0, 100], [0, 0]]]
        }),
    );
    let input = workspace.layer("gdb", "parcels", &layer);
    let config = config_for(&workspace, input);

    let report = run(&config).unwrap();
    assert_eq!(
        report.sanitize.reprojected_from,
        Some(parcel_etl::geometry::crs::Crs::Epsg(3857))
    );
    let file = File::open(config.output.as_ref().unwrap()).unwrap();
    let batch = ParquetRecordBatchReaderBuilder::try_new(file)
        .unwrap()
        .build()
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    let acres = batch.column(4).as_any().downcast_ref::<Float64Array>().unwrap();
    // About 100 m x 99.3 m on the ellipsoid, a little under 2.5 acres.
    assert!((acres.value(0) - 2.455).abs() < 0.05, "{}", acres.value(0));
}

#[test]
fn missing_required_column_aborts_without_output() {
    let workspace = TestWorkspace::new();
    let layer = LayerFixture::new().feature(
        json!({"COUNTY_NAME": "Erie", "PRIMARY_OWNER": "A"}),
        square(-78.0, 42.0, 0.01),
    );
    let input = workspace.layer("gdb", "parcels", &layer);
    let config = config_for(&workspace, input);

    let err = run(&config).unwrap_err();
    assert!(matches!(err, PipelineError::Schema(_)));
    assert!(err.to_string().contains("swis_sbl_id"));
    assert!(!config.output.as_ref().unwrap().exists());
}

#[test]
fn auxiliary_formats_are_written_alongside_parquet() {
    let workspace = TestWorkspace::new();
    let input = workspace.layer("gdb", "parcels", &ten_parcel_layer());
    let config = PipelineConfig {
        write_geojson: true,
        geojson_output: Some(workspace.path().join("parcels.geojson")),
        write_shapefile: true,
        shapefile_output: Some(workspace.path().join("parcels.zip")),
        write_geopackage: true,
        geopackage_output: Some(workspace.path().join("parcels.gpkg")),
        ..config_for(&workspace, input)
    };

    let report = run(&config).unwrap();
    assert_eq!(report.artifacts.len(), 4);
    let gpkg = rusqlite::Connection::open(workspace.path().join("parcels.gpkg")).unwrap();
    let rows: i64 = gpkg
        .query_row("SELECT COUNT(*) FROM ny_parcels_clean", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 7);
    let geojson = std::fs::read_to_string(workspace.path().join("parcels.geojson")).unwrap();
    let collection: serde_json::Value = serde_json::from_str(&geojson).unwrap();
    assert_eq!(collection["features"].as_array().unwrap().len(), 7);
    assert!(workspace.path().join("parcels.zip").is_file());
    assert!(workspace.files_with_prefix(".parcel-etl-").is_empty());
}

#[test]
fn line_geometries_are_kept_with_zero_acres() {
    let workspace = TestWorkspace::new();
    let line = |x: f64| json!({"type": "LineString", "coordinates": [[x, 42.0], [x + 0.1, 42.1]]});
    let layer = LayerFixture::new()
        .crs("EPSG:4326")
        .feature(parcel("Erie", json!("0101-1"), "A", "1 Main St"), line(-78.0))
        .feature(parcel("Erie", json!("0101-2"), "B", "2 Main St"), line(-77.0));
    let input = workspace.layer("gdb", "parcels", &layer);
    let config = config_for(&workspace, input);

    let report = run(&config).unwrap();
    assert_eq!(report.rows_written, 2);

    let file = File::open(config.output.as_ref().unwrap()).unwrap();
    let batches: Vec<_> = ParquetRecordBatchReaderBuilder::try_new(file)
        .unwrap()
        .build()
        .unwrap()
        .map(|b| b.unwrap())
        .collect();
    let acres = batches[0]
        .column(4)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert!((0..acres.len()).all(|i| acres.value(i) == 0.0));
}
