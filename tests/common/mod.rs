#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes a GeoJSON layer into `container/` and returns the container path.
    pub fn layer(&self, container: &str, name: &str, layer: &LayerFixture) -> PathBuf {
        self.write(&format!("{container}/{name}.geojson"), &layer.to_geojson());
        self.path().join(container)
    }

    /// Lists files in the workspace whose name starts with `prefix`.
    pub fn files_with_prefix(&self, prefix: &str) -> Vec<String> {
        fs::read_dir(self.path())
            .expect("read workspace")
            .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(prefix))
            .collect()
    }
}

/// Axis-aligned square polygon with its lower-left corner at (`x`, `y`).
pub fn square(x: f64, y: f64, size: f64) -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [x, y], [x + size, y], [x + size, y + size], [x, y + size], [x, y]
        ]]
    })
}

/// Builder for a GeoJSON FeatureCollection used as one container layer.
#[derive(Default)]
pub struct LayerFixture {
    features: Vec<Value>,
    crs: Option<String>,
}

impl LayerFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn crs(mut self, name: &str) -> Self {
        self.crs = Some(name.to_string());
        self
    }

    pub fn feature(mut self, properties: Value, geometry: Value) -> Self {
        self.features.push(json!({
            "type": "Feature",
            "properties": properties,
            "geometry": geometry,
        }));
        self
    }

    pub fn to_geojson(&self) -> String {
        let mut collection = Map::new();
        collection.insert("type".into(), json!("FeatureCollection"));
        if let Some(name) = &self.crs {
            collection.insert(
                "crs".into(),
                json!({"type": "name", "properties": {"name": name}}),
            );
        }
        collection.insert("features".into(), Value::Array(self.features.clone()));
        Value::Object(collection).to_string()
    }
}

/// New York style attribute set for one parcel.
pub fn parcel(county: &str, swis_sbl_id: Value, owner: &str, addr: &str) -> Value {
    json!({
        "COUNTY_NAME": county,
        "SWIS_SBL_ID": swis_sbl_id,
        "PRIMARY_OWNER": owner,
        "PARCEL_ADDR": addr,
        "SBL": "",
    })
}

/// Ten parcels in WGS84: rows 2 and 3 repeat rows 0 and 1 exactly, and row 9
/// has a null identity.
pub fn ten_parcel_layer() -> LayerFixture {
    let mut layer = LayerFixture::new().crs("urn:ogc:def:crs:OGC:1.3:CRS84");
    let rows: Vec<(Value, f64)> = vec![
        (parcel("Albany", json!("0101-1"), "Ann", "1 Main St"), 0.0),
        (parcel("Albany", json!("0101-2"), "Bob", "2 Main St"), 1.0),
        (parcel("Albany", json!("0101-1"), "Ann", "1 Main St"), 0.0),
        (parcel("Albany", json!("0101-2"), "Bob", "2 Main St"), 1.0),
        (parcel("Albany", json!("0101-3"), "Cy", "3 Main St"), 2.0),
        (parcel("Albany", json!("0101-4"), "Di", "4 Main St"), 3.0),
        (parcel("Kings", json!("0202-1"), "Ed", "5 Elm St"), 4.0),
        (parcel("Kings", json!("0202-2"), "Flo", "6 Elm St"), 5.0),
        (parcel("Kings", json!("0202-3"), "Gus", "7 Elm St"), 6.0),
        (parcel("Kings", Value::Null, "Hal", "8 Elm St"), 7.0),
    ];
    for (properties, offset) in rows {
        layer = layer.feature(properties, square(-74.0 + offset * 0.01, 42.0, 0.005));
    }
    layer
}
