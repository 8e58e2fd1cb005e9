//! Multi-layer vector containers.
//!
//! The pipeline only needs two operations from a container: enumerate the
//! layers with their geometry type and feature count, and read one layer into
//! a [`Table`]. [`GeoJsonContainer`] provides both for a directory of GeoJSON
//! files (one layer per file) or a single GeoJSON file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use geo::Geometry;
use geojson::{Feature, GeoJson, JsonObject};
use log::{debug, warn};

use crate::{
    data::{Row, Table, Value},
    error::{PipelineError, Result},
    geometry::crs::Crs,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    pub name: String,
    /// `None` when the layer mixes geometry types or has no geometries.
    pub geometry_type: Option<String>,
    pub feature_count: usize,
}

impl LayerInfo {
    pub fn new(name: &str, geometry_type: Option<&str>, feature_count: usize) -> Self {
        Self {
            name: name.to_string(),
            geometry_type: geometry_type.map(str::to_string),
            feature_count,
        }
    }

    pub fn is_polygonal(&self) -> bool {
        self.geometry_type
            .as_deref()
            .is_some_and(|kind| kind.to_ascii_lowercase().contains("polygon"))
    }
}

pub trait Container {
    /// Human readable location used in log lines.
    fn location(&self) -> String;

    fn list_layers(&self) -> Result<Vec<LayerInfo>>;

    fn read(&self, layer: &str) -> Result<Table>;
}

#[derive(Debug, Clone)]
pub struct GeoJsonContainer {
    root: PathBuf,
}

impl GeoJsonContainer {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::container(format!(
                "container {path:?} does not exist"
            )));
        }
        Ok(Self {
            root: path.to_path_buf(),
        })
    }

    fn layer_files(&self) -> Result<Vec<(String, PathBuf)>> {
        if self.root.is_file() {
            return Ok(vec![(layer_name(&self.root), self.root.clone())]);
        }
        let enumerating = || format!("enumerating {:?}", self.root);
        let entries =
            fs::read_dir(&self.root).map_err(|err| PipelineError::transient(enumerating(), err))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|err| PipelineError::transient(enumerating(), err))?
                .path();
            let is_layer = path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        ext.eq_ignore_ascii_case("geojson") || ext.eq_ignore_ascii_case("json")
                    });
            if is_layer {
                files.push((layer_name(&path), path));
            }
        }
        files.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(files)
    }

    fn load_document(path: &Path) -> Result<GeoJson> {
        let text = fs::read_to_string(path)
            .map_err(|err| PipelineError::transient(format!("reading {path:?}"), err))?;
        text.parse::<GeoJson>()
            .map_err(|err| PipelineError::container(format!("{path:?} is not valid GeoJSON: {err}")))
    }
}

impl Container for GeoJsonContainer {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn list_layers(&self) -> Result<Vec<LayerInfo>> {
        let mut layers = Vec::new();
        for (name, path) in self.layer_files().map_err(enumeration_failure)? {
            let document = Self::load_document(&path).map_err(enumeration_failure)?;
            let (features, _) = into_features(document);
            let geometry_type = common_geometry_type(&features);
            layers.push(LayerInfo::new(&name, geometry_type, features.len()));
        }
        Ok(layers)
    }

    fn read(&self, layer: &str) -> Result<Table> {
        let files = self.layer_files()?;
        let Some((_, path)) = files.iter().find(|(name, _)| name == layer) else {
            let available = files.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
            return Err(PipelineError::container(format!(
                "layer '{layer}' not found in {:?}; available: {available:?}",
                self.root
            )));
        };
        let (features, crs) = into_features(Self::load_document(path)?);
        Ok(features_to_table(features, crs, layer))
    }
}

/// Listing happens before the pipeline starts, where I/O failures are fatal.
fn enumeration_failure(err: PipelineError) -> PipelineError {
    match err {
        PipelineError::TransientIo { message, source } => {
            PipelineError::container(format!("cannot enumerate layers: {message}: {source}"))
        }
        other => other,
    }
}

fn layer_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string()
}

fn into_features(document: GeoJson) -> (Vec<Feature>, Option<Crs>) {
    match document {
        GeoJson::FeatureCollection(collection) => {
            let crs = collection.foreign_members.as_ref().and_then(declared_crs);
            (collection.features, crs)
        }
        GeoJson::Feature(feature) => {
            let crs = feature.foreign_members.as_ref().and_then(declared_crs);
            (vec![feature], crs)
        }
        GeoJson::Geometry(geometry) => {
            let crs = geometry.foreign_members.as_ref().and_then(declared_crs);
            (vec![Feature::from(geometry)], crs)
        }
    }
}

/// Reads the legacy GeoJSON `crs` member (`name` or `EPSG` flavours).
fn declared_crs(members: &JsonObject) -> Option<Crs> {
    let crs = members.get("crs")?;
    let properties = crs.get("properties")?;
    if let Some(name) = properties.get("name").and_then(|name| name.as_str()) {
        return Some(Crs::parse(name));
    }
    properties
        .get("code")
        .and_then(|code| code.as_u64())
        .and_then(|code| u32::try_from(code).ok())
        .map(Crs::Epsg)
}

fn common_geometry_type(features: &[Feature]) -> Option<&'static str> {
    let mut kinds = features
        .iter()
        .filter_map(|feature| feature.geometry.as_ref())
        .map(|geometry| json_type_name(&geometry.value));
    let first = kinds.next()?;
    kinds.all(|kind| kind == first).then_some(first)
}

fn json_type_name(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn features_to_table(features: Vec<Feature>, crs: Option<Crs>, layer: &str) -> Table {
    let mut columns: Vec<String> = Vec::new();
    for feature in &features {
        if let Some(properties) = &feature.properties {
            for key in properties.keys() {
                if !columns.iter().any(|column| column == key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let mut table = Table::new(columns.clone(), crs);
    let mut unreadable = 0usize;
    for (ordinal, feature) in features.into_iter().enumerate() {
        let values = columns
            .iter()
            .map(|column| {
                feature
                    .properties
                    .as_ref()
                    .and_then(|properties| properties.get(column))
                    .map(Value::from_json)
                    .unwrap_or(Value::Null)
            })
            .collect();
        let geometry = match feature.geometry {
            Some(geometry) => match Geometry::<f64>::try_from(geometry.value) {
                Ok(geometry) => Some(geometry),
                Err(err) => {
                    debug!("Feature {ordinal} in layer '{layer}' has an unreadable geometry: {err}");
                    unreadable += 1;
                    None
                }
            },
            None => None,
        };
        table.push_row(Row::new(values, geometry));
    }
    if unreadable > 0 {
        warn!("[read] {unreadable} feature(s) in layer '{layer}' had unreadable geometries");
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SQUARE: &str = r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#;

    fn collection(geometries: &[&str], extra: &str) -> String {
        let features = geometries
            .iter()
            .enumerate()
            .map(|(i, g)| {
                format!(r#"{{"type":"Feature","properties":{{"ID":{i},"Name":"n{i}"}},"geometry":{g}}}"#)
            })
            .collect::<Vec<_>>()
            .join(",");
        format!(r#"{{"type":"FeatureCollection"{extra},"features":[{features}]}}"#)
    }

    #[test]
    fn lists_directory_layers_in_name_order() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("roads.geojson"),
            collection(&[r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#], ""),
        )
        .unwrap();
        fs::write(dir.path().join("parcels.geojson"), collection(&[SQUARE, SQUARE], "")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let container = GeoJsonContainer::open(dir.path()).unwrap();
        let layers = container.list_layers().unwrap();
        assert_eq!(
            layers,
            vec![
                LayerInfo::new("parcels", Some("Polygon"), 2),
                LayerInfo::new("roads", Some("LineString"), 1),
            ]
        );
    }

    #[test]
    fn mixed_geometry_types_have_no_common_type() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mixed.geojson");
        fs::write(
            &path,
            collection(&[SQUARE, r#"{"type":"Point","coordinates":[0,0]}"#], ""),
        )
        .unwrap();
        let layers = GeoJsonContainer::open(&path).unwrap().list_layers().unwrap();
        assert_eq!(layers, vec![LayerInfo::new("mixed", None, 2)]);
    }

    #[test]
    fn reads_properties_geometry_and_declared_crs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parcels.geojson");
        fs::write(
            &path,
            collection(
                &[SQUARE, "null"],
                r#","crs":{"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::26918"}}"#,
            ),
        )
        .unwrap();
        let table = GeoJsonContainer::open(&path).unwrap().read("parcels").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.crs(), Some(&Crs::Epsg(26918)));
        let id = table.column_index("ID").unwrap();
        assert_eq!(table.value(1, id), &Value::Integer(1));
        assert!(table.rows()[0].geometry.is_some());
        assert!(table.rows()[1].geometry.is_none());
    }

    #[test]
    fn missing_container_is_a_container_error() {
        let dir = tempdir().unwrap();
        let err = GeoJsonContainer::open(&dir.path().join("nope.gdb")).unwrap_err();
        assert!(matches!(err, PipelineError::Container(_)));
    }

    #[test]
    fn unknown_layer_lists_available_names() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("parcels.geojson"), collection(&[SQUARE], "")).unwrap();
        let err = GeoJsonContainer::open(dir.path())
            .unwrap()
            .read("lots")
            .unwrap_err();
        assert!(err.to_string().contains("parcels"));
    }

    #[test]
    fn vanished_directory_is_transient_on_read_but_fatal_on_listing() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("share.gdb");
        fs::create_dir(&root).unwrap();
        let container = GeoJsonContainer::open(&root).unwrap();
        fs::remove_dir(&root).unwrap();

        let err = container.read("parcels").unwrap_err();
        assert!(err.is_transient(), "{err:?}");
        let err = container.list_layers().unwrap_err();
        assert!(matches!(err, PipelineError::Container(_)), "{err:?}");
    }
}
