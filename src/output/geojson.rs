use std::io::{BufWriter, Write};

use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};

use crate::{
    error::{PipelineError, Result},
    schema::{ACRES, COUNTY, OWNER_NAME, PARCEL_ID, ParcelRecord, ParcelTable, STATE},
};

fn to_feature(record: &ParcelRecord) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert(PARCEL_ID.to_string(), JsonValue::from(record.parcel_id.clone()));
    properties.insert(OWNER_NAME.to_string(), JsonValue::from(record.owner_name.clone()));
    properties.insert(COUNTY.to_string(), JsonValue::from(record.county.clone()));
    properties.insert(STATE.to_string(), JsonValue::from(record.state.clone()));
    properties.insert(ACRES.to_string(), JsonValue::from(record.acres));
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&record.geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Mirrors the parcels as a GeoJSON FeatureCollection in WGS84.
pub fn write_geojson<W: Write>(parcels: &ParcelTable, sink: W) -> Result<()> {
    let collection = FeatureCollection {
        bbox: None,
        features: parcels.records().iter().map(to_feature).collect(),
        foreign_members: None,
    };
    let mut writer = BufWriter::new(sink);
    serde_json::to_writer(&mut writer, &collection)
        .map_err(|e| PipelineError::output(format!("geojson write failed: {e}")))?;
    writer
        .flush()
        .map_err(|e| PipelineError::output(format!("geojson flush failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use geojson::GeoJson;

    #[test]
    fn writes_feature_collection_with_null_properties() {
        let parcels = ParcelTable::new(vec![ParcelRecord {
            parcel_id: "42".into(),
            owner_name: None,
            county: Some("Kings".into()),
            state: "new york".into(),
            acres: 0.5,
            geometry: polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)].into(),
        }]);
        let mut buffer = Vec::new();
        write_geojson(&parcels, &mut buffer).unwrap();

        let GeoJson::FeatureCollection(collection) =
            String::from_utf8(buffer).unwrap().parse::<GeoJson>().unwrap()
        else {
            panic!("expected a feature collection");
        };
        assert_eq!(collection.features.len(), 1);
        let feature = &collection.features[0];
        assert_eq!(feature.property("parcel_id"), Some(&JsonValue::from("42")));
        assert_eq!(feature.property("owner_name"), Some(&JsonValue::Null));
        assert_eq!(feature.property("acres"), Some(&JsonValue::from(0.5)));
        assert!(matches!(
            feature.geometry.as_ref().map(|g| &g.value),
            Some(geojson::Value::Polygon(_))
        ));
    }
}
