//! The fixed six-column output contract and the final integrity check.
//!
//! Every emitted record carries exactly [`OUTPUT_COLUMNS`], in that order:
//! `parcel_id`, `owner_name`, `county`, `state`, `acres` and a `geometry` in
//! WGS84. [`finalize`] projects a normalised [`Table`] onto that
//! contract and fails with a schema error instead of repairing anything.

use std::collections::BTreeSet;

use geo::{BoundingRect, Geometry, Rect};
use itertools::Itertools;
use log::info;

use crate::{
    data::{Table, Value},
    error::{PipelineError, Result},
    geometry,
};

pub const PARCEL_ID: &str = "parcel_id";
pub const OWNER_NAME: &str = "owner_name";
pub const COUNTY: &str = "county";
pub const STATE: &str = "state";
pub const ACRES: &str = "acres";
pub const GEOMETRY: &str = "geometry";

pub const OUTPUT_COLUMNS: [&str; 6] = [PARCEL_ID, OWNER_NAME, COUNTY, STATE, ACRES, GEOMETRY];

#[derive(Debug, Clone, PartialEq)]
pub struct ParcelRecord {
    pub parcel_id: String,
    pub owner_name: Option<String>,
    pub county: Option<String>,
    pub state: String,
    pub acres: f64,
    pub geometry: Geometry<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParcelTable {
    records: Vec<ParcelRecord>,
}

impl ParcelTable {
    pub fn new(records: Vec<ParcelRecord>) -> Self {
        Self { records }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        &OUTPUT_COLUMNS
    }

    pub fn records(&self) -> &[ParcelRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Envelope of every record's geometry.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.records
            .iter()
            .filter_map(|record| record.geometry.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                    (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
                )
            })
    }

    /// Distinct geometry type names, sorted.
    pub fn geometry_types(&self) -> Vec<&'static str> {
        self.records
            .iter()
            .map(|record| geometry::type_name(&record.geometry))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

struct OutputIndices {
    parcel_id: usize,
    owner_name: usize,
    county: usize,
    state: usize,
    acres: usize,
}

impl OutputIndices {
    fn locate(table: &Table) -> Result<Self> {
        let find = |name: &str| {
            table.column_index(name).ok_or_else(|| {
                PipelineError::schema(format!(
                    "output column '{name}' is missing; table has [{}]",
                    table.columns().iter().join(", ")
                ))
            })
        };
        Ok(Self {
            parcel_id: find(PARCEL_ID)?,
            owner_name: find(OWNER_NAME)?,
            county: find(COUNTY)?,
            state: find(STATE)?,
            acres: find(ACRES)?,
        })
    }
}

fn optional_text(value: &Value) -> Option<String> {
    value.as_text().map(|text| text.into_owned())
}

/// Projects onto the output contract, dropping every other column.
pub fn finalize(table: Table) -> Result<ParcelTable> {
    let indices = OutputIndices::locate(&table)?;
    let dropped = table.columns().len() - (OUTPUT_COLUMNS.len() - 1);

    let mut records = Vec::with_capacity(table.len());
    for (ordinal, row) in table.into_rows().into_iter().enumerate() {
        let values = &row.values;
        let parcel_id = optional_text(&values[indices.parcel_id]).ok_or_else(|| {
            PipelineError::schema(format!("row {ordinal} has a null {PARCEL_ID}"))
        })?;
        let state = optional_text(&values[indices.state])
            .ok_or_else(|| PipelineError::schema(format!("row {ordinal} has a null {STATE}")))?;
        let acres = values[indices.acres]
            .as_f64()
            .filter(|acres| *acres >= 0.0)
            .ok_or_else(|| {
                PipelineError::schema(format!(
                    "row {ordinal} has an invalid {ACRES} value {}",
                    values[indices.acres]
                ))
            })?;
        let record = ParcelRecord {
            parcel_id,
            owner_name: optional_text(&values[indices.owner_name]),
            county: optional_text(&values[indices.county]),
            state,
            acres,
            geometry: row.geometry.ok_or_else(|| {
                PipelineError::schema(format!("row {ordinal} has no {GEOMETRY}"))
            })?,
        };
        records.push(record);
    }

    info!(
        "[schema] Projected {} rows onto [{}] (dropped {dropped} extra column(s))",
        records.len(),
        OUTPUT_COLUMNS.iter().join(", ")
    );
    Ok(ParcelTable::new(records))
}
