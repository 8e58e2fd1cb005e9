//! Three-stage duplicate removal.
//!
//! 1. by `parcel_id`;
//! 2. by a composite jurisdiction + survey key, always extended with the
//!    geometry fingerprint so rows with different shapes are never merged;
//! 3. by every attribute column plus the geometry fingerprint.
//!
//! Each stage keeps the first occurrence in the current row order. Stages are
//! idempotent: running the cascade on its own output removes nothing.

use std::{collections::HashSet, fmt, hash::Hash, time::Instant};

use itertools::Itertools;
use log::info;

use crate::{
    columns::{CITYTOWN_NAME, COUNTY_NAME, ColumnMapping, MUNI_NAME, PRINT_KEY, SBL},
    data::{Row, Table},
    geometry::wkb::fingerprint,
    schema::{COUNTY, PARCEL_ID},
};

const FINGERPRINT_LABEL: &str = "geometry fingerprint";

/// Attribute columns of the stage-2 key; the fingerprint is implied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeKey {
    Columns(Vec<String>),
    GeometryOnly,
}

impl CompositeKey {
    pub fn columns(&self) -> &[String] {
        match self {
            CompositeKey::Columns(columns) => columns,
            CompositeKey::GeometryOnly => &[],
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = self
            .columns()
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(FINGERPRINT_LABEL))
            .join(", ");
        f.write_str(&columns)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupReport {
    /// `None` when the table has no `parcel_id` column and stage 1 was skipped.
    pub by_parcel_id: Option<usize>,
    pub composite_key: CompositeKey,
    pub by_composite_key: usize,
    pub exact: usize,
}

impl DedupReport {
    pub fn removed(&self) -> usize {
        self.by_parcel_id.unwrap_or(0) + self.by_composite_key + self.exact
    }
}

/// Candidate stage-2 keys in priority order. A candidate is usable when both
/// of its columns resolved and are still present in the table.
pub fn candidate_keys(mapping: &ColumnMapping) -> Vec<[Option<String>; 2]> {
    let municipality = mapping.first_of(&[CITYTOWN_NAME, MUNI_NAME]).map(str::to_string);
    let sbl = mapping.get(SBL).map(str::to_string);
    let print_key = mapping.get(PRINT_KEY).map(str::to_string);
    let county = Some(COUNTY.to_string());
    let original_county = mapping.get(COUNTY_NAME).map(str::to_string);
    vec![
        [municipality, sbl.clone()],
        [county.clone(), sbl.clone()],
        [original_county.clone(), sbl],
        [county, print_key.clone()],
        [original_county, print_key],
    ]
}

pub fn choose_composite_key(table: &Table, mapping: &ColumnMapping) -> CompositeKey {
    candidate_keys(mapping)
        .into_iter()
        .find_map(|candidate| {
            candidate
                .into_iter()
                .map(|column| column.filter(|name| table.has_column(name)))
                .collect::<Option<Vec<_>>>()
        })
        .map(CompositeKey::Columns)
        .unwrap_or(CompositeKey::GeometryOnly)
}

/// Keeps the first row for each distinct key, returning the number removed.
fn keep_first_by<K, F>(table: Table, mut key_of: F) -> (Table, usize)
where
    K: Hash + Eq,
    F: FnMut(&Row) -> K,
{
    let before = table.len();
    let mut seen = HashSet::with_capacity(before);
    let table = table.retain_rows(|row| seen.insert(key_of(row)));
    let removed = before - table.len();
    (table, removed)
}

pub fn dedupe_by_parcel_id(table: Table) -> (Table, Option<usize>) {
    let Some(idx) = table.column_index(PARCEL_ID) else {
        return (table, None);
    };
    let before = table.len();
    let (table, removed) = keep_first_by(table, |row| row.values[idx].clone());
    info!(
        "[dedupe-1] by {PARCEL_ID}: {before} -> {} (removed {removed})",
        table.len()
    );
    (table, Some(removed))
}

pub fn dedupe_by_composite_key(table: Table, key: &CompositeKey) -> (Table, usize) {
    let indices = key
        .columns()
        .iter()
        .filter_map(|column| table.column_index(column))
        .collect_vec();
    if matches!(key, CompositeKey::GeometryOnly) {
        info!("[dedupe-2] No jurisdiction + survey key resolved; deduplicating by geometry only");
    }
    let before = table.len();
    let (table, removed) = keep_first_by(table, |row| {
        let attributes = indices.iter().map(|&idx| row.values[idx].clone()).collect_vec();
        (attributes, fingerprint(row.geometry.as_ref()))
    });
    info!(
        "[dedupe-2] by {key}: {before} -> {} (removed {removed})",
        table.len()
    );
    (table, removed)
}

pub fn dedupe_exact(table: Table) -> (Table, usize) {
    let before = table.len();
    let (table, removed) = keep_first_by(table, |row| {
        (row.values.clone(), fingerprint(row.geometry.as_ref()))
    });
    info!(
        "[dedupe-3] exact (all attributes + geometry): {before} -> {} (removed {removed})",
        table.len()
    );
    (table, removed)
}

pub fn dedupe(table: Table, mapping: &ColumnMapping) -> (Table, DedupReport) {
    let started = Instant::now();
    let start_rows = table.len();

    let (table, by_parcel_id) = dedupe_by_parcel_id(table);
    let composite_key = choose_composite_key(&table, mapping);
    let (table, by_composite_key) = dedupe_by_composite_key(table, &composite_key);
    let (table, exact) = dedupe_exact(table);

    let report = DedupReport {
        by_parcel_id,
        composite_key,
        by_composite_key,
        exact,
    };
    info!(
        "[dedupe] Total: {start_rows} -> {} (removed {}) in {:.2?}",
        table.len(),
        report.removed(),
        started.elapsed()
    );
    (table, report)
}

/// True when no two rows produce the same key.
pub fn has_unique_key<K: Hash + Eq>(table: &Table, key_of: impl Fn(&Row) -> K) -> bool {
    let mut seen = HashSet::with_capacity(table.len());
    table.rows().iter().all(|row| seen.insert(key_of(row)))
}
