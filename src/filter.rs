use log::{debug, info};

use crate::{
    columns::{ColumnMapping, PARCEL_ADDR, PARCEL_ADDRESS, SWIS_SBL_ID},
    data::{Row, Table, Value},
    error::{PipelineError, Result},
};

/// Identity values that sources write instead of leaving the cell empty.
const NULL_LIKE_TOKENS: &[&str] = &["nan", "none", "null"];
/// Address fragment marking water bodies rather than land parcels.
const WATER_MARKER: &str = "water";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    MissingIdentity,
    WaterAddress,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterReport {
    pub missing_identity: usize,
    pub water_address: usize,
    pub kept: usize,
}

impl FilterReport {
    pub fn removed(&self) -> usize {
        self.missing_identity + self.water_address
    }
}

#[derive(Debug, Clone)]
struct ExclusionRules {
    identity: usize,
    address: Option<usize>,
}

impl ExclusionRules {
    fn evaluate(&self, row: &Row) -> Option<ExclusionReason> {
        if is_null_like(&row.values[self.identity]) {
            return Some(ExclusionReason::MissingIdentity);
        }
        match self.address {
            Some(idx) if mentions_water(&row.values[idx]) => Some(ExclusionReason::WaterAddress),
            _ => None,
        }
    }
}

pub fn is_null_like(value: &Value) -> bool {
    match value.as_text() {
        None => true,
        Some(text) => {
            let trimmed = text.trim();
            trimmed.is_empty()
                || NULL_LIKE_TOKENS
                    .iter()
                    .any(|token| trimmed.eq_ignore_ascii_case(token))
        }
    }
}

fn mentions_water(value: &Value) -> bool {
    value
        .as_text()
        .is_some_and(|text| text.to_lowercase().contains(WATER_MARKER))
}

/// Drops rows without a usable identity and rows whose address names water.
pub fn apply_exclusions(table: Table, mapping: &ColumnMapping) -> Result<(Table, FilterReport)> {
    let identity_column = mapping.required(SWIS_SBL_ID)?;
    let identity = table.column_index(identity_column).ok_or_else(|| {
        PipelineError::schema(format!("identity column '{identity_column}' is not in the table"))
    })?;
    let address = mapping
        .first_of(&[PARCEL_ADDR, PARCEL_ADDRESS])
        .and_then(|column| table.column_index(column));
    if address.is_none() {
        debug!("No address column resolved; water exclusion disabled");
    }
    let rules = ExclusionRules { identity, address };

    let before = table.len();
    let mut report = FilterReport::default();
    let table = table.retain_rows(|row| match rules.evaluate(row) {
        Some(ExclusionReason::MissingIdentity) => {
            report.missing_identity += 1;
            false
        }
        Some(ExclusionReason::WaterAddress) => {
            report.water_address += 1;
            false
        }
        None => true,
    });
    report.kept = table.len();
    info!(
        "[filter] {before} -> {} rows ({} without identity, {} water)",
        report.kept, report.missing_identity, report.water_address
    );
    Ok((table, report))
}
