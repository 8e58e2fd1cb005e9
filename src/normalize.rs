use std::time::Instant;

use log::{debug, info};

use crate::{
    columns::{COUNTY_NAME, ColumnMapping, PRIMARY_OWNER, SWIS_SBL_ID},
    data::{Table, Value},
    error::{PipelineError, Result},
    schema::{COUNTY, OWNER_NAME, PARCEL_ID, STATE},
};

pub const DEFAULT_STATE: &str = "new york";

const RENAMES: &[(&str, &str)] = &[
    (COUNTY_NAME, COUNTY),
    (SWIS_SBL_ID, PARCEL_ID),
    (PRIMARY_OWNER, OWNER_NAME),
];

/// Renames the identity columns to their canonical names, coerces them to
/// nullable text and stamps the `state` literal on every row.
///
/// A source column that already carries one of the canonical names (and is
/// not itself being renamed) is replaced by the renamed column.
pub fn normalize_fields(table: Table, mapping: &ColumnMapping, state: &str) -> Result<Table> {
    let started = Instant::now();
    let mut sources = Vec::with_capacity(RENAMES.len());
    for (logical, canonical) in RENAMES {
        sources.push((mapping.required(logical)?.to_string(), *canonical));
    }

    let shadowed = |column: &str| {
        let is_target = RENAMES.iter().any(|(_, canonical)| *canonical == column)
            || column == STATE;
        is_target && !sources.iter().any(|(physical, _)| physical == column)
    };
    let table = table.drop_columns(|column| {
        let drop = shadowed(column);
        if drop {
            debug!("Replacing source column '{column}' with the normalised field");
        }
        drop
    });

    let mut renames = Vec::with_capacity(sources.len());
    for (physical, canonical) in &sources {
        let idx = table.column_index(physical).ok_or_else(|| {
            PipelineError::schema(format!("resolved column '{physical}' is not in the table"))
        })?;
        renames.push((idx, *canonical));
    }

    let mut table = table.rename_columns(&renames);
    for (idx, _) in &renames {
        table = table.map_column(*idx, Value::into_nullable_text);
    }
    let state = state.to_string();
    let table = table.set_column(STATE, |_| Value::Text(state.clone()));

    info!(
        "[rename] Renamed {} and added {STATE}='{state}' ({:.2?})",
        sources
            .iter()
            .map(|(physical, canonical)| format!("{physical}->{canonical}"))
            .collect::<Vec<_>>()
            .join(", "),
        started.elapsed()
    );
    Ok(table)
}
