//! Geometry sanitizer: topology repair, empty-geometry removal and CRS
//! normalisation to geographic WGS84.
//!
//! Repair runs before reprojection, and both run before area computation.

use log::{debug, info, warn};

use crate::{
    data::{Row, Table},
    error::Result,
    geometry::{
        self,
        crs::{Crs, Reprojector},
        repair,
    },
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SanitizeReport {
    pub repaired: usize,
    pub irreparable: usize,
    pub null_or_empty: usize,
    /// CRS the layer was reprojected from, if any.
    pub reprojected_from: Option<Crs>,
    /// Set when the layer declared no CRS and WGS84 was assumed.
    pub assumed_wgs84: bool,
}

impl SanitizeReport {
    pub fn dropped(&self) -> usize {
        self.irreparable + self.null_or_empty
    }
}

pub fn sanitize(table: Table, reprojector: &dyn Reprojector) -> Result<(Table, SanitizeReport)> {
    let mut report = SanitizeReport::default();
    let (table, repair_counts) = repair_geometries(table);
    report.repaired = repair_counts.repaired;
    report.irreparable = repair_counts.irreparable;
    report.null_or_empty = repair_counts.null_or_empty;

    let table = match table.crs().cloned() {
        None => {
            warn!(
                "[sanitize] Input has no CRS; assuming {}. Set the CRS explicitly if this is wrong",
                Crs::wgs84()
            );
            report.assumed_wgs84 = true;
            table.with_crs(Some(Crs::wgs84()))
        }
        Some(crs) if crs.is_wgs84() => table,
        Some(crs) => {
            info!("[sanitize] Reprojecting {crs} -> {} for geodesic area", Crs::wgs84());
            let table = table.map_geometries(Some(Crs::wgs84()), |geometry| {
                reprojector.reproject(geometry, &crs)
            })?;
            report.reprojected_from = Some(crs);
            table
        }
    };
    Ok((table, report))
}

#[derive(Debug, Default)]
struct RepairCounts {
    repaired: usize,
    irreparable: usize,
    null_or_empty: usize,
}

fn repair_geometries(table: Table) -> (Table, RepairCounts) {
    let mut counts = RepairCounts::default();
    let columns = table.columns().to_vec();
    let crs = table.crs().cloned();
    let mut rows = Vec::with_capacity(table.len());

    for (ordinal, row) in table.into_rows().into_iter().enumerate() {
        let Some(geometry) = row.geometry else {
            counts.null_or_empty += 1;
            continue;
        };
        if geometry::is_empty(&geometry) {
            counts.null_or_empty += 1;
            continue;
        }
        if repair::is_valid(&geometry) {
            rows.push(Row::new(row.values, Some(geometry)));
            continue;
        }
        match repair::make_valid(geometry) {
            Some(fixed) => {
                counts.repaired += 1;
                rows.push(Row::new(row.values, Some(fixed)));
            }
            None => {
                debug!("Row {ordinal} has an irreparable geometry; dropping it");
                counts.irreparable += 1;
            }
        }
    }

    if counts.irreparable > 0 {
        warn!(
            "[sanitize] Dropped {} row(s) whose geometry could not be repaired",
            counts.irreparable
        );
    }
    (Table::with_rows(columns, rows, crs), counts)
}
