//! The run driver: sequences every stage over one in-memory table, retries the
//! layer read once on transient I/O failure and publishes the artifacts.

use std::{path::PathBuf, thread, time::Duration, time::Instant};

use anyhow::{Context, Result as AnyResult};
use log::{info, warn};

use crate::{
    area::compute_acres,
    cli::RunArgs,
    columns::{OPTIONAL_COLUMNS, REQUIRED_COLUMNS, resolve_columns},
    config::PipelineConfig,
    container::{Container, GeoJsonContainer},
    data::Table,
    dedup::{DedupReport, dedupe},
    error::{PipelineError, Result},
    filter::{FilterReport, apply_exclusions},
    geometry::crs::{ProjReprojector, Reprojector},
    layer::{LayerChoice, resolve_layer},
    normalize::normalize_fields,
    output,
    sanitize::{SanitizeReport, sanitize},
    schema::finalize,
    table::{Align, TextTable},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCount {
    pub stage: &'static str,
    pub rows: usize,
    pub removed: usize,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub layer: LayerChoice,
    pub stages: Vec<StageCount>,
    pub sanitize: SanitizeReport,
    pub filter: FilterReport,
    pub dedup: DedupReport,
    pub rows_written: usize,
    pub artifacts: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn rows_read(&self) -> usize {
        self.stages.first().map_or(0, |stage| stage.rows)
    }

    pub fn to_table(&self) -> TextTable {
        let mut table = TextTable::new(&[
            ("stage", Align::Left),
            ("rows", Align::Right),
            ("removed", Align::Right),
        ]);
        for stage in &self.stages {
            table.push(vec![
                stage.stage.to_string(),
                stage.rows.to_string(),
                stage.removed.to_string(),
            ]);
        }
        table
    }
}

/// Records row counts as the table moves through the stages.
struct StageLog {
    stages: Vec<StageCount>,
}

impl StageLog {
    fn start(rows: usize) -> Self {
        Self {
            stages: vec![StageCount {
                stage: "read",
                rows,
                removed: 0,
            }],
        }
    }

    fn record(&mut self, stage: &'static str, rows: usize) {
        let previous = self.stages.last().map_or(rows, |last| last.rows);
        self.stages.push(StageCount {
            stage,
            rows,
            removed: previous.saturating_sub(rows),
        });
    }
}

/// Reads `layer`, retrying once after `delay` when the read fails with a
/// transient I/O error. A second failure is reported as a container error.
pub fn load_with_retry(container: &dyn Container, layer: &str, delay: Duration) -> Result<Table> {
    match container.read(layer) {
        Err(err) if err.is_transient() => {
            warn!("[read] {err}; retrying once in {delay:?}");
            thread::sleep(delay);
            container.read(layer).map_err(|err| match err {
                PipelineError::TransientIo { message, source } => PipelineError::container(
                    format!("{message}: {source} (still failing after one retry)"),
                ),
                other => other,
            })
        }
        other => other,
    }
}

pub fn run_pipeline(
    config: &PipelineConfig,
    container: &dyn Container,
    reprojector: &dyn Reprojector,
) -> Result<RunReport> {
    let started = Instant::now();
    let layer = resolve_layer(container, config.layer.as_deref(), &config.layer_keywords)?;

    let table = load_with_retry(container, &layer.name, config.retry_delay())?;
    info!(
        "[read] Loaded {} rows x {} columns from layer '{}' ({:.2?})",
        table.len(),
        table.columns().len(),
        layer.name,
        started.elapsed()
    );
    let mut stages = StageLog::start(table.len());

    let mapping = resolve_columns(table.columns(), REQUIRED_COLUMNS, OPTIONAL_COLUMNS)?;
    info!("[columns] {mapping}");

    let (table, sanitize_report) = sanitize(table, reprojector)?;
    info!(
        "[sanitize] {} repaired, {} dropped; {} rows remain",
        sanitize_report.repaired,
        sanitize_report.dropped(),
        table.len()
    );
    stages.record("sanitize", table.len());

    let (table, filter_report) = apply_exclusions(table, &mapping)?;
    stages.record("filter", table.len());

    let table = normalize_fields(table, &mapping, &config.state)?;
    let table = compute_acres(table);

    let (table, dedup_report) = dedupe(table, &mapping);
    let after_dedup = table.len();
    let after_first = stages.stages.last().map_or(0, |last| last.rows)
        - dedup_report.by_parcel_id.unwrap_or(0);
    stages.record("dedupe-1", after_first);
    stages.record("dedupe-2", after_first - dedup_report.by_composite_key);
    stages.record("dedupe-3", after_dedup);

    let parcels = finalize(table)?;
    let artifacts = output::publish(&parcels, &config.artifact_targets())?;
    stages.record("write", parcels.len());

    let report = RunReport {
        layer,
        stages: stages.stages,
        sanitize: sanitize_report,
        filter: filter_report,
        dedup: dedup_report,
        rows_written: parcels.len(),
        artifacts,
        elapsed: started.elapsed(),
    };
    info!(
        "[run] Finished: {} -> {} rows in {:.2?}",
        report.rows_read(),
        report.rows_written,
        report.elapsed
    );
    Ok(report)
}

pub fn execute(args: &RunArgs) -> AnyResult<()> {
    let config = PipelineConfig::from_args(args)?;
    let input = config
        .input
        .as_deref()
        .context("No input container configured")?;
    let container = GeoJsonContainer::open(input)
        .with_context(|| format!("Opening container {input:?}"))?;
    let report = run_pipeline(&config, &container, &ProjReprojector::new())
        .with_context(|| format!("Processing {input:?}"))?;

    println!(
        "Layer '{}' ({})",
        report.layer.name, report.layer.selection
    );
    report.to_table().print();
    for path in &report.artifacts {
        println!("wrote {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{container::LayerInfo, data::Row, data::Value};
    use std::{cell::Cell, io};

    /// Container whose reads fail with a transient error a set number of times.
    struct FlakyContainer {
        failures: Cell<usize>,
        reads: Cell<usize>,
    }

    impl FlakyContainer {
        fn new(failures: usize) -> Self {
            Self {
                failures: Cell::new(failures),
                reads: Cell::new(0),
            }
        }
    }

    impl Container for FlakyContainer {
        fn location(&self) -> String {
            "memory".into()
        }

        fn list_layers(&self) -> Result<Vec<LayerInfo>> {
            Ok(vec![LayerInfo::new("parcels", Some("Polygon"), 1)])
        }

        fn read(&self, _layer: &str) -> Result<Table> {
            self.reads.set(self.reads.get() + 1);
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(PipelineError::transient(
                    "reading parcels",
                    io::Error::new(io::ErrorKind::Interrupted, "network share hiccup"),
                ));
            }
            let mut table = Table::new(vec!["id".into()], None);
            table.push_row(Row::new(vec![Value::Integer(1)], None));
            Ok(table)
        }
    }

    #[test]
    fn transient_read_failure_is_retried_once() {
        let container = FlakyContainer::new(1);
        let table = load_with_retry(&container, "parcels", Duration::ZERO).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(container.reads.get(), 2);
    }

    #[test]
    fn second_failure_escalates_to_container_error() {
        let container = FlakyContainer::new(2);
        let err = load_with_retry(&container, "parcels", Duration::ZERO).unwrap_err();
        assert!(matches!(err, PipelineError::Container(_)), "{err:?}");
        assert!(err.to_string().contains("network share hiccup"));
        assert_eq!(container.reads.get(), 2);
    }

    #[test]
    fn stage_log_tracks_removals() {
        let mut log = StageLog::start(10);
        log.record("sanitize", 9);
        log.record("filter", 9);
        assert_eq!(
            log.stages.iter().map(|s| s.removed).collect::<Vec<_>>(),
            [0, 1, 0]
        );
    }
}
