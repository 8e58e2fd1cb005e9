//! Output sinks and the all-or-nothing publish step.
//!
//! Every enabled artifact is first written to a temporary file in its target
//! directory. Targets are only replaced once all artifacts were produced, so a
//! failed run never leaves a partially written file behind, and files that
//! existed before the run are put back.

pub mod geojson;
pub mod geopackage;
pub mod parquet;
pub mod shapefile;

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Instant,
};

use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::{
    error::{PipelineError, Result},
    schema::ParcelTable,
};

const STAGING_PREFIX: &str = ".parcel-etl-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    GeoParquet,
    GeoPackage,
    GeoJson,
    Shapefile,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::GeoParquet => f.write_str("geoparquet"),
            ArtifactKind::GeoPackage => f.write_str("geopackage"),
            ArtifactKind::GeoJson => f.write_str("geojson"),
            ArtifactKind::Shapefile => f.write_str("shapefile (zip)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactTarget {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

impl ArtifactTarget {
    pub fn new(kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Directory the artifact is staged in; created when missing.
pub(crate) fn staging_dir(target: &Path) -> Result<PathBuf> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)
        .map_err(|err| PipelineError::output(format!("cannot create {dir:?}: {err}")))?;
    Ok(dir)
}

fn stage(parcels: &ParcelTable, target: &ArtifactTarget) -> Result<NamedTempFile> {
    let dir = staging_dir(&target.path)?;
    let mut file = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(&dir)
        .map_err(|err| PipelineError::output(format!("cannot stage {:?}: {err}", target.path)))?;
    match target.kind {
        ArtifactKind::GeoParquet => parquet::write_geoparquet(parcels, file.as_file_mut())?,
        ArtifactKind::GeoPackage => geopackage::write_geopackage(parcels, file.path())?,
        ArtifactKind::GeoJson => geojson::write_geojson(parcels, file.as_file_mut())?,
        ArtifactKind::Shapefile => {
            shapefile::write_shapefile_zip(parcels, &target.path, file.as_file_mut())?
        }
    }
    file.as_file()
        .sync_all()
        .map_err(|err| PipelineError::output(format!("cannot flush {:?}: {err}", target.path)))?;
    debug!("Staged {} at {:?}", target.kind, file.path());
    Ok(file)
}

/// Targets moved into place so far, and the files they displaced.
#[derive(Default)]
struct Publication {
    published: Vec<PathBuf>,
    /// (backup, original target) pairs.
    backups: Vec<(PathBuf, PathBuf)>,
}

impl Publication {
    /// Moves an existing regular file at `target` aside.
    fn set_aside(&mut self, target: &Path) -> Result<()> {
        if !target.is_file() {
            return Ok(());
        }
        let name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let backup = target.with_file_name(format!("{STAGING_PREFIX}{name}.previous"));
        fs::rename(target, &backup).map_err(|err| {
            PipelineError::output(format!("cannot set aside existing {target:?}: {err}"))
        })?;
        self.backups.push((backup, target.to_path_buf()));
        Ok(())
    }

    fn rollback(self) {
        for path in &self.published {
            if let Err(err) = fs::remove_file(path) {
                warn!("Could not remove {path:?} after a failed publish: {err}");
            }
        }
        for (backup, target) in &self.backups {
            if let Err(err) = fs::rename(backup, target) {
                warn!("Could not restore {target:?} from {backup:?}: {err}");
            }
        }
    }

    fn commit(self) -> Vec<PathBuf> {
        for (backup, _) in &self.backups {
            if let Err(err) = fs::remove_file(backup) {
                warn!("Could not remove replaced file {backup:?}: {err}");
            }
        }
        self.published
    }
}

/// Writes every target, then moves them into place together.
///
/// On failure no target is left half written: staged files are discarded,
/// targets already moved into place are removed, and the files they replaced
/// are restored.
pub fn publish(parcels: &ParcelTable, targets: &[ArtifactTarget]) -> Result<Vec<PathBuf>> {
    let started = Instant::now();
    let mut staged = Vec::with_capacity(targets.len());
    for target in targets {
        staged.push((target, stage(parcels, target)?));
    }

    // The primary artifact goes last so its presence implies the others.
    staged.sort_by_key(|(target, _)| target.kind == ArtifactKind::GeoParquet);
    let mut publication = Publication::default();
    for (target, file) in staged {
        if let Err(err) = publication.set_aside(&target.path) {
            publication.rollback();
            return Err(err);
        }
        if let Err(err) = file.persist(&target.path) {
            publication.rollback();
            return Err(PipelineError::output(format!(
                "cannot move {} into place at {:?}: {}",
                target.kind, target.path, err.error
            )));
        }
        info!("[write] {} -> {:?}", target.kind, target.path);
        publication.published.push(target.path.clone());
    }
    let published = publication.commit();
    info!(
        "[write] Published {} artifact(s) with {} rows ({:.2?})",
        published.len(),
        parcels.len(),
        started.elapsed()
    );
    Ok(published)
}
