//! Run configuration: an optional YAML file merged with command-line flags.
//!
//! ```yaml
//! input: data/NYS_Tax_Parcels
//! output: out/ny_parcels.parquet
//! write_geopackage: true
//! geopackage_output: out/ny_parcels.gpkg
//! layer_keywords: [parcel, tax]
//! ```

use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cli::RunArgs,
    layer::default_keywords,
    normalize::DEFAULT_STATE,
    output::{ArtifactKind, ArtifactTarget},
};

pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

fn default_state() -> String {
    DEFAULT_STATE.to_string()
}

fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Container holding the parcel layer.
    #[serde(default)]
    pub input: Option<PathBuf>,
    /// Explicit layer name; auto-detected when absent.
    #[serde(default)]
    pub layer: Option<String>,
    /// GeoParquet destination.
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// GeoPackage mirror with a single `ny_parcels_clean` layer.
    #[serde(default)]
    pub write_geopackage: bool,
    #[serde(default)]
    pub geopackage_output: Option<PathBuf>,
    #[serde(default)]
    pub write_geojson: bool,
    #[serde(default)]
    pub geojson_output: Option<PathBuf>,
    #[serde(default)]
    pub write_shapefile: bool,
    #[serde(default)]
    pub shapefile_output: Option<PathBuf>,
    #[serde(default = "default_keywords")]
    pub layer_keywords: Vec<String>,
    /// Literal written to the `state` column of every record.
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: None,
            layer: None,
            output: None,
            write_geopackage: false,
            geopackage_output: None,
            write_geojson: false,
            geojson_output: None,
            write_shapefile: false,
            shapefile_output: None,
            layer_keywords: default_keywords(),
            state: default_state(),
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Reading pipeline config {path:?}"))?;
        Self::from_yaml(&text).with_context(|| format!("Parsing pipeline config {path:?}"))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Loads the config file named by `--config` (if any) and lets every
    /// flag given on the command line take precedence.
    pub fn from_args(args: &RunArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, args: &RunArgs) {
        if let Some(input) = &args.input {
            self.input = Some(input.clone());
        }
        if let Some(layer) = &args.layer {
            self.layer = Some(layer.clone());
        }
        if let Some(output) = &args.output {
            self.output = Some(output.clone());
        }
        if let Some(path) = &args.geopackage_output {
            self.geopackage_output = Some(path.clone());
        }
        if let Some(path) = &args.geojson_output {
            self.geojson_output = Some(path.clone());
        }
        if let Some(path) = &args.shapefile_output {
            self.shapefile_output = Some(path.clone());
        }
        self.write_geopackage |= args.write_geopackage;
        self.write_geojson |= args.write_geojson;
        self.write_shapefile |= args.write_shapefile;
        if !args.layer_keywords.is_empty() {
            self.layer_keywords = args.layer_keywords.clone();
        }
        if let Some(state) = &args.state {
            self.state = state.clone();
        }
        if let Some(delay) = args.retry_delay_secs {
            self.retry_delay_secs = delay;
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.input.is_some(),
            "No input container configured (use --input or `input:`)"
        );
        ensure!(
            self.output.is_some(),
            "No output path configured (use --output or `output:`)"
        );
        ensure!(
            !self.write_geopackage || self.geopackage_output.is_some(),
            "GeoPackage output is enabled but no geopackage_output path is configured"
        );
        ensure!(
            !self.write_geojson || self.geojson_output.is_some(),
            "GeoJSON output is enabled but no geojson_output path is configured"
        );
        ensure!(
            !self.write_shapefile || self.shapefile_output.is_some(),
            "Shapefile output is enabled but no shapefile_output path is configured"
        );
        ensure!(
            self.layer_keywords.iter().all(|kw| !kw.trim().is_empty()),
            "Layer keywords must not be blank"
        );
        let targets = self.artifact_targets();
        for (i, a) in targets.iter().enumerate() {
            ensure!(
                targets[i + 1..].iter().all(|b| b.path != a.path),
                "Output path {:?} is used by more than one artifact",
                a.path
            );
        }
        Ok(())
    }

    /// Enabled artifacts, primary GeoParquet first.
    pub fn artifact_targets(&self) -> Vec<ArtifactTarget> {
        let mut targets = Vec::new();
        if let Some(output) = &self.output {
            targets.push(ArtifactTarget::new(ArtifactKind::GeoParquet, output));
        }
        if let (true, Some(path)) = (self.write_geopackage, &self.geopackage_output) {
            targets.push(ArtifactTarget::new(ArtifactKind::GeoPackage, path));
        }
        if let (true, Some(path)) = (self.write_geojson, &self.geojson_output) {
            targets.push(ArtifactTarget::new(ArtifactKind::GeoJson, path));
        }
        if let (true, Some(path)) = (self.write_shapefile, &self.shapefile_output) {
            targets.push(ArtifactTarget::new(ArtifactKind::Shapefile, path));
        }
        targets
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}
