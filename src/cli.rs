use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Clean, deduplicate and publish land-parcel layers as GeoParquet",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the layers of a container and show which one would be selected
    Layers(LayersArgs),
    /// Run the full cleaning pipeline and write the output artifacts
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct LayersArgs {
    /// Container to inspect (directory of GeoJSON layers or a single file)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Preferred layer-name keyword; repeat to add more (defaults to `parcel`)
    #[arg(long = "layer-keyword", action = clap::ArgAction::Append)]
    pub layer_keywords: Vec<String>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// YAML file with pipeline settings; flags below override its values
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Container holding the parcel layer
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,
    /// Layer to read instead of auto-detecting one
    #[arg(long)]
    pub layer: Option<String>,
    /// Destination GeoParquet file
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Also write a GeoPackage with a `ny_parcels_clean` layer
    #[arg(long = "write-geopackage")]
    pub write_geopackage: bool,
    /// Destination of the GeoPackage mirror
    #[arg(long = "geopackage-output")]
    pub geopackage_output: Option<PathBuf>,
    /// Also write a GeoJSON FeatureCollection
    #[arg(long = "write-geojson")]
    pub write_geojson: bool,
    /// Destination of the GeoJSON mirror
    #[arg(long = "geojson-output")]
    pub geojson_output: Option<PathBuf>,
    /// Also write a zipped ESRI shapefile
    #[arg(long = "write-shapefile")]
    pub write_shapefile: bool,
    /// Destination of the zipped shapefile
    #[arg(long = "shapefile-output")]
    pub shapefile_output: Option<PathBuf>,
    /// Preferred layer-name keyword; repeat to add more (defaults to `parcel`)
    #[arg(long = "layer-keyword", action = clap::ArgAction::Append)]
    pub layer_keywords: Vec<String>,
    /// Value written to the `state` column (defaults to `new york`)
    #[arg(long)]
    pub state: Option<String>,
    /// Seconds to wait before retrying a failed layer read (defaults to 5)
    #[arg(long = "retry-delay-secs")]
    pub retry_delay_secs: Option<u64>,
}
