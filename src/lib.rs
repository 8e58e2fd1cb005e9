pub mod area;
pub mod cli;
pub mod columns;
pub mod config;
pub mod container;
pub mod data;
pub mod dedup;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod layer;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod sanitize;
pub mod schema;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands, LayersArgs},
    container::{Container, GeoJsonContainer},
    table::{Align, TextTable},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("parcel_etl", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Layers(args) => handle_layers(&args),
        Commands::Run(args) => pipeline::execute(&args),
    }
}

fn handle_layers(args: &LayersArgs) -> Result<()> {
    let keywords = if args.layer_keywords.is_empty() {
        layer::default_keywords()
    } else {
        args.layer_keywords.clone()
    };
    info!("Listing layers of '{}'", args.input.display());
    let container = GeoJsonContainer::open(&args.input)
        .with_context(|| format!("Opening container {:?}", args.input))?;
    let layers = container
        .list_layers()
        .with_context(|| format!("Enumerating layers of {:?}", args.input))?;
    let choice = layer::select_layer(&layers, &keywords)?;

    let mut table = TextTable::new(&[
        ("layer", Align::Left),
        ("geometry", Align::Left),
        ("features", Align::Right),
        ("selected", Align::Left),
    ]);
    for info in &layers {
        let selected = if info.name == choice.name {
            choice.selection.to_string()
        } else {
            String::new()
        };
        table.push(vec![
            info.name.clone(),
            info.geometry_type.clone().unwrap_or_else(|| "mixed/none".into()),
            info.feature_count.to_string(),
            selected,
        ]);
    }
    table.print();
    Ok(())
}
