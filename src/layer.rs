//! Picks the layer of a container that most likely holds parcels.
//!
//! Preference order: an explicitly named layer; the first polygon layer whose
//! name contains a preferred keyword (keywords are tried in order); the first
//! polygon layer; and finally, with a warning, the first layer of any type.

use std::fmt;

use log::{info, warn};

use crate::{
    container::{Container, LayerInfo},
    error::{PipelineError, Result},
};

pub const DEFAULT_LAYER_KEYWORD: &str = "parcel";

pub fn default_keywords() -> Vec<String> {
    vec![DEFAULT_LAYER_KEYWORD.to_string()]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Explicit,
    Keyword(String),
    FirstPolygon,
    /// No polygon layer existed; downstream results are likely degraded.
    FirstLayer,
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Explicit => f.write_str("explicit"),
            Selection::Keyword(keyword) => write!(f, "keyword '{keyword}'"),
            Selection::FirstPolygon => f.write_str("first polygon layer"),
            Selection::FirstLayer => f.write_str("first layer (no polygon layer)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerChoice {
    pub name: String,
    pub selection: Selection,
}

pub fn select_layer(layers: &[LayerInfo], keywords: &[String]) -> Result<LayerChoice> {
    let polygons: Vec<&LayerInfo> = layers.iter().filter(|layer| layer.is_polygonal()).collect();

    for keyword in keywords {
        let needle = keyword.to_lowercase();
        if let Some(layer) = polygons
            .iter()
            .find(|layer| layer.name.to_lowercase().contains(&needle))
        {
            return Ok(LayerChoice {
                name: layer.name.clone(),
                selection: Selection::Keyword(keyword.clone()),
            });
        }
    }

    if let Some(layer) = polygons.first() {
        return Ok(LayerChoice {
            name: layer.name.clone(),
            selection: Selection::FirstPolygon,
        });
    }

    layers
        .first()
        .map(|layer| LayerChoice {
            name: layer.name.clone(),
            selection: Selection::FirstLayer,
        })
        .ok_or_else(|| PipelineError::container("no layers found in container"))
}

pub fn resolve_layer(
    container: &dyn Container,
    explicit: Option<&str>,
    keywords: &[String],
) -> Result<LayerChoice> {
    if let Some(name) = explicit.map(str::trim).filter(|name| !name.is_empty()) {
        info!("[layer] Using explicitly configured layer '{name}'");
        return Ok(LayerChoice {
            name: name.to_string(),
            selection: Selection::Explicit,
        });
    }

    let layers = container.list_layers()?;
    let choice = select_layer(&layers, keywords)?;
    match &choice.selection {
        Selection::FirstLayer => warn!(
            "[layer] No polygon layer found in {}; falling back to first layer '{}'",
            container.location(),
            choice.name
        ),
        selection => info!("[layer] Selected layer '{}' by {selection}", choice.name),
    }
    Ok(choice)
}
