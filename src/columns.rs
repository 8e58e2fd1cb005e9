//! Case-insensitive resolution of logical field names to physical columns.
//!
//! The mapping is built once per load and passed to every later stage; nothing
//! downstream looks columns up by loosely matching strings again.

use std::fmt;

use crate::error::{PipelineError, Result};

/// Jurisdiction name, renamed to `county`.
pub const COUNTY_NAME: &str = "county_name";
/// Primary parcel identity, renamed to `parcel_id`.
pub const SWIS_SBL_ID: &str = "swis_sbl_id";
/// Primary owner, renamed to `owner_name`.
pub const PRIMARY_OWNER: &str = "primary_owner";

pub const PARCEL_ADDR: &str = "parcel_addr";
pub const PARCEL_ADDRESS: &str = "parcel_address";
pub const SBL: &str = "sbl";
pub const PRINT_KEY: &str = "print_key";
pub const CITYTOWN_NAME: &str = "citytown_name";
pub const MUNI_NAME: &str = "muni_name";

pub const REQUIRED_COLUMNS: &[&str] = &[COUNTY_NAME, SWIS_SBL_ID, PRIMARY_OWNER];
pub const OPTIONAL_COLUMNS: &[&str] = &[
    PARCEL_ADDR,
    PARCEL_ADDRESS,
    SBL,
    PRINT_KEY,
    CITYTOWN_NAME,
    MUNI_NAME,
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct MappingEntry {
    logical: String,
    physical: Option<String>,
    required: bool,
}

/// Immutable logical-name to physical-column mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    entries: Vec<MappingEntry>,
}

impl ColumnMapping {
    /// Physical column for a logical name, or `None` when it is absent (or was
    /// never requested).
    pub fn get(&self, logical: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.logical == logical)
            .and_then(|entry| entry.physical.as_deref())
    }

    pub fn required(&self, logical: &str) -> Result<&str> {
        self.entries
            .iter()
            .find(|entry| entry.logical == logical && entry.required)
            .and_then(|entry| entry.physical.as_deref())
            .ok_or_else(|| {
                PipelineError::schema(format!("'{logical}' is not a resolved required column"))
            })
    }

    /// First resolved column among several alternative logical names.
    pub fn first_of(&self, logicals: &[&str]) -> Option<&str> {
        logicals.iter().find_map(|logical| self.get(logical))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|entry| (entry.logical.as_str(), entry.physical.as_deref()))
    }
}

impl fmt::Display for ColumnMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .iter()
            .map(|(logical, physical)| format!("{logical}={}", physical.unwrap_or("-")))
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&rendered)
    }
}

pub fn resolve_columns(
    headers: &[String],
    required: &[&str],
    optional: &[&str],
) -> Result<ColumnMapping> {
    let mut entries = Vec::with_capacity(required.len() + optional.len());
    for logical in required {
        let physical = find_case_insensitive(headers, logical).ok_or_else(|| {
            PipelineError::schema(format!(
                "missing required column '{logical}' (case-insensitive); available: {headers:?}"
            ))
        })?;
        entries.push(MappingEntry {
            logical: logical.to_string(),
            physical: Some(physical.to_string()),
            required: true,
        });
    }
    for logical in optional {
        entries.push(MappingEntry {
            logical: logical.to_string(),
            physical: find_case_insensitive(headers, logical).map(str::to_string),
            required: false,
        });
    }
    Ok(ColumnMapping { entries })
}

// When several headers differ only by case, the last one wins.
fn find_case_insensitive<'a>(headers: &'a [String], logical: &str) -> Option<&'a str> {
    let target = logical.to_lowercase();
    headers
        .iter()
        .rev()
        .find(|header| header.to_lowercase() == target)
        .map(String::as_str)
}
