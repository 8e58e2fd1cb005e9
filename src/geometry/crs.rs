//! Coordinate reference systems and the reprojection seam.
//!
//! Geodesic area needs geographic WGS84 coordinates, so every layer whose
//! declared CRS is something else goes through a [`Reprojector`] first. The
//! bundled [`ProjReprojector`] resolves EPSG codes through the EPSG proj4
//! definition table and transforms with `proj4rs`.

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc, sync::LazyLock};

use geo::{Coord, Geometry, MapCoords};
use proj4rs::{Proj, transform::transform};
use regex::Regex;

use crate::error::{PipelineError, Result};

pub const WGS84_EPSG: u32 = 4326;

static EPSG_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)EPSG:{1,2}(?:[0-9.]*:)?([0-9]+)").expect("EPSG pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Crs {
    Epsg(u32),
    Other(String),
}

impl Crs {
    pub fn wgs84() -> Self {
        Crs::Epsg(WGS84_EPSG)
    }

    /// Parses `EPSG:n`, `urn:ogc:def:crs:EPSG::n` and the CRS84 aliases.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.to_ascii_uppercase().ends_with("CRS84") {
            return Crs::wgs84();
        }
        EPSG_CODE
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .and_then(|code| code.as_str().parse().ok())
            .map(Crs::Epsg)
            .unwrap_or_else(|| Crs::Other(trimmed.to_string()))
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            Crs::Epsg(code) => Some(*code),
            Crs::Other(_) => None,
        }
    }

    pub fn is_wgs84(&self) -> bool {
        self.epsg() == Some(WGS84_EPSG)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{code}"),
            Crs::Other(name) => f.write_str(name),
        }
    }
}

/// Rewrites a geometry from `from` into geographic WGS84.
pub trait Reprojector {
    fn reproject(&self, geometry: Geometry<f64>, from: &Crs) -> Result<Geometry<f64>>;
}

const WGS84_PROJ4: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Reprojects with `proj4rs`, caching one transformer per source CRS.
#[derive(Default)]
pub struct ProjReprojector {
    transformers: RefCell<HashMap<Crs, Rc<Transformer>>>,
}

impl ProjReprojector {
    pub fn new() -> Self {
        Self::default()
    }

    fn transformer(&self, from: &Crs) -> Result<Rc<Transformer>> {
        if let Some(transformer) = self.transformers.borrow().get(from) {
            return Ok(Rc::clone(transformer));
        }
        let transformer = Rc::new(Transformer::for_crs(from)?);
        self.transformers
            .borrow_mut()
            .insert(from.clone(), Rc::clone(&transformer));
        Ok(transformer)
    }
}

impl Reprojector for ProjReprojector {
    fn reproject(&self, geometry: Geometry<f64>, from: &Crs) -> Result<Geometry<f64>> {
        let transformer = self.transformer(from)?;
        geometry.try_map_coords(|coord| transformer.to_wgs84(coord))
    }
}

struct Transformer {
    source: Proj,
    target: Proj,
    /// Geographic sources take radians on input.
    source_geographic: bool,
}

impl Transformer {
    fn for_crs(crs: &Crs) -> Result<Self> {
        let definition = proj4_definition(crs)?;
        let source = Proj::from_proj_string(&definition).map_err(|err| {
            PipelineError::Reprojection(format!("cannot use definition of {crs} ({definition}): {err}"))
        })?;
        let target = Proj::from_proj_string(WGS84_PROJ4)
            .map_err(|err| PipelineError::Reprojection(format!("cannot build WGS84 target: {err}")))?;
        Ok(Self {
            source,
            target,
            source_geographic: definition.contains("+proj=longlat")
                || definition.contains("+proj=latlong"),
        })
    }

    fn to_wgs84(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let mut point = if self.source_geographic {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        transform(&self.source, &self.target, &mut point).map_err(|err| {
            PipelineError::Reprojection(format!(
                "cannot reproject ({}, {}) to {}: {err}",
                coord.x,
                coord.y,
                Crs::wgs84()
            ))
        })?;
        Ok(Coord {
            x: point.0.to_degrees(),
            y: point.1.to_degrees(),
        })
    }
}

/// The proj4 definition of an EPSG code, or a raw `+proj=` string.
fn proj4_definition(crs: &Crs) -> Result<String> {
    match crs {
        Crs::Epsg(code) => {
            // Legacy Web Mercator aliases.
            let code = match *code {
                3785 | 900_913 | 102_100 | 102_113 => 3857,
                other => other,
            };
            u16::try_from(code)
                .ok()
                .and_then(crs_definitions::from_code)
                .map(|def| def.proj4.to_string())
                .ok_or_else(|| {
                    PipelineError::Reprojection(format!(
                        "no definition for EPSG:{code}; cannot reproject to {}",
                        Crs::wgs84()
                    ))
                })
        }
        Crs::Other(text) if text.trim_start().starts_with("+proj=") => Ok(text.trim().to_string()),
        Crs::Other(text) => Err(PipelineError::Reprojection(format!(
            "cannot reproject from non-EPSG CRS '{text}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Point, point};

    fn reproject_point(x: f64, y: f64, from: Crs) -> Point<f64> {
        let projected: Geometry<f64> = Point::new(x, y).into();
        match ProjReprojector::new().reproject(projected, &from).unwrap() {
            Geometry::Point(p) => p,
            other => panic!("expected a point, got {other:?}"),
        }
    }

    #[test]
    fn parses_common_crs_spellings() {
        assert_eq!(Crs::parse("EPSG:26918"), Crs::Epsg(26918));
        assert_eq!(Crs::parse("urn:ogc:def:crs:EPSG::3857"), Crs::Epsg(3857));
        assert_eq!(Crs::parse("urn:ogc:def:crs:EPSG:6.6:4326"), Crs::Epsg(4326));
        assert_eq!(Crs::parse("urn:ogc:def:crs:OGC:1.3:CRS84"), Crs::wgs84());
        assert_eq!(
            Crs::parse("LOCAL_CS[\"whatever\"]"),
            Crs::Other("LOCAL_CS[\"whatever\"]".into())
        );
    }

    #[test]
    fn web_mercator_inverse_matches_known_point() {
        let projected: Geometry<f64> =
            point!(x: -8_237_642.318_702_244, y: 4_968_191.930_188_206).into();
        let Geometry::Point(p) = ProjReprojector::new()
            .reproject(projected, &Crs::Epsg(3857))
            .unwrap()
        else {
            panic!("expected a point");
        };
        assert!((p.x() - -74.0).abs() < 1e-6, "lon {}", p.x());
        assert!((p.y() - 40.7).abs() < 1e-6, "lat {}", p.y());
    }

    #[test]
    fn utm_false_origin_maps_to_zone_central_meridian() {
        // Zone 18N false origin on the equator maps to (-75, 0).
        let p = reproject_point(500_000.0, 0.0, Crs::Epsg(26918));
        assert!((p.x() - -75.0).abs() < 1e-7, "lon {}", p.x());
        assert!(p.y().abs() < 1e-7, "lat {}", p.y());
    }

    #[test]
    fn utm_matches_reference_point_in_new_york() {
        // 40.7128 N, 74.0060 W in UTM 18N.
        let p = reproject_point(583_959.37, 4_507_350.99, Crs::Epsg(32618));
        assert!((p.x() - -74.0060).abs() < 1e-4, "lon {}", p.x());
        assert!((p.y() - 40.7128).abs() < 1e-4, "lat {}", p.y());
    }

    #[test]
    fn state_plane_long_island_feet_origin_maps_to_projection_origin() {
        // NAD83 / New York Long Island (ftUS): x_0 = 300000 m = 984250 ftUS,
        // origin at 40 10' N on the -74 meridian.
        let p = reproject_point(984_250.0, 0.0, Crs::Epsg(2263));
        assert!((p.x() - -74.0).abs() < 1e-6, "lon {}", p.x());
        assert!((p.y() - (40.0 + 10.0 / 60.0)).abs() < 1e-6, "lat {}", p.y());
    }

    #[test]
    fn legacy_web_mercator_alias_is_accepted() {
        let p = reproject_point(0.0, 0.0, Crs::Epsg(900_913));
        assert!(p.x().abs() < 1e-9 && p.y().abs() < 1e-9);
    }

    #[test]
    fn raw_proj_strings_are_accepted() {
        let crs = Crs::Other("+proj=utm +zone=18 +datum=WGS84 +units=m +no_defs".into());
        let p = reproject_point(500_000.0, 0.0, crs);
        assert!((p.x() - -75.0).abs() < 1e-7);
    }

    #[test]
    fn unknown_crs_is_a_reprojection_error() {
        let reprojector = ProjReprojector::new();
        for crs in [Crs::Epsg(1), Crs::Epsg(999_999), Crs::Other("custom".into())] {
            let geometry: Geometry<f64> = Point::new(0.0, 0.0).into();
            let err = reprojector.reproject(geometry, &crs).unwrap_err();
            assert!(matches!(err, PipelineError::Reprojection(_)), "{crs}: {err:?}");
        }
    }
}
