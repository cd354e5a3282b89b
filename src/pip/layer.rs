//! Boundary layer loading and attribute column normalization.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Crs, GeoPackageLoader, ShapefileLoader};
use crate::error::{Error, Result};

/// A single boundary polygon with its attributes
#[derive(Debug, Clone)]
pub struct BoundaryFeature {
    pub attributes: HashMap<String, String>,
    pub geometry: MultiPolygon<f64>,
}

impl BoundaryFeature {
    pub fn attribute(&self, column: &str) -> Option<&str> {
        self.attributes.get(column).map(String::as_str)
    }
}

/// Attributed polygons in their native reference system
#[derive(Debug, Clone)]
pub struct BoundaryLayer {
    pub crs: Crs,
    pub features: Vec<BoundaryFeature>,
}

impl BoundaryLayer {
    /// Reproject every feature into `target`; a no-op when already there.
    pub fn to_crs(self, target: Crs) -> Result<Self> {
        if self.crs == target {
            return Ok(self);
        }
        info!("Reprojecting boundaries from {} to {}", self.crs, target);
        let features = self
            .features
            .into_iter()
            .map(|f| {
                Ok(BoundaryFeature {
                    geometry: self.crs.reproject(target, &f.geometry)?,
                    attributes: f.attributes,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            crs: target,
            features,
        })
    }
}

/// Reads a boundary file.
///
/// Implementations return features with attributes renamed to the requested
/// logical columns (see [`select_columns`]), or [`Error::LayerNotFound`] when
/// the path does not exist.
pub trait LayerLoader {
    fn load(&self, path: &Path, columns: &[&str]) -> Result<BoundaryLayer>;
}

/// Ways a source file may spell a logical column, in priority order.
#[derive(Debug, Clone, Copy)]
enum CandidateRule {
    Exact,
    /// `SA2_CODE_2021`
    LongEdition(&'static str),
    /// `SA2_CODE21`
    ShortEdition(&'static str),
    /// `GCC_CODE`
    Abbreviated,
    AbbreviatedLongEdition(&'static str),
    AbbreviatedShortEdition(&'static str),
}

const CANDIDATE_RULES: &[CandidateRule] = &[
    CandidateRule::Exact,
    CandidateRule::LongEdition("2021"),
    CandidateRule::LongEdition("2016"),
    CandidateRule::ShortEdition("21"),
    CandidateRule::ShortEdition("16"),
    CandidateRule::Abbreviated,
    CandidateRule::AbbreviatedLongEdition("2021"),
    CandidateRule::AbbreviatedLongEdition("2016"),
    CandidateRule::AbbreviatedShortEdition("21"),
    CandidateRule::AbbreviatedShortEdition("16"),
];

/// Level prefixes that shapefile editions abbreviate
const PREFIX_ABBREVIATIONS: &[(&str, &str)] = &[("GCCSA", "GCC"), ("STATE", "STE")];

impl CandidateRule {
    fn apply(&self, logical: &str) -> Option<String> {
        match self {
            CandidateRule::Exact => Some(logical.to_string()),
            CandidateRule::LongEdition(ed) => Some(format!("{}_{}", logical, ed)),
            CandidateRule::ShortEdition(ed) => Some(format!("{}{}", logical, ed)),
            CandidateRule::Abbreviated => abbreviate(logical),
            CandidateRule::AbbreviatedLongEdition(ed) => {
                abbreviate(logical).map(|a| format!("{}_{}", a, ed))
            }
            CandidateRule::AbbreviatedShortEdition(ed) => {
                abbreviate(logical).map(|a| format!("{}{}", a, ed))
            }
        }
    }
}

fn abbreviate(logical: &str) -> Option<String> {
    let (prefix, rest) = logical.split_once('_')?;
    PREFIX_ABBREVIATIONS
        .iter()
        .find(|(long, _)| *long == prefix)
        .map(|(_, short)| format!("{}_{}", short, rest))
}

/// Candidate source column names for a logical column, highest priority first
pub fn candidate_names(logical: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in CANDIDATE_RULES.iter().filter_map(|r| r.apply(logical)) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Map each logical column to the first candidate present in `available`.
///
/// Exact spellings are tried first; a second pass ignores ASCII case, since
/// GeoPackage editions publish lower-case column names.
pub fn resolve_columns<'a>(
    available: impl IntoIterator<Item = &'a str> + Clone,
    logical: &[&str],
) -> Vec<(String, String)> {
    logical
        .iter()
        .filter_map(|col| {
            let candidates = candidate_names(col);
            let exact = candidates
                .iter()
                .find(|c| available.clone().into_iter().any(|a| a == c.as_str()))
                .cloned();
            let source = exact.or_else(|| {
                candidates.iter().find_map(|c| {
                    available
                        .clone()
                        .into_iter()
                        .find(|a| a.eq_ignore_ascii_case(c))
                        .map(str::to_string)
                })
            })?;
            Some((col.to_string(), source))
        })
        .collect()
}

/// Keep only the requested logical columns, renamed from their source names.
///
/// When none of them can be found the features are returned untouched, so
/// callers see raw attributes and no logical column.
pub fn select_columns(mut features: Vec<BoundaryFeature>, logical: &[&str]) -> Vec<BoundaryFeature> {
    let mut available: Vec<&str> = Vec::new();
    for feature in &features {
        for key in feature.attributes.keys() {
            if !available.contains(&key.as_str()) {
                available.push(key.as_str());
            }
        }
    }

    let mapping = resolve_columns(available.iter().copied(), logical);

    if mapping.is_empty() {
        warn!(
            "None of the requested columns found. Requested: {:?}, available: {:?}",
            logical, available
        );
        return features;
    }

    debug!("Column mapping: {:?}", mapping);

    for feature in &mut features {
        let mut renamed = HashMap::with_capacity(mapping.len());
        for (logical, source) in &mapping {
            if let Some(value) = feature.attributes.remove(source) {
                renamed.insert(logical.clone(), value);
            }
        }
        feature.attributes = renamed;
    }
    features
}

/// Picks a loader from the file extension: `.gpkg`, `.shp`, or
/// `.geojson`/`.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundaryFileLoader;

impl LayerLoader for BoundaryFileLoader {
    fn load(&self, path: &Path, columns: &[&str]) -> Result<BoundaryLayer> {
        if !path.exists() {
            return Err(Error::LayerNotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("gpkg") => GeoPackageLoader.load(path, columns),
            Some("shp") => ShapefileLoader.load(path, columns),
            Some("geojson" | "json") => GeoJsonLoader.load(path, columns),
            _ => Err(Error::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Loads GeoJSON FeatureCollections.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoJsonLoader;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    crs: Option<NamedCrs>,
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct NamedCrs {
    properties: NamedCrsProperties,
}

#[derive(Debug, Deserialize)]
struct NamedCrsProperties {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<serde_json::Map<String, Value>>,
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Unsupported,
}

impl LayerLoader for GeoJsonLoader {
    fn load(&self, path: &Path, columns: &[&str]) -> Result<BoundaryLayer> {
        if !path.exists() {
            return Err(Error::LayerNotFound(path.to_path_buf()));
        }

        info!("Loading spatial layer: {}", path.display());

        let content = fs::read_to_string(path)?;
        let collection: FeatureCollection = serde_json::from_str(&content)?;

        let crs = match collection.crs {
            Some(named) => named.properties.name.parse()?,
            None => Crs::WGS84,
        };

        let total = collection.features.len();
        let features: Vec<BoundaryFeature> = collection
            .features
            .into_iter()
            .filter_map(|f| {
                let geometry = to_multi_polygon(f.geometry?)?;
                let attributes = f
                    .properties
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|(k, v)| attribute_string(v).map(|s| (k, s)))
                    .collect();
                Some(BoundaryFeature {
                    attributes,
                    geometry,
                })
            })
            .collect();

        if features.len() < total {
            debug!(
                "Skipped {} features without polygon geometry",
                total - features.len()
            );
        }

        let features = select_columns(features, columns);
        info!("Loaded {} features ({})", features.len(), crs);

        Ok(BoundaryLayer { crs, features })
    }
}

/// Integral values print without a fractional part, so codes such as `7`
/// survive numeric storage.
pub(super) fn number_string(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn attribute_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn ring(points: Vec<Vec<f64>>) -> LineString<f64> {
    points
        .into_iter()
        .filter(|p| p.len() >= 2)
        .map(|p| Coord { x: p[0], y: p[1] })
        .collect()
}

fn polygon(rings: Vec<Vec<Vec<f64>>>) -> Option<Polygon<f64>> {
    let mut rings = rings.into_iter();
    let exterior = ring(rings.next()?);
    if exterior.0.len() < 4 {
        return None;
    }
    Some(Polygon::new(exterior, rings.map(ring).collect()))
}

fn to_multi_polygon(geometry: Geometry) -> Option<MultiPolygon<f64>> {
    let polygons: Vec<Polygon<f64>> = match geometry {
        Geometry::Polygon { coordinates } => polygon(coordinates).into_iter().collect(),
        Geometry::MultiPolygon { coordinates } => {
            coordinates.into_iter().filter_map(polygon).collect()
        }
        Geometry::Unsupported => return None,
    };
    if polygons.is_empty() {
        None
    } else {
        Some(MultiPolygon::new(polygons))
    }
}
