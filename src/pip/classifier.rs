//! Region classification by point-in-polygon join.

use std::path::Path;

use hashbrown::HashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{BoundaryFeature, BoundaryFileLoader, BoundaryIndex, Crs, LayerLoader};
use crate::config::{BoundaryPaths, Settings};
use crate::error::{Error, Result};
use crate::models::{Hierarchy, LocationRecord, RegionEntry, RegionHierarchy, RegionLevel};

/// Result of joining one hierarchy's boundary layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub hierarchy: Hierarchy,
    /// Points that fell in a polygon; `None` when the layer was unusable
    pub matched: Option<usize>,
}

/// Assigns points to statistical regions, one boundary layer per hierarchy.
pub struct RegionClassifier<L = BoundaryFileLoader> {
    loader: L,
    points_crs: Crs,
    layers: BoundaryPaths,
}

impl RegionClassifier<BoundaryFileLoader> {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            BoundaryFileLoader,
            settings.default_crs.parse()?,
            settings.boundaries.clone(),
        ))
    }
}

impl<L: LayerLoader> RegionClassifier<L> {
    pub fn new(loader: L, points_crs: Crs, layers: BoundaryPaths) -> Self {
        Self {
            loader,
            points_crs,
            layers,
        }
    }

    /// True when at least one hierarchy's boundary file exists
    pub fn is_available(&self) -> bool {
        self.layers.any_join_layer_present()
    }

    /// Classify every record in place.
    ///
    /// Region columns are reset first. Records without both coordinates are
    /// never joined. Each hierarchy degrades on its own: a missing or
    /// unreadable layer leaves only that hierarchy's columns absent.
    pub fn classify(&self, records: &mut [LocationRecord]) -> Vec<JoinOutcome> {
        for record in records.iter_mut() {
            record.regions = RegionHierarchy::default();
        }

        let classifiable: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_geocoded())
            .map(|(i, _)| i)
            .collect();

        info!(
            "Classifying {} of {} locations",
            classifiable.len(),
            records.len()
        );

        Hierarchy::all()
            .iter()
            .map(|hierarchy| {
                let matched = self
                    .layers
                    .join_layer(*hierarchy)
                    .and_then(|path| self.load_index(*hierarchy, path))
                    .map(|index| join(*hierarchy, &index, records, &classifiable));
                if matched.is_none() {
                    warn!(
                        "{} regions unavailable; leaving those columns empty",
                        hierarchy.label()
                    );
                }
                JoinOutcome {
                    hierarchy: *hierarchy,
                    matched,
                }
            })
            .collect()
    }

    fn load_index(&self, hierarchy: Hierarchy, path: &Path) -> Option<BoundaryIndex> {
        let columns = hierarchy.columns();

        let layer = match self
            .loader
            .load(path, &columns)
            .and_then(|layer| layer.to_crs(self.points_crs))
        {
            Ok(layer) => layer,
            Err(Error::LayerNotFound(p)) => {
                warn!("Boundary file not found: {}", p.display());
                return None;
            }
            Err(err) => {
                warn!(
                    "Failed to prepare {} boundaries from {}: {}",
                    hierarchy.label(),
                    path.display(),
                    err
                );
                return None;
            }
        };

        let derivable = layer
            .features
            .iter()
            .any(|f| columns.iter().any(|c| f.attributes.contains_key(*c)));
        if !derivable {
            warn!(
                "{} boundary layer has none of the columns {:?}",
                hierarchy.label(),
                columns
            );
            return None;
        }

        Some(BoundaryIndex::build(layer.features))
    }
}

/// Left join of the classifiable rows against one hierarchy's index.
fn join(
    hierarchy: Hierarchy,
    index: &BoundaryIndex,
    records: &mut [LocationRecord],
    classifiable: &[usize],
) -> usize {
    let mut matched = 0;

    for &i in classifiable {
        let record = &mut records[i];
        let Some((lon, lat)) = record.coordinates() else {
            continue;
        };
        let Some(feature) = index.lookup(lon, lat) else {
            debug!("No {} region contains '{}'", hierarchy.label(), record.name);
            continue;
        };

        for level in hierarchy.levels() {
            record.regions.set(*level, entry_for(feature, *level));
        }

        if !record.regions.is_consistent(hierarchy) {
            warn!(
                "Incomplete {} hierarchy for '{}'; marking unclassified",
                hierarchy.label(),
                record.name
            );
            record.regions.clear(hierarchy);
            continue;
        }
        matched += 1;
    }

    info!(
        "{}: {}/{} points matched a region",
        hierarchy.label(),
        matched,
        classifiable.len()
    );
    matched
}

fn entry_for(feature: &BoundaryFeature, level: RegionLevel) -> Option<RegionEntry> {
    let code = feature.attribute(level.code_column()).map(str::to_string);
    let name = level
        .name_column()
        .and_then(|c| feature.attribute(c))
        .map(str::to_string);
    RegionEntry::new(code, name)
}

/// Counts and rates over a classified table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationSummary {
    pub total_locations: usize,
    pub geocoded_successfully: usize,
    /// Rows with at least one region column present
    pub classified_successfully: usize,
    /// Relative to the total
    pub geocoding_success_rate: f64,
    /// Relative to the geocoded count
    pub classification_success_rate: f64,
    /// State name frequencies, most common first
    pub states_distribution: Vec<(String, usize)>,
}

impl ClassificationSummary {
    pub fn summarize(records: &[LocationRecord]) -> Self {
        let total = records.len();
        let geocoded = records.iter().filter(|r| r.is_geocoded()).count();
        let classified = records.iter().filter(|r| !r.regions.is_empty()).count();

        let mut states: HashMap<&str, usize> = HashMap::new();
        for name in records
            .iter()
            .filter_map(|r| r.regions.name(RegionLevel::State))
        {
            *states.entry(name).or_default() += 1;
        }
        let mut states_distribution: Vec<(String, usize)> = states
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect();
        states_distribution.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let rate = |n: usize, d: usize| if d > 0 { n as f64 / d as f64 } else { 0.0 };

        Self {
            total_locations: total,
            geocoded_successfully: geocoded,
            classified_successfully: classified,
            geocoding_success_rate: rate(geocoded, total),
            classification_success_rate: rate(classified, geocoded),
            states_distribution,
        }
    }
}
