//! Location records flowing through the enrichment pipeline.

use serde::{Deserialize, Serialize};

use super::RegionHierarchy;

/// Address written when a name could not be resolved
pub const ADDRESS_NOT_FOUND: &str = "Not found";

/// Derived progress of a record through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    /// Coordinates and a finest-level region code
    Complete,
    /// Coordinates but no finest-level region code
    GeocodedOnly,
    Unprocessed,
}

/// One input name and everything learned about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Identity key: the name exactly as submitted for geocoding
    pub name: String,

    /// Unqualified name to show in the output in place of `name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    pub regions: RegionHierarchy,

    /// Input columns carried through untouched, in input order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, String)>,
}

impl LocationRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            latitude: None,
            longitude: None,
            address: None,
            regions: RegionHierarchy::default(),
            extra: Vec::new(),
        }
    }

    /// (lon, lat) when both coordinates are present and finite
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.longitude, self.latitude) {
            (Some(lon), Some(lat)) if lon.is_finite() && lat.is_finite() => Some((lon, lat)),
            _ => None,
        }
    }

    pub fn is_geocoded(&self) -> bool {
        self.coordinates().is_some()
    }

    pub fn completion_state(&self) -> CompletionState {
        match (self.is_geocoded(), self.regions.finest_code().is_some()) {
            (true, true) => CompletionState::Complete,
            (true, false) => CompletionState::GeocodedOnly,
            _ => CompletionState::Unprocessed,
        }
    }

    /// Name shown in the output table
    pub fn output_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RegionEntry, RegionLevel};

    #[test]
    fn completion_state_is_derived() {
        let mut record = LocationRecord::new("Batchelor CHC, NT, Australia");
        assert_eq!(record.completion_state(), CompletionState::Unprocessed);

        record.latitude = Some(-13.05);
        assert_eq!(record.completion_state(), CompletionState::Unprocessed);

        record.longitude = Some(131.03);
        assert_eq!(record.completion_state(), CompletionState::GeocodedOnly);

        record
            .regions
            .set(RegionLevel::Sa1, RegionEntry::new(Some("70201".into()), None));
        assert_eq!(record.completion_state(), CompletionState::Complete);

        record.latitude = None;
        assert_eq!(record.completion_state(), CompletionState::Unprocessed);
    }

    #[test]
    fn nan_coordinates_are_not_geocoded() {
        let mut record = LocationRecord::new("x");
        record.latitude = Some(f64::NAN);
        record.longitude = Some(131.0);
        assert!(!record.is_geocoded());
    }

    #[test]
    fn output_name_prefers_display_name() {
        let mut record = LocationRecord::new("Areyonga, NT, Australia");
        assert_eq!(record.output_name(), "Areyonga, NT, Australia");
        record.display_name = Some("Areyonga".into());
        assert_eq!(record.output_name(), "Areyonga");
    }
}
