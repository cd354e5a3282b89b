//! Data-quality gate between geocoding and classification.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::models::LocationRecord;

/// Rough bounding box of mainland Australia and Tasmania
const LAT_RANGE: (f64, f64) = (-44.0, -10.0);
const LON_RANGE: (f64, f64) = (113.0, 154.0);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub total: usize,
    pub geocoded: usize,
    pub success_rate: f64,
    pub passed: bool,
    /// Names whose coordinates fall outside Australia
    pub out_of_bounds: Vec<String>,
}

/// Check the geocoding success rate and coordinate plausibility.
///
/// Never blocks the run; a failed report is surfaced as a warning.
pub fn validate_geocoded(records: &[LocationRecord], min_success_rate: f64) -> ValidationReport {
    let total = records.len();
    if total == 0 {
        error!("No locations to validate");
        return ValidationReport {
            total,
            geocoded: 0,
            success_rate: 0.0,
            passed: false,
            out_of_bounds: Vec::new(),
        };
    }

    let geocoded: Vec<(&LocationRecord, (f64, f64))> = records
        .iter()
        .filter_map(|r| r.coordinates().map(|c| (r, c)))
        .collect();
    let success_rate = geocoded.len() as f64 / total as f64;

    info!(
        "Geocoding success rate: {:.1}% ({}/{})",
        success_rate * 100.0,
        geocoded.len(),
        total
    );

    let passed = success_rate >= min_success_rate;
    if !passed {
        warn!(
            "Geocoding success rate {:.1}% is below minimum {:.1}%",
            success_rate * 100.0,
            min_success_rate * 100.0
        );
    }

    let outside: Vec<(&LocationRecord, (f64, f64))> = geocoded
        .iter()
        .copied()
        .filter(|(_, (lon, lat))| {
            !(LAT_RANGE.0..=LAT_RANGE.1).contains(lat) || !(LON_RANGE.0..=LON_RANGE.1).contains(lon)
        })
        .collect();

    if !outside.is_empty() {
        warn!(
            "Found {} coordinates outside Australia bounds",
            outside.len()
        );
        for (record, (lon, lat)) in &outside {
            warn!("  {}: ({:.4}, {:.4})", record.name, lat, lon);
        }
    }

    ValidationReport {
        total,
        geocoded: geocoded.len(),
        success_rate,
        passed,
        out_of_bounds: outside.iter().map(|(r, _)| r.name.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(name: &str, lat: f64, lon: f64) -> LocationRecord {
        let mut r = LocationRecord::new(name);
        r.latitude = Some(lat);
        r.longitude = Some(lon);
        r
    }

    #[test]
    fn empty_set_fails() {
        let report = validate_geocoded(&[], 0.8);
        assert!(!report.passed);
        assert_eq!(report.total, 0);
    }

    #[test]
    fn rate_below_minimum_fails_without_blocking() {
        let records = vec![
            at("Darwin", -12.46, 130.84),
            LocationRecord::new("Nowhere"),
        ];
        let report = validate_geocoded(&records, 0.8);
        assert!(!report.passed);
        assert_eq!(report.geocoded, 1);
        assert!((report.success_rate - 0.5).abs() < 1e-9);

        assert!(validate_geocoded(&records, 0.5).passed);
    }

    #[test]
    fn out_of_bounds_points_are_listed_but_pass() {
        let records = vec![at("Darwin", -12.46, 130.84), at("Auckland", -36.85, 174.76)];
        let report = validate_geocoded(&records, 0.8);
        assert!(report.passed);
        assert_eq!(report.out_of_bounds, vec!["Auckland".to_string()]);
    }
}
