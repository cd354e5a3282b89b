//! Reconciling fresh input against the previous result table.

use hashbrown::HashMap;
use tracing::{debug, info};

use crate::models::{CompletionState, LocationRecord};

/// What the cache knows about one identity
enum CachedState {
    /// Coordinates and finest region code; reused verbatim
    Complete(LocationRecord),
    /// Coordinates to copy forward onto the fresh row
    Geocoded {
        latitude: Option<f64>,
        longitude: Option<f64>,
        address: Option<String>,
    },
    Unprocessed,
}

impl CachedState {
    fn of(record: LocationRecord) -> Self {
        match record.completion_state() {
            CompletionState::Complete => CachedState::Complete(record),
            CompletionState::GeocodedOnly => CachedState::Geocoded {
                latitude: record.latitude,
                longitude: record.longitude,
                address: record.address,
            },
            CompletionState::Unprocessed => CachedState::Unprocessed,
        }
    }
}

/// Fresh rows split by the work they still need; every row lands in exactly one set.
#[derive(Debug, Default)]
pub struct Reconciled {
    pub needs_full: Vec<LocationRecord>,
    pub needs_classification: Vec<LocationRecord>,
    pub already_complete: Vec<LocationRecord>,
}

impl Reconciled {
    pub fn len(&self) -> usize {
        self.needs_full.len() + self.needs_classification.len() + self.already_complete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition `fresh` using `cache`, matching on exact identity.
///
/// With `rebuild` or an empty cache every row needs full processing. When
/// the cache holds an identity more than once, the last row wins.
pub fn reconcile(fresh: Vec<LocationRecord>, cache: Vec<LocationRecord>, rebuild: bool) -> Reconciled {
    if rebuild || cache.is_empty() {
        if rebuild {
            info!("Rebuild requested: processing all {} locations", fresh.len());
        } else {
            info!("No cache: processing all {} locations", fresh.len());
        }
        return Reconciled {
            needs_full: fresh,
            ..Default::default()
        };
    }

    let known: HashMap<String, CachedState> = cache
        .into_iter()
        .map(|record| (record.name.clone(), CachedState::of(record)))
        .collect();

    let mut out = Reconciled::default();

    for mut record in fresh {
        match known.get(&record.name) {
            Some(CachedState::Complete(cached)) => {
                debug!("'{}' already complete", record.name);
                out.already_complete.push(cached.clone());
            }
            Some(CachedState::Geocoded {
                latitude,
                longitude,
                address,
            }) => {
                debug!("'{}' needs classification only", record.name);
                record.latitude = *latitude;
                record.longitude = *longitude;
                record.address = address.clone();
                out.needs_classification.push(record);
            }
            Some(CachedState::Unprocessed) | None => out.needs_full.push(record),
        }
    }

    info!(
        "Cache analyzed: {} complete, {} classification needed, {} full processing needed",
        out.already_complete.len(),
        out.needs_classification.len(),
        out.needs_full.len()
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RegionEntry, RegionLevel};

    fn geocoded(name: &str) -> LocationRecord {
        let mut r = LocationRecord::new(name);
        r.latitude = Some(-12.6);
        r.longitude = Some(131.4);
        r.address = Some("Adelaide River, Northern Territory, Australia".into());
        r
    }

    fn complete(name: &str) -> LocationRecord {
        let mut r = geocoded(name);
        r.regions.set(
            RegionLevel::Sa1,
            RegionEntry::new(Some("70201100101".into()), None),
        );
        r
    }

    fn names(records: &[LocationRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    fn fresh(names: &[&str]) -> Vec<LocationRecord> {
        names.iter().map(|n| LocationRecord::new(*n)).collect()
    }

    #[test]
    fn partitions_into_three_disjoint_sets() {
        let cache = vec![
            complete("A"),
            geocoded("B"),
            LocationRecord::new("C"),
            complete("Unrelated"),
        ];

        let out = reconcile(fresh(&["A", "B", "C", "D"]), cache, false);

        assert_eq!(names(&out.already_complete), vec!["A"]);
        assert_eq!(names(&out.needs_classification), vec!["B"]);
        assert_eq!(names(&out.needs_full), vec!["C", "D"]);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn classification_only_rows_get_cached_coordinates() {
        let mut fresh_row = LocationRecord::new("B");
        fresh_row.extra = vec![("Phone".into(), "555".into())];

        let out = reconcile(vec![fresh_row], vec![geocoded("B")], false);

        let row = &out.needs_classification[0];
        assert_eq!(row.latitude, Some(-12.6));
        assert_eq!(row.longitude, Some(131.4));
        assert!(row.address.is_some());
        // The fresh row is kept, not the cached one
        assert_eq!(row.extra.len(), 1);
    }

    #[test]
    fn complete_rows_are_carried_verbatim() {
        let mut cached = complete("A");
        cached.extra = vec![("Note".into(), "from cache".into())];

        let out = reconcile(fresh(&["A"]), vec![cached.clone()], false);

        assert_eq!(out.already_complete, vec![cached]);
    }

    #[test]
    fn rebuild_matches_empty_cache() {
        let rebuilt = reconcile(fresh(&["A", "B"]), vec![complete("A")], true);
        let uncached = reconcile(fresh(&["A", "B"]), Vec::new(), false);

        assert_eq!(names(&rebuilt.needs_full), names(&uncached.needs_full));
        assert_eq!(rebuilt.needs_full.len(), 2);
        assert!(rebuilt.needs_classification.is_empty());
        assert!(rebuilt.already_complete.is_empty());
        assert!(rebuilt.needs_full[0].latitude.is_none());
    }

    #[test]
    fn identity_match_is_exact() {
        let out = reconcile(fresh(&["a", "A "]), vec![complete("A")], false);
        assert_eq!(out.needs_full.len(), 2);
    }

    #[test]
    fn last_cached_duplicate_wins() {
        let out = reconcile(
            fresh(&["A"]),
            vec![complete("A"), geocoded("A")],
            false,
        );
        assert_eq!(out.needs_classification.len(), 1);
    }
}
