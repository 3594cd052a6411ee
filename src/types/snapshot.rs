//! Input snapshot taken at the start of a recompute cycle.
//!
//! ## Fingerprint
//!
//! The fingerprint is an xxh64 hash over the canonical JSON encoding of the
//! stations and element sets, sorted by id. Two cycles that saw the same
//! inputs log the same fingerprint regardless of store row order.

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

use super::element_set::ElementSet;
use super::station::Station;

/// Stations and element sets read together at cycle start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSnapshot {
    stations: Vec<Station>,
    element_sets: Vec<ElementSet>,
}

#[derive(Serialize)]
struct CanonicalInputs<'a> {
    stations: &'a [Station],
    element_sets: &'a [ElementSet],
}

impl InputSnapshot {
    /// Build a snapshot, ordering both lists by id.
    pub fn new(mut stations: Vec<Station>, mut element_sets: Vec<ElementSet>) -> Self {
        stations.sort_by_key(|s| s.id);
        element_sets.sort_by_key(|e| e.id);
        Self { stations, element_sets }
    }

    /// Stations, ordered by id.
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Element sets, ordered by id.
    pub fn element_sets(&self) -> &[ElementSet] {
        &self.element_sets
    }

    /// Number of (station, element set) pairs a cycle will evaluate.
    pub fn pair_count(&self) -> usize {
        self.stations.len() * self.element_sets.len()
    }

    /// True when there is nothing to compute.
    pub fn is_empty(&self) -> bool {
        self.pair_count() == 0
    }

    /// Deterministic fingerprint of the inputs as a 16-digit hex string.
    pub fn fingerprint(&self) -> String {
        let canonical = CanonicalInputs {
            stations: &self.stations,
            element_sets: &self.element_sets,
        };
        // Plain data with no maps; serde_json only fails on non-string map keys.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        format!("{:016x}", xxh64(&bytes, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ElementSetId, StationId};

    fn station(id: i64) -> Station {
        Station::new(StationId::new(id), format!("stn-{id}"), 10.0, 20.0, 0.0, 5.0)
    }

    fn element_set(id: i64) -> ElementSet {
        ElementSet::new(ElementSetId::new(id), format!("sat-{id}"), "1", "2")
    }

    #[test]
    fn test_fingerprint_ignores_row_order() {
        let a = InputSnapshot::new(vec![station(2), station(1)], vec![element_set(7), element_set(3)]);
        let b = InputSnapshot::new(vec![station(1), station(2)], vec![element_set(3), element_set(7)]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.stations()[0].id, StationId::new(1));
        assert_eq!(a.fingerprint().len(), 16);
    }

    #[test]
    fn test_fingerprint_changes_with_inputs() {
        let a = InputSnapshot::new(vec![station(1)], vec![element_set(3)]);
        let mut changed = element_set(3);
        changed.line2 = "2 updated".to_string();
        let b = InputSnapshot::new(vec![station(1)], vec![changed]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_pair_count() {
        let snapshot = InputSnapshot::new(vec![station(1), station(2)], vec![element_set(3)]);
        assert_eq!(snapshot.pair_count(), 2);
        assert!(!snapshot.is_empty());
        assert!(InputSnapshot::new(vec![station(1)], vec![]).is_empty());
    }
}
