//! In-memory pass store for testing.

use std::collections::BTreeMap;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::types::{ElementSet, ElementSetId, InputSnapshot, Pass, Station, StationId};
use super::PassStore;

/// Error type for in-memory store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InMemoryStoreError {
    /// Store is marked unreachable.
    #[error("Store unavailable")]
    Unavailable,
    /// Pass references a station that does not exist.
    #[error("Pass {index} references unknown station {station}")]
    UnknownStation {
        /// Position of the record in the batch.
        index: usize,
        /// Missing station.
        station: StationId,
    },
    /// Pass references an element set that does not exist.
    #[error("Pass {index} references unknown element set {element_set}")]
    UnknownElementSet {
        /// Position of the record in the batch.
        index: usize,
        /// Missing element set.
        element_set: ElementSetId,
    },
    /// Injected write failure.
    #[error("Injected write failure at record {0}")]
    InjectedFailure(usize),
}

#[derive(Debug, Default)]
struct Inputs {
    stations: BTreeMap<StationId, Station>,
    element_sets: BTreeMap<ElementSetId, ElementSet>,
}

/// In-memory pass store for testing.
///
/// Uses BTreeMap for deterministic iteration order. Stations and element
/// sets live behind one lock so `load_inputs` sees a consistent snapshot.
/// Inserts stage the whole batch before committing any of it.
#[derive(Debug, Default)]
pub struct InMemoryPassStore {
    inputs: RwLock<Inputs>,
    passes: Mutex<Vec<Pass>>,
    unavailable: RwLock<bool>,
    fail_insert_at: Mutex<Option<usize>>,
}

impl InMemoryPassStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a station.
    pub fn add_station(&self, station: Station) {
        self.inputs.write().stations.insert(station.id, station);
    }

    /// Remove a station.
    pub fn remove_station(&self, id: StationId) -> Option<Station> {
        self.inputs.write().stations.remove(&id)
    }

    /// Add or replace an element set.
    pub fn add_element_set(&self, element_set: ElementSet) {
        self.inputs.write().element_sets.insert(element_set.id, element_set);
    }

    /// Remove an element set.
    pub fn remove_element_set(&self, id: ElementSetId) -> Option<ElementSet> {
        self.inputs.write().element_sets.remove(&id)
    }

    /// Make every call fail as if the connection were lost.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }

    /// Fail the next insert when it reaches record `index` (0-based).
    pub fn fail_next_insert_at(&self, index: usize) {
        *self.fail_insert_at.lock() = Some(index);
    }

    /// Number of persisted passes.
    pub fn num_passes(&self) -> usize {
        self.passes.lock().len()
    }

    fn check_available(&self) -> Result<(), InMemoryStoreError> {
        if *self.unavailable.read() {
            Err(InMemoryStoreError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PassStore for InMemoryPassStore {
    type Error = InMemoryStoreError;

    async fn list_stations(&self) -> Result<Vec<Station>, Self::Error> {
        self.check_available()?;
        Ok(self.inputs.read().stations.values().cloned().collect())
    }

    async fn list_element_sets(&self) -> Result<Vec<ElementSet>, Self::Error> {
        self.check_available()?;
        Ok(self.inputs.read().element_sets.values().cloned().collect())
    }

    async fn list_passes(&self) -> Result<Vec<Pass>, Self::Error> {
        self.check_available()?;
        Ok(self.passes.lock().clone())
    }

    async fn insert_passes(&self, passes: &[Pass]) -> Result<usize, Self::Error> {
        self.check_available()?;
        let fail_at = self.fail_insert_at.lock().take();

        // Stage every record before touching the committed set.
        let mut staged = Vec::with_capacity(passes.len());
        {
            let inputs = self.inputs.read();
            for (index, pass) in passes.iter().enumerate() {
                if fail_at == Some(index) {
                    return Err(InMemoryStoreError::InjectedFailure(index));
                }
                if !inputs.stations.contains_key(&pass.station_id) {
                    return Err(InMemoryStoreError::UnknownStation {
                        index,
                        station: pass.station_id,
                    });
                }
                if !inputs.element_sets.contains_key(&pass.element_set_id) {
                    return Err(InMemoryStoreError::UnknownElementSet {
                        index,
                        element_set: pass.element_set_id,
                    });
                }
                staged.push(pass.clone());
            }
        }

        let written = staged.len();
        self.passes.lock().extend(staged);
        Ok(written)
    }

    async fn load_inputs(&self) -> Result<InputSnapshot, Self::Error> {
        self.check_available()?;
        let inputs = self.inputs.read();
        Ok(InputSnapshot::new(
            inputs.stations.values().cloned().collect(),
            inputs.element_sets.values().cloned().collect(),
        ))
    }
}
