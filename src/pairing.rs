//! Validated pairing of rise and set events.
//!
//! Engines report a flat, time-ordered list of rise / culmination / set
//! events per (station, element set). Culminations are dropped and the i-th
//! rise is paired with the i-th set. Unequal counts are an error: a pass cut
//! by the window boundary must never be truncated into a mismatched record.

use chrono::{DateTime, Utc};

use crate::types::{PassEvent, PassEventKind, PassWindow};

/// Error raised when events cannot be paired into windows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairingError {
    /// Different number of rise and set events.
    #[error("Rise/set count mismatch: {rises} rises, {sets} sets")]
    CountMismatch {
        /// Number of rise events.
        rises: usize,
        /// Number of set events.
        sets: usize,
    },
    /// The i-th rise comes after the i-th set.
    #[error("Pass {index} sets at {set} before it rises at {rise}")]
    OutOfOrder {
        /// Position of the offending pair.
        index: usize,
        /// Rise instant.
        rise: DateTime<Utc>,
        /// Set instant.
        set: DateTime<Utc>,
    },
}

/// Pair rise and set events by position.
///
/// Culmination events are ignored. Returns one [`PassWindow`] per rise.
pub fn pair_events(events: &[PassEvent]) -> Result<Vec<PassWindow>, PairingError> {
    let mut rises = Vec::new();
    let mut sets = Vec::new();

    for event in events {
        match event.kind {
            PassEventKind::Rise => rises.push(event.at),
            PassEventKind::Culmination => continue,
            PassEventKind::Set => sets.push(event.at),
        }
    }

    if rises.len() != sets.len() {
        return Err(PairingError::CountMismatch {
            rises: rises.len(),
            sets: sets.len(),
        });
    }

    rises
        .into_iter()
        .zip(sets)
        .enumerate()
        .map(|(index, (rise, set))| {
            if rise > set {
                Err(PairingError::OutOfOrder { index, rise, set })
            } else {
                Ok(PassWindow { aos: rise, los: set })
            }
        })
        .collect()
}
