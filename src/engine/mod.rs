//! Ephemeris engines.
//!
//! The scheduler does not predict orbits itself. It asks an engine for the
//! rise / culmination / set events of one object over one station and for
//! the look angle at a given instant.

pub mod scripted;

#[cfg(feature = "sgp4")]
pub mod sgp4_engine;

use chrono::{DateTime, Duration, Utc};

use crate::types::{ElementSet, ElementSetId, LookAngle, PassEvent, Station, StationId};

/// Error type for engine calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Element set could not be parsed or initialised.
    #[error("Invalid element set {element_set}: {reason}")]
    InvalidElements {
        /// Offending element set.
        element_set: ElementSetId,
        /// Parser or initialiser message.
        reason: String,
    },
    /// Propagation failed for a pair.
    #[error("Propagation failed for station {station}, element set {element_set}: {reason}")]
    Propagation {
        /// Station being evaluated.
        station: StationId,
        /// Element set being evaluated.
        element_set: ElementSetId,
        /// Propagator message.
        reason: String,
    },
}

/// Trait for ephemeris engines.
///
/// Implementations are synchronous and CPU-bound; the worker calls them from
/// a blocking task. Events must be returned in time order.
pub trait EphemerisEngine: Send + Sync {
    /// Events of the passes rising in `[start, start + horizon)` for one
    /// pair, in time order.
    fn events(
        &self,
        station: &Station,
        element_set: &ElementSet,
        start: DateTime<Utc>,
        horizon: Duration,
    ) -> Result<Vec<PassEvent>, EngineError>;

    /// Look angle of the object from the station at `at`.
    fn look_angle(
        &self,
        station: &Station,
        element_set: &ElementSet,
        at: DateTime<Utc>,
    ) -> Result<LookAngle, EngineError>;
}

pub use scripted::{ScriptedEngine, ScriptedPass};

#[cfg(feature = "sgp4")]
pub use sgp4_engine::Sgp4Engine;
