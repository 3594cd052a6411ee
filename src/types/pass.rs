//! Pass and pass-event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::element_set::{ElementSet, ElementSetId};
use super::station::{Station, StationId};

/// Kind of event reported by an ephemeris engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassEventKind {
    /// Object rises above the station's minimum elevation.
    Rise,
    /// Object reaches its highest elevation for the pass.
    Culmination,
    /// Object sets below the station's minimum elevation.
    Set,
}

impl fmt::Display for PassEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rise => write!(f, "rise"),
            Self::Culmination => write!(f, "culmination"),
            Self::Set => write!(f, "set"),
        }
    }
}

/// A single timed event for one (station, element set) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassEvent {
    /// What happened.
    pub kind: PassEventKind,
    /// When it happened (UTC).
    pub at: DateTime<Utc>,
}

impl PassEvent {
    /// Create a rise event.
    pub fn rise(at: DateTime<Utc>) -> Self {
        Self { kind: PassEventKind::Rise, at }
    }

    /// Create a culmination event.
    pub fn culmination(at: DateTime<Utc>) -> Self {
        Self { kind: PassEventKind::Culmination, at }
    }

    /// Create a set event.
    pub fn set(at: DateTime<Utc>) -> Self {
        Self { kind: PassEventKind::Set, at }
    }
}

/// Azimuth and elevation of an object as seen from a station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookAngle {
    /// Azimuth in degrees, normalised to [0, 360).
    pub azimuth_deg: f64,
    /// Elevation in degrees above the local horizon.
    pub elevation_deg: f64,
}

impl LookAngle {
    /// Create a look angle, normalising the azimuth into [0, 360).
    pub fn new(azimuth_deg: f64, elevation_deg: f64) -> Self {
        let mut azimuth_deg = azimuth_deg.rem_euclid(360.0);
        // rem_euclid can round up to exactly 360.0 for tiny negative inputs
        if azimuth_deg >= 360.0 {
            azimuth_deg = 0.0;
        }
        Self { azimuth_deg, elevation_deg }
    }
}

/// A validated rise/set pair before the look angle is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassWindow {
    /// Acquisition of signal.
    pub aos: DateTime<Utc>,
    /// Loss of signal.
    pub los: DateTime<Utc>,
}

impl PassWindow {
    /// Duration of the window in whole seconds.
    pub fn duration_secs(&self) -> i64 {
        (self.los - self.aos).num_seconds()
    }
}

/// A predicted overpass, as persisted.
///
/// Passes carry the station and object names alongside their ids so
/// downstream readers do not need to join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pass {
    /// Station the pass is visible from.
    pub station_id: StationId,
    /// Station name at computation time.
    pub station_name: String,
    /// Element set the pass was predicted from.
    pub element_set_id: ElementSetId,
    /// Object name at computation time.
    pub object_name: String,
    /// Azimuth at acquisition, degrees in [0, 360).
    pub azimuth_deg: f64,
    /// Elevation at acquisition, degrees.
    pub elevation_deg: f64,
    /// Acquisition of signal (UTC).
    pub aos: DateTime<Utc>,
    /// Loss of signal (UTC).
    pub los: DateTime<Utc>,
    /// Initial scheduling disposition.
    pub scheduled: bool,
}

impl Pass {
    /// Build a pass from its parts.
    pub fn new(
        station: &Station,
        element_set: &ElementSet,
        window: PassWindow,
        look: LookAngle,
        scheduled: bool,
    ) -> Self {
        Self {
            station_id: station.id,
            station_name: station.name.clone(),
            element_set_id: element_set.id,
            object_name: element_set.object_name.clone(),
            azimuth_deg: look.azimuth_deg,
            elevation_deg: look.elevation_deg,
            aos: window.aos,
            los: window.los,
            scheduled,
        }
    }

    /// Duration of the pass in whole seconds.
    pub fn duration_secs(&self) -> i64 {
        (self.los - self.aos).num_seconds()
    }

    /// Check the record invariants against the station it belongs to.
    ///
    /// Elevation is compared with a small tolerance because engines report
    /// the crossing instant, where the true elevation equals the minimum.
    pub fn validate(&self, station: &Station) -> Result<(), PassValidationError> {
        if self.station_id != station.id {
            return Err(PassValidationError::StationMismatch {
                expected: station.id,
                actual: self.station_id,
            });
        }
        if !(0.0..360.0).contains(&self.azimuth_deg) {
            return Err(PassValidationError::AzimuthOutOfRange(self.azimuth_deg));
        }
        if !self.elevation_deg.is_finite()
            || self.elevation_deg + ELEVATION_TOLERANCE_DEG < station.min_elevation_deg
        {
            return Err(PassValidationError::BelowMinimumElevation {
                elevation_deg: self.elevation_deg,
                min_elevation_deg: station.min_elevation_deg,
            });
        }
        if self.aos > self.los {
            return Err(PassValidationError::InvertedWindow {
                aos: self.aos,
                los: self.los,
            });
        }
        Ok(())
    }
}

/// Tolerance applied when checking acquisition elevation.
pub const ELEVATION_TOLERANCE_DEG: f64 = 0.5;

/// A pass record that violates its invariants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PassValidationError {
    /// Pass was attached to the wrong station.
    #[error("Pass for station {actual} validated against station {expected}")]
    StationMismatch {
        /// Station used for validation.
        expected: StationId,
        /// Station recorded on the pass.
        actual: StationId,
    },
    /// Azimuth is not in [0, 360).
    #[error("Azimuth {0} outside [0, 360)")]
    AzimuthOutOfRange(f64),
    /// Elevation at acquisition is below the station minimum.
    #[error("Elevation {elevation_deg} below station minimum {min_elevation_deg}")]
    BelowMinimumElevation {
        /// Reported elevation.
        elevation_deg: f64,
        /// Station minimum.
        min_elevation_deg: f64,
    },
    /// Acquisition is after loss.
    #[error("Acquisition {aos} after loss {los}")]
    InvertedWindow {
        /// Acquisition time.
        aos: DateTime<Utc>,
        /// Loss time.
        los: DateTime<Utc>,
    },
}
