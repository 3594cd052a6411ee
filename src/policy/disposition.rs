//! Disposition policy: decides the initial `scheduled` flag of a pass.
//!
//! ## Rule
//!
//! A pass is scheduled when both hold:
//!
//! - it lasts at least `min_duration_secs`
//! - its culmination elevation is at least the station minimum plus
//!   `min_elevation_margin_deg`
//!
//! Acquisition elevation sits at the station minimum for every pass and is
//! not consulted.
//!
//! The decision is a pure function of the station and the pass, so the same
//! inputs always produce the same disposition.

use serde::{Deserialize, Serialize};

use crate::types::{PassWindow, Station};
use crate::DEFAULT_DISPOSITION_POLICY_VERSION;

/// Default minimum pass duration (5 minutes).
pub const DEFAULT_MIN_DURATION_SECS: i64 = 300;

/// Policy assigning the initial scheduling disposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispositionPolicy {
    /// Policy version identifier.
    pub version: String,
    /// Shortest pass worth scheduling, in seconds.
    pub min_duration_secs: i64,
    /// Extra elevation required above the station minimum, in degrees.
    pub min_elevation_margin_deg: f64,
}

impl DispositionPolicy {
    /// Create a policy with custom thresholds.
    ///
    /// Negative values are clamped to zero.
    pub fn new(min_duration_secs: i64, min_elevation_margin_deg: f64) -> Self {
        Self {
            version: DEFAULT_DISPOSITION_POLICY_VERSION.to_string(),
            min_duration_secs: min_duration_secs.max(0),
            min_elevation_margin_deg: min_elevation_margin_deg.max(0.0),
        }
    }

    /// Get the policy ID.
    pub fn policy_id(&self) -> &str {
        &self.version
    }

    /// Decide whether a pass starts out scheduled.
    ///
    /// `peak_elevation_deg` is the elevation at culmination.
    pub fn decide(&self, station: &Station, window: &PassWindow, peak_elevation_deg: f64) -> bool {
        let long_enough = window.duration_secs() >= self.min_duration_secs;
        let high_enough =
            peak_elevation_deg >= station.min_elevation_deg + self.min_elevation_margin_deg;
        long_enough && high_enough
    }
}

impl Default for DispositionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DURATION_SECS, 0.0)
    }
}
