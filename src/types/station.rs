//! Ground station types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a ground station.
///
/// Wraps the store's integer key and implements `Ord` so stations can be
/// processed in a stable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationId(i64);

impl StationId {
    /// Create a new StationId.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw key.
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for StationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A ground station as read from the store.
///
/// Stations are owned by operators; the scheduler only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Station identity.
    pub id: StationId,
    /// Human-readable station name.
    pub name: String,
    /// Geodetic latitude in degrees, positive north.
    pub latitude_deg: f64,
    /// Geodetic longitude in degrees, positive east.
    pub longitude_deg: f64,
    /// Altitude above the ellipsoid in metres.
    pub altitude_m: f64,
    /// Minimum usable elevation angle in degrees.
    pub min_elevation_deg: f64,
}

impl Station {
    /// Create a new station.
    pub fn new(
        id: StationId,
        name: impl Into<String>,
        latitude_deg: f64,
        longitude_deg: f64,
        altitude_m: f64,
        min_elevation_deg: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            latitude_deg,
            longitude_deg,
            altitude_m,
            min_elevation_deg,
        }
    }
}
