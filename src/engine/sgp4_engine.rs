//! Production ephemeris engine backed by the `sgp4` crate.
//!
//! Propagation is delegated entirely to `sgp4`. This adapter only rotates the
//! propagated TEME position into an Earth-fixed frame, derives the look angle
//! from the station, and brackets minimum-elevation crossings by sampling and
//! bisection.
//!
//! ## Boundary handling
//!
//! Only complete passes are reported:
//! - a pass already in progress at the window start is skipped
//! - a pass that rises inside the window is followed past the window end
//!   (up to [`MAX_PASS_EXTENSION_MINUTES`]) to find its set; if none is found
//!   the rise is dropped

use chrono::{DateTime, Duration, Utc};

use super::{EngineError, EphemerisEngine};
use crate::types::{ElementSet, LookAngle, PassEvent, Station};

/// WGS84 equatorial radius, km.
const WGS84_A_KM: f64 = 6378.137;
/// WGS84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Default sampling step when searching for crossings.
pub const DEFAULT_STEP_SECS: i64 = 30;

/// How far past the window end a rising pass is followed.
pub const MAX_PASS_EXTENSION_MINUTES: i64 = 120;

/// Crossing search stops once the bracket is this narrow.
const BISECTION_RESOLUTION_MS: i64 = 500;

/// SGP4-backed engine.
#[derive(Debug, Clone)]
pub struct Sgp4Engine {
    step: Duration,
}

struct Propagator {
    elements: sgp4::Elements,
    constants: sgp4::Constants,
}

impl Sgp4Engine {
    /// Create an engine with the default sampling step.
    pub fn new() -> Self {
        Self { step: Duration::seconds(DEFAULT_STEP_SECS) }
    }

    /// Override the sampling step (minimum one second).
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step.max(Duration::seconds(1));
        self
    }

    fn propagator(&self, element_set: &ElementSet) -> Result<Propagator, EngineError> {
        let elements = sgp4::Elements::from_tle(
            Some(element_set.object_name.clone()),
            element_set.line1.as_bytes(),
            element_set.line2.as_bytes(),
        )
        .map_err(|e| EngineError::InvalidElements {
            element_set: element_set.id,
            reason: format!("{e:?}"),
        })?;
        let constants = sgp4::Constants::from_elements(&elements).map_err(|e| {
            EngineError::InvalidElements {
                element_set: element_set.id,
                reason: format!("{e:?}"),
            }
        })?;
        Ok(Propagator { elements, constants })
    }

    fn look_from(
        &self,
        propagator: &Propagator,
        station: &Station,
        element_set: &ElementSet,
        at: DateTime<Utc>,
    ) -> Result<LookAngle, EngineError> {
        let minutes = (at.naive_utc() - propagator.elements.datetime).num_milliseconds() as f64
            / 60_000.0;
        let prediction = propagator
            .constants
            .propagate(sgp4::MinutesSinceEpoch(minutes))
            .map_err(|e| EngineError::Propagation {
                station: station.id,
                element_set: element_set.id,
                reason: format!("{e:?}"),
            })?;

        let satellite = teme_to_ecef(prediction.position, gmst_rad(at));
        Ok(topocentric_look_angle(station, satellite))
    }

    /// Elevation minus the station minimum; positive while visible.
    fn margin(
        &self,
        propagator: &Propagator,
        station: &Station,
        element_set: &ElementSet,
        at: DateTime<Utc>,
    ) -> Result<f64, EngineError> {
        Ok(self.look_from(propagator, station, element_set, at)?.elevation_deg
            - station.min_elevation_deg)
    }

    /// Narrow a sign change of the margin in `(lo, hi]` down to one instant.
    fn bisect(
        &self,
        propagator: &Propagator,
        station: &Station,
        element_set: &ElementSet,
        mut lo: DateTime<Utc>,
        mut hi: DateTime<Utc>,
        rising: bool,
    ) -> Result<DateTime<Utc>, EngineError> {
        while (hi - lo).num_milliseconds() > BISECTION_RESOLUTION_MS {
            let mid = lo + (hi - lo) / 2;
            let visible = self.margin(propagator, station, element_set, mid)? >= 0.0;
            if visible == rising {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Ok(hi)
    }
}

impl Default for Sgp4Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl EphemerisEngine for Sgp4Engine {
    fn events(
        &self,
        station: &Station,
        element_set: &ElementSet,
        start: DateTime<Utc>,
        horizon: Duration,
    ) -> Result<Vec<PassEvent>, EngineError> {
        let propagator = self.propagator(element_set)?;
        let (window_end, search_end) = start
            .checked_add_signed(horizon)
            .and_then(|end| {
                end.checked_add_signed(Duration::minutes(MAX_PASS_EXTENSION_MINUTES))
                    .map(|search_end| (end, search_end))
            })
            .ok_or_else(|| EngineError::Propagation {
                station: station.id,
                element_set: element_set.id,
                reason: format!("horizon {} out of range", horizon),
            })?;

        let mut events = Vec::new();
        let mut prev_t = start;
        let mut prev_visible = self.margin(&propagator, station, element_set, start)? >= 0.0;
        // Set when a pass rose inside the window: (rise, best sample, best margin).
        let mut open: Option<(DateTime<Utc>, DateTime<Utc>, f64)> = None;
        let mut t = start;

        loop {
            t += self.step;
            if t > search_end || (open.is_none() && t >= window_end) {
                break;
            }

            let margin = self.margin(&propagator, station, element_set, t)?;
            let visible = margin >= 0.0;

            if visible && !prev_visible && t < window_end {
                let rise = self.bisect(&propagator, station, element_set, prev_t, t, true)?;
                open = Some((rise, t, margin));
            } else if visible {
                if let Some((_, best_t, best_margin)) = open.as_mut() {
                    if margin > *best_margin {
                        *best_t = t;
                        *best_margin = margin;
                    }
                }
            } else if prev_visible {
                // Sets of passes in progress at window start have no open rise.
                if let Some((rise, best_t, _)) = open.take() {
                    let set = self.bisect(&propagator, station, element_set, prev_t, t, false)?;
                    events.push(PassEvent::rise(rise));
                    events.push(PassEvent::culmination(best_t.min(set)));
                    events.push(PassEvent::set(set));
                }
            }

            prev_t = t;
            prev_visible = visible;
        }

        if let Some((rise, _, _)) = open {
            tracing::debug!(
                station = %station.id,
                element_set = %element_set.id,
                rise = %rise,
                "Dropping pass with no set before search limit"
            );
        }

        Ok(events)
    }

    fn look_angle(
        &self,
        station: &Station,
        element_set: &ElementSet,
        at: DateTime<Utc>,
    ) -> Result<LookAngle, EngineError> {
        let propagator = self.propagator(element_set)?;
        self.look_from(&propagator, station, element_set, at)
    }
}

/// Greenwich mean sidereal time in radians.
fn gmst_rad(at: DateTime<Utc>) -> f64 {
    let unix_days = at.timestamp_millis() as f64 / 86_400_000.0;
    let days_since_j2000 = unix_days + 2_440_587.5 - 2_451_545.0;
    let centuries = days_since_j2000 / 36_525.0;
    let degrees = 280.460_618_37
        + 360.985_647_366_29 * days_since_j2000
        + 0.000_387_933 * centuries * centuries
        - centuries * centuries * centuries / 38_710_000.0;
    degrees.rem_euclid(360.0).to_radians()
}

/// Rotate a TEME position (km) into the Earth-fixed frame.
fn teme_to_ecef(position: [f64; 3], gmst: f64) -> [f64; 3] {
    let (sin_g, cos_g) = gmst.sin_cos();
    [
        cos_g * position[0] + sin_g * position[1],
        -sin_g * position[0] + cos_g * position[1],
        position[2],
    ]
}

/// Earth-fixed position of a station, km.
fn station_ecef(station: &Station) -> [f64; 3] {
    let lat = station.latitude_deg.to_radians();
    let lon = station.longitude_deg.to_radians();
    let alt_km = station.altitude_m / 1000.0;
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let n = WGS84_A_KM / (1.0 - e2 * lat.sin().powi(2)).sqrt();
    [
        (n + alt_km) * lat.cos() * lon.cos(),
        (n + alt_km) * lat.cos() * lon.sin(),
        (n * (1.0 - e2) + alt_km) * lat.sin(),
    ]
}

/// Azimuth/elevation of an Earth-fixed point seen from a station.
fn topocentric_look_angle(station: &Station, satellite: [f64; 3]) -> LookAngle {
    let origin = station_ecef(station);
    let range = [
        satellite[0] - origin[0],
        satellite[1] - origin[1],
        satellite[2] - origin[2],
    ];
    let (sin_lat, cos_lat) = station.latitude_deg.to_radians().sin_cos();
    let (sin_lon, cos_lon) = station.longitude_deg.to_radians().sin_cos();

    let east = -sin_lon * range[0] + cos_lon * range[1];
    let north = -sin_lat * cos_lon * range[0] - sin_lat * sin_lon * range[1] + cos_lat * range[2];
    let up = cos_lat * cos_lon * range[0] + cos_lat * sin_lon * range[1] + sin_lat * range[2];

    let elevation = up.atan2((east * east + north * north).sqrt()).to_degrees();
    let azimuth = east.atan2(north).to_degrees();
    LookAngle::new(azimuth, elevation)
}
