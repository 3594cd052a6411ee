//! Scripted ephemeris engine for testing.
//!
//! Events are scripted per (station, element set) as offsets from the window
//! start, so scripts stay valid whatever instant a cycle begins. Pairs can be
//! made to fail, and every evaluated pair is recorded.
//!
//! Look angles are resolved against the start of the last `events` call for
//! the pair: an instant inside a scripted pass gets that pass's angle, and
//! its culmination gets the peak angle if one was scripted.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use super::{EngineError, EphemerisEngine};
use crate::types::{ElementSet, ElementSetId, LookAngle, PassEvent, PassEventKind, Station, StationId};

/// One scripted pass: rise and set offsets plus its look angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptedPass {
    /// Rise offset from window start.
    pub rise_after: Duration,
    /// Set offset from window start.
    pub set_after: Duration,
    /// Look angle reported during the pass.
    pub look: LookAngle,
    /// Look angle reported at culmination; `look` when unset.
    pub peak: Option<LookAngle>,
}

impl ScriptedPass {
    /// Create a scripted pass.
    pub fn new(rise_after: Duration, set_after: Duration, look: LookAngle) -> Self {
        Self { rise_after, set_after, look, peak: None }
    }

    /// Report a different look angle at culmination.
    pub fn with_peak(mut self, peak: LookAngle) -> Self {
        self.peak = Some(peak);
        self
    }

    /// Culmination offset, midway between rise and set.
    pub fn culmination_after(&self) -> Duration {
        self.rise_after + (self.set_after - self.rise_after) / 2
    }

    fn look_at(&self, offset: Duration) -> Option<LookAngle> {
        if offset == self.culmination_after() {
            Some(self.peak.unwrap_or(self.look))
        } else if self.rise_after <= offset && offset <= self.set_after {
            Some(self.look)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
enum Script {
    Events {
        events: Vec<(PassEventKind, Duration)>,
        passes: Vec<ScriptedPass>,
        /// Reported outside every scripted pass.
        fallback: LookAngle,
    },
    Fail(String),
}

/// Engine returning pre-scripted events.
///
/// Uses BTreeMap for deterministic iteration order. Unscripted pairs have no
/// events.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    scripts: Mutex<BTreeMap<(StationId, ElementSetId), Script>>,
    calls: Mutex<Vec<(StationId, ElementSetId)>>,
    starts: Mutex<BTreeMap<(StationId, ElementSetId), DateTime<Utc>>>,
}

impl ScriptedEngine {
    /// Create a new engine with no scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script complete passes for a pair, with a culmination midway.
    pub fn with_passes(
        self,
        station: StationId,
        element_set: ElementSetId,
        passes: Vec<ScriptedPass>,
    ) -> Self {
        let fallback = passes
            .first()
            .map(|p| p.look)
            .unwrap_or_else(|| LookAngle::new(0.0, 0.0));
        let mut events = Vec::with_capacity(passes.len() * 3);
        for pass in &passes {
            events.push((PassEventKind::Rise, pass.rise_after));
            events.push((PassEventKind::Culmination, pass.culmination_after()));
            events.push((PassEventKind::Set, pass.set_after));
        }
        self.scripts.lock().insert(
            (station, element_set),
            Script::Events { events, passes, fallback },
        );
        self
    }

    /// Script a raw event list for a pair.
    ///
    /// Nothing is validated; this is how malformed engine output is injected.
    pub fn with_raw_events(
        self,
        station: StationId,
        element_set: ElementSetId,
        events: Vec<(PassEventKind, Duration)>,
        look: LookAngle,
    ) -> Self {
        self.scripts.lock().insert(
            (station, element_set),
            Script::Events {
                events,
                passes: Vec::new(),
                fallback: look,
            },
        );
        self
    }

    /// Make every call for a pair fail.
    pub fn with_failure(
        self,
        station: StationId,
        element_set: ElementSetId,
        reason: impl Into<String>,
    ) -> Self {
        self.scripts
            .lock()
            .insert((station, element_set), Script::Fail(reason.into()));
        self
    }

    /// Pairs evaluated so far, in call order.
    pub fn calls(&self) -> Vec<(StationId, ElementSetId)> {
        self.calls.lock().clone()
    }

    /// Forget recorded calls.
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }
}

impl EphemerisEngine for ScriptedEngine {
    fn events(
        &self,
        station: &Station,
        element_set: &ElementSet,
        start: DateTime<Utc>,
        horizon: Duration,
    ) -> Result<Vec<PassEvent>, EngineError> {
        self.calls.lock().push((station.id, element_set.id));
        self.starts.lock().insert((station.id, element_set.id), start);

        let scripts = self.scripts.lock();
        match scripts.get(&(station.id, element_set.id)) {
            None => Ok(Vec::new()),
            Some(Script::Fail(reason)) => Err(EngineError::Propagation {
                station: station.id,
                element_set: element_set.id,
                reason: reason.clone(),
            }),
            Some(Script::Events { events, .. }) => {
                let mut out: Vec<PassEvent> = events
                    .iter()
                    .filter(|(_, offset)| *offset < horizon)
                    .map(|(kind, offset)| PassEvent { kind: *kind, at: start + *offset })
                    .collect();
                out.sort_by_key(|e| e.at);
                Ok(out)
            }
        }
    }

    fn look_angle(
        &self,
        station: &Station,
        element_set: &ElementSet,
        at: DateTime<Utc>,
    ) -> Result<LookAngle, EngineError> {
        let key = (station.id, element_set.id);
        let offset = self.starts.lock().get(&key).map(|start| at - *start);
        let scripts = self.scripts.lock();
        match scripts.get(&key) {
            Some(Script::Events { passes, fallback, .. }) => Ok(offset
                .and_then(|offset| passes.iter().find_map(|pass| pass.look_at(offset)))
                .unwrap_or(*fallback)),
            Some(Script::Fail(reason)) => Err(EngineError::Propagation {
                station: station.id,
                element_set: element_set.id,
                reason: reason.clone(),
            }),
            None => Err(EngineError::Propagation {
                station: station.id,
                element_set: element_set.id,
                reason: "no script for pair".to_string(),
            }),
        }
    }
}
