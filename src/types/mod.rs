//! Core types for the overpass scheduler.

pub mod station;
pub mod element_set;
pub mod pass;
pub mod snapshot;

pub use station::{Station, StationId};
pub use element_set::{ElementSet, ElementSetId};
pub use pass::{
    LookAngle, Pass, PassEvent, PassEventKind, PassValidationError, PassWindow,
    ELEVATION_TOLERANCE_DEG,
};
pub use snapshot::InputSnapshot;
