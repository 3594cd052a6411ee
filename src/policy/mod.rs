//! Pass disposition policy definitions.

pub mod disposition;

pub use disposition::{DispositionPolicy, DEFAULT_MIN_DURATION_SECS};
