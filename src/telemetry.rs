//! Tracing subscriber setup.
//!
//! Called once at startup by the binary. Library code only emits `tracing`
//! events and never installs a subscriber itself.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str =
    "pass_scheduler=info,overpass_scheduler=info,tower_http=info,sqlx=warn";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable output for local development.
    Pretty,
}

impl LogFormat {
    /// Read `LOG_FORMAT` (`json` or `pretty`, default `json`).
    pub fn from_env() -> Self {
        std::env::var("LOG_FORMAT")
            .map(|s| Self::parse(&s))
            .unwrap_or(Self::Json)
    }

    /// Parse a format name; anything but `pretty` is JSON.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("pretty") {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_span_events(FmtSpan::CLOSE))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .try_init(),
    }
}
