//! Scheduler configuration.
//!
//! Read from the environment with defaults. Unlike the connection settings,
//! a value that is present but malformed is an error, not the default.

use std::time::Duration;

use crate::policy::{DispositionPolicy, DEFAULT_MIN_DURATION_SECS};
use crate::scheduler::SchedulerMode;
use crate::worker::WorkerConfig;
use crate::DEFAULT_LOOKAHEAD_HOURS;

/// Default `NOTIFY` channel.
pub const DEFAULT_CHANGE_CHANNEL: &str = "pass_inputs_changed";
/// Default polling period.
pub const DEFAULT_POLL_PERIOD_SECS: u64 = 60;
/// Default push-mode debounce delay.
pub const DEFAULT_DEBOUNCE_DELAY_SECS: u64 = 5;
/// Longest accepted prediction horizon (one leap year).
pub const MAX_LOOKAHEAD_HOURS: i64 = 8784;

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but its value is not usable.
    #[error("Invalid {key}={value:?}: {reason}")]
    Invalid {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
        /// What was expected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Which scheduler to run.
    pub mode: SchedulerMode,
    /// Polling period.
    pub poll_period: Duration,
    /// Push-mode debounce delay.
    pub debounce_delay: Duration,
    /// `NOTIFY` channel for push mode.
    pub change_channel: String,
    /// Prediction horizon in hours.
    pub lookahead_hours: i64,
    /// Initial disposition policy.
    pub disposition: DispositionPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: SchedulerMode::Push,
            poll_period: Duration::from_secs(DEFAULT_POLL_PERIOD_SECS),
            debounce_delay: Duration::from_secs(DEFAULT_DEBOUNCE_DELAY_SECS),
            change_channel: DEFAULT_CHANGE_CHANNEL.to_string(),
            lookahead_hours: DEFAULT_LOOKAHEAD_HOURS,
            disposition: DispositionPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Load from environment variables.
    ///
    /// - `SCHEDULER_MODE`: `poll` or `push` (default `push`)
    /// - `POLL_PERIOD_SECS` (default 60, must be > 0)
    /// - `DEBOUNCE_DELAY_SECS` (default 5, may be 0)
    /// - `CHANGE_CHANNEL` (default `pass_inputs_changed`)
    /// - `LOOKAHEAD_HOURS` (default 24, must be in 1..=8784)
    /// - `DISPOSITION_MIN_DURATION_SECS` (default 300)
    /// - `DISPOSITION_MIN_ELEVATION_MARGIN_DEG` (default 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mode = match lookup("SCHEDULER_MODE") {
            None => defaults.mode,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "poll" | "polling" => SchedulerMode::Poll,
                "push" => SchedulerMode::Push,
                _ => return Err(ConfigError::invalid("SCHEDULER_MODE", &raw, "expected poll or push")),
            },
        };

        let poll_period_secs: u64 = parse(&lookup, "POLL_PERIOD_SECS", DEFAULT_POLL_PERIOD_SECS)?;
        if poll_period_secs == 0 {
            return Err(ConfigError::invalid("POLL_PERIOD_SECS", "0", "must be positive"));
        }

        let debounce_secs: u64 = parse(&lookup, "DEBOUNCE_DELAY_SECS", DEFAULT_DEBOUNCE_DELAY_SECS)?;

        let change_channel = match lookup("CHANGE_CHANNEL") {
            None => defaults.change_channel,
            Some(raw) => {
                let channel = raw.trim().to_string();
                if !is_sql_identifier(&channel) {
                    return Err(ConfigError::invalid(
                        "CHANGE_CHANNEL",
                        &raw,
                        "expected a plain SQL identifier",
                    ));
                }
                channel
            }
        };

        let lookahead_hours: i64 = parse(&lookup, "LOOKAHEAD_HOURS", DEFAULT_LOOKAHEAD_HOURS)?;
        if !(1..=MAX_LOOKAHEAD_HOURS).contains(&lookahead_hours) {
            return Err(ConfigError::invalid(
                "LOOKAHEAD_HOURS",
                &lookahead_hours.to_string(),
                format!("must be between 1 and {}", MAX_LOOKAHEAD_HOURS),
            ));
        }

        let min_duration_secs: i64 =
            parse(&lookup, "DISPOSITION_MIN_DURATION_SECS", DEFAULT_MIN_DURATION_SECS)?;
        let min_elevation_margin_deg: f64 =
            parse(&lookup, "DISPOSITION_MIN_ELEVATION_MARGIN_DEG", 0.0)?;
        if !min_elevation_margin_deg.is_finite() {
            return Err(ConfigError::invalid(
                "DISPOSITION_MIN_ELEVATION_MARGIN_DEG",
                &min_elevation_margin_deg.to_string(),
                "must be finite",
            ));
        }

        Ok(Self {
            mode,
            poll_period: Duration::from_secs(poll_period_secs),
            debounce_delay: Duration::from_secs(debounce_secs),
            change_channel,
            lookahead_hours,
            disposition: DispositionPolicy::new(min_duration_secs, min_elevation_margin_deg),
        })
    }

    /// Worker settings derived from this config.
    ///
    /// The horizon is clamped to `1..=MAX_LOOKAHEAD_HOURS` for configs built
    /// by hand rather than through [`from_lookup`](Self::from_lookup).
    pub fn worker_config(&self) -> WorkerConfig {
        let hours = self.lookahead_hours.clamp(1, MAX_LOOKAHEAD_HOURS);
        WorkerConfig {
            lookahead: chrono::Duration::hours(hours),
            policy: self.disposition.clone(),
        }
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, &raw, e.to_string())),
    }
}

/// Whether `s` is usable unquoted as a `LISTEN`/`NOTIFY` channel name.
pub fn is_sql_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
