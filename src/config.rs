//! Runtime configuration from environment variables, each with a default.

use chrono::Duration;

/// Settings read at startup.
///
/// - `HOST` (default `0.0.0.0`) and `PORT` (default `8080`): bind address.
/// - `SWEEP_INTERVAL_SECS` (default `3600`): how often expired confirmations are swept.
/// - `CONFIRMATION_WINDOW_HOURS` (default `72`): time players have to confirm a report.
///   Zero, negative or out-of-range values keep the default.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub sweep_interval_secs: u64,
    pub confirmation_window_hours: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            sweep_interval_secs: 3600,
            confirmation_window_hours: 72,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; absent or unparsable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            sweep_interval_secs: parse_or(&lookup, "SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs)
                .max(1),
            confirmation_window_hours: lookup("CONFIRMATION_WINDOW_HOURS")
                .and_then(|v| v.parse().ok())
                .filter(|&hours| window(hours).is_some())
                .unwrap_or(defaults.confirmation_window_hours),
        }
    }

    pub fn settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            confirmation_window: window(self.confirmation_window_hours)
                .unwrap_or(LifecycleSettings::default().confirmation_window),
        }
    }
}

/// A positive window that chrono can represent.
fn window(hours: i64) -> Option<Duration> {
    if hours <= 0 {
        return None;
    }
    Duration::try_hours(hours)
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Knobs of the match lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LifecycleSettings {
    /// Time between a report and its confirmation deadline.
    pub confirmation_window: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            confirmation_window: Duration::hours(72),
        }
    }
}
