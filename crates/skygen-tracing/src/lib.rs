//! Logging setup shared by every skygen crate.
//!
//! Binaries, tests and benchmarks install the `tracing` subscriber through
//! [`init_global_tracing`] so sampler output is filtered and formatted one
//! way. Three profiles cover the usual cases:
//!
//! | profile       | format  | extra                                        |
//! |---------------|---------|----------------------------------------------|
//! | `interactive` | pretty  | ANSI colour                                  |
//! | `batch`       | JSON    | for catalog production runs and CI           |
//! | `profiling`   | JSON    | span close events, debug for skygen crates   |
//!
//! The [`performance`] module and the [`perf_span!`]/[`perf_event!`] macros
//! carry the structured events for transfers, launches, sweeps and passes.

pub mod performance;

#[macro_use]
pub mod macros;

use std::env;

pub use tracing::{debug, error, info, trace, warn};

use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

/// Environment variable selecting the profile.
pub const ENV_PROFILE: &str = "SKYGEN_LOG";
/// Environment variable overriding the filter directives.
pub const ENV_FILTER: &str = "SKYGEN_LOG_FILTER";
/// Environment variable overriding the output format.
pub const ENV_FORMAT: &str = "SKYGEN_LOG_FORMAT";
/// Environment variable controlling timed spans: `off`, `on`, or a
/// threshold in microseconds.
pub const ENV_PERF: &str = "SKYGEN_PERF";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Timed-span settings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PerfTracing {
    pub enabled: bool,
    /// Spans shorter than this are not logged
    pub threshold_us: Option<u64>,
    /// Directives appended to the filter while enabled
    pub filter: Option<String>,
}

impl PerfTracing {
    /// `off`, `on`, or a threshold in microseconds (which also enables).
    fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "off" | "0" | "false" | "no" => Some(Self::default()),
            "on" | "true" | "yes" => Some(Self {
                enabled: true,
                ..Self::default()
            }),
            other => other.parse().ok().map(|threshold| Self {
                enabled: true,
                threshold_us: Some(threshold),
                filter: None,
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Filter directives, e.g. `skygen_core=debug,info`. Falls back to
    /// `RUST_LOG`, then to `fallback`.
    pub filter: Option<String>,
    pub fallback: String,
    pub targets: bool,
    pub ansi: bool,
    pub span_events: FmtSpan,
    pub format: LogFormat,
    pub perf: PerfTracing,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::interactive()
    }
}

impl TracingConfig {
    pub fn interactive() -> Self {
        Self {
            filter: None,
            fallback: "info".to_string(),
            targets: true,
            ansi: true,
            span_events: FmtSpan::NONE,
            format: LogFormat::Pretty,
            perf: PerfTracing {
                enabled: cfg!(debug_assertions),
                ..PerfTracing::default()
            },
        }
    }

    pub fn batch() -> Self {
        Self {
            ansi: false,
            format: LogFormat::Json,
            perf: PerfTracing::default(),
            ..Self::interactive()
        }
    }

    /// Launch, transfer and sweep events at debug level with span timings.
    pub fn profiling() -> Self {
        Self {
            filter: Some("skygen_backends=debug,skygen_core=debug".to_string()),
            span_events: FmtSpan::CLOSE,
            perf: PerfTracing {
                enabled: true,
                threshold_us: None,
                filter: Some("skygen_backends=trace".to_string()),
            },
            ..Self::batch()
        }
    }

    /// Configuration from the process environment; see the `ENV_*`
    /// constants.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Configuration from any key/value source, read the same way as the
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = match lookup(ENV_PROFILE).map(|p| p.to_ascii_lowercase()).as_deref() {
            Some("batch") | Some("ci") => Self::batch(),
            Some("profiling") => Self::profiling(),
            _ => Self::interactive(),
        };

        if let Some(filter) = lookup(ENV_FILTER).filter(|f| !f.trim().is_empty()) {
            config.filter = Some(filter);
        }
        if let Some(format) = lookup(ENV_FORMAT).as_deref().and_then(LogFormat::parse) {
            config.format = format;
            config.ansi &= format != LogFormat::Json;
        }
        if let Some(perf) = lookup(ENV_PERF).as_deref().and_then(PerfTracing::parse) {
            config.perf = PerfTracing {
                filter: config.perf.filter.take(),
                ..perf
            };
        }
        config
    }

    fn directives(&self) -> Option<String> {
        let perf = self.perf.filter.as_ref().filter(|_| self.perf.enabled);
        match (&self.filter, perf) {
            (Some(base), Some(perf)) => Some(format!("{base},{perf}")),
            (None, Some(perf)) => Some(perf.clone()),
            (base, None) => base.clone(),
        }
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingSetupError> {
        match self.directives() {
            Some(directives) => {
                EnvFilter::try_new(&directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.fallback))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TracingSetupError {
    #[error("invalid tracing directive: {0}")]
    InvalidFilter(String),
    /// Usually another subscriber is already installed.
    #[error("failed to install global tracing subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    let filter = config.env_filter()?;
    Ok(Registry::default().with(fmt_layer(config)).with(filter))
}

fn fmt_layer(config: &TracingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = tracing_fmt::layer()
        .with_target(config.targets)
        .with_span_events(config.span_events.clone());
    match config.format {
        LogFormat::Pretty => Box::new(layer.pretty().with_ansi(config.ansi)),
        LogFormat::Compact => Box::new(layer.compact().with_ansi(config.ansi)),
        LogFormat::Json => Box::new(layer.json().with_ansi(false)),
    }
}

/// Install the subscriber process-wide and apply the timed-span settings.
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    build_subscriber(config)?.try_init()?;
    performance::configure(&config.perf);
    Ok(())
}

/// Best-effort subscriber for tests; a second call is a no-op.
pub fn init_test_tracing() {
    let config = TracingConfig {
        ansi: false,
        format: LogFormat::Compact,
        fallback: "warn".to_string(),
        ..TracingConfig::interactive()
    };
    if let Ok(subscriber) = build_subscriber(&config) {
        let _ = subscriber.try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn rejects_invalid_directive() {
        let config = TracingConfig {
            filter: Some("=::invalid".to_string()),
            ..TracingConfig::default()
        };
        assert!(matches!(build_subscriber(&config), Err(TracingSetupError::InvalidFilter(_))));
    }

    #[test]
    fn every_profile_builds() {
        for config in [TracingConfig::interactive(), TracingConfig::batch(), TracingConfig::profiling()] {
            assert!(build_subscriber(&config).is_ok());
        }
    }

    #[test]
    fn batch_profile_with_format_override() {
        let config = TracingConfig::from_lookup(lookup(&[
            (ENV_PROFILE, "batch"),
            (ENV_FORMAT, "compact"),
            (ENV_FILTER, "skygen_core=debug"),
        ]));
        assert_eq!(config.filter.as_deref(), Some("skygen_core=debug"));
        assert_eq!(config.format, LogFormat::Compact);
        assert!(!config.ansi);
    }

    #[test]
    fn json_format_disables_colour() {
        let config = TracingConfig::from_lookup(lookup(&[(ENV_FORMAT, " JSON ")]));
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.ansi);
    }

    #[test]
    fn perf_threshold_enables_timed_spans() {
        let config = TracingConfig::from_lookup(lookup(&[(ENV_PROFILE, "profiling"), (ENV_PERF, "250")]));
        assert!(config.perf.enabled);
        assert_eq!(config.perf.threshold_us, Some(250));
        assert_eq!(config.perf.filter.as_deref(), Some("skygen_backends=trace"));

        let off = TracingConfig::from_lookup(lookup(&[(ENV_PERF, "off")]));
        assert!(!off.perf.enabled);
        let garbage = TracingConfig::from_lookup(lookup(&[(ENV_PERF, "sometimes")]));
        assert_eq!(garbage.perf, TracingConfig::interactive().perf);
    }

    #[test]
    fn perf_filter_is_appended_only_while_enabled() {
        let mut config = TracingConfig::profiling();
        assert_eq!(
            config.directives().as_deref(),
            Some("skygen_backends=debug,skygen_core=debug,skygen_backends=trace")
        );
        config.perf.enabled = false;
        assert_eq!(config.directives().as_deref(), Some("skygen_backends=debug,skygen_core=debug"));
    }

    #[test]
    fn unknown_format_is_ignored() {
        assert_eq!(LogFormat::parse("xml"), None);
        assert_eq!(LogFormat::parse("Pretty"), Some(LogFormat::Pretty));
    }
}
