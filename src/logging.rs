//! Structured logging setup
//!
//! `tracing` events are emitted throughout the dispatch core (context
//! created/released, chain entries, route matched, errors mapped). This
//! module installs the subscriber that formats them.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `BRRTC_LOG_LEVEL` | `info` | trace/debug/info/warn/error |
//! | `BRRTC_LOG_FORMAT` | `json` | json/pretty |
//! | `BRRTC_LOG_ASYNC` | `true` | buffer output on a background thread |
//! | `BRRTC_LOG_CHAIN` | `false` | debug events for chain entries and the dispatcher |
//! | `BRRTC_LOG_SAMPLING_MODE` | `all` | all/error-only/sampled |
//! | `BRRTC_LOG_SAMPLING_RATE` | `1.0` | share of non-error events kept in sampled mode |
//! | `BRRTC_LOG_TARGET_FILTER` | unset | extra comma-separated filter directives |
//! | `BRRTC_LOG_INCLUDE_LOCATION` | `false` | file and line of each event |
//!
//! `RUST_LOG`, when set, replaces the level from `BRRTC_LOG_LEVEL`.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Level, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Targets switched to `debug` by `BRRTC_LOG_CHAIN`
const CHAIN_TARGETS: [&str; 3] = [
    "brrtcore::middleware",
    "brrtcore::dispatcher",
    "brrtcore::graphql",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    /// Anything but `pretty` selects JSON
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.eq_ignore_ascii_case("pretty") {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        })
    }
}

/// Which events pass to the formatter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    All,
    /// WARN and ERROR only
    ErrorOnly,
    /// All WARN/ERROR, a fraction of the rest
    Sampled,
}

impl FromStr for SamplingMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "error-only" => SamplingMode::ErrorOnly,
            "sampled" => SamplingMode::Sampled,
            _ => SamplingMode::All,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub async_logging: bool,
    /// Debug output for the chain, dispatcher and GraphQL bridge
    pub chain_debug: bool,
    pub sampling_mode: SamplingMode,
    /// 0.0-1.0, used in `Sampled` mode
    pub sampling_rate: f64,
    pub target_filter: Option<String>,
    pub include_location: bool,
}

fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl LogConfig {
    /// Read `BRRTC_LOG_*`, falling back to production defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: env_parsed("BRRTC_LOG_LEVEL").unwrap_or(defaults.level),
            format: env_parsed("BRRTC_LOG_FORMAT").unwrap_or(defaults.format),
            async_logging: env_parsed("BRRTC_LOG_ASYNC").unwrap_or(defaults.async_logging),
            chain_debug: env_parsed("BRRTC_LOG_CHAIN").unwrap_or(defaults.chain_debug),
            sampling_mode: env_parsed("BRRTC_LOG_SAMPLING_MODE").unwrap_or(defaults.sampling_mode),
            sampling_rate: env_parsed("BRRTC_LOG_SAMPLING_RATE").unwrap_or(defaults.sampling_rate),
            target_filter: env::var("BRRTC_LOG_TARGET_FILTER").ok(),
            include_location: env_parsed("BRRTC_LOG_INCLUDE_LOCATION")
                .unwrap_or(defaults.include_location),
        }
    }

    /// Verbose, synchronous, human-readable
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Pretty,
            async_logging: false,
            chain_debug: true,
            include_location: true,
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()));

        let mut directives: Vec<String> = vec!["may_minihttp::http_server=warn".to_string()];
        if self.chain_debug {
            directives.extend(CHAIN_TARGETS.iter().map(|t| format!("{t}=debug")));
        }
        if let Some(extra) = &self.target_filter {
            directives.extend(
                extra
                    .split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string),
            );
        }
        for raw in directives {
            match raw.parse::<Directive>() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(_) => eprintln!("Warning: Invalid log filter directive: {raw}"),
            }
        }
        filter
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Json,
            async_logging: true,
            chain_debug: false,
            sampling_mode: SamplingMode::All,
            sampling_rate: 1.0,
            target_filter: None,
            include_location: false,
        }
    }
}

/// Drops non-error events according to the sampling mode; spans always pass
pub struct SamplingLayer {
    mode: SamplingMode,
    /// keep one in `keep_every` sampled events; 0 keeps none
    keep_every: u64,
    seen: AtomicU64,
}

impl SamplingLayer {
    #[must_use]
    pub fn new(mode: SamplingMode, sampling_rate: f64) -> Self {
        let rate = sampling_rate.clamp(0.0, 1.0);
        let keep_every = if rate > 0.0 { (1.0 / rate).round() as u64 } else { 0 };
        Self {
            mode,
            keep_every,
            seen: AtomicU64::new(0),
        }
    }

    fn keep(&self, metadata: &Metadata<'_>) -> bool {
        if metadata.is_span() || *metadata.level() <= Level::WARN {
            return true;
        }
        match self.mode {
            SamplingMode::All => true,
            SamplingMode::ErrorOnly => false,
            SamplingMode::Sampled => {
                self.keep_every > 0
                    && self.seen.fetch_add(1, Ordering::Relaxed) % self.keep_every == 0
            }
        }
    }
}

impl<S> Layer<S> for SamplingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: LayerContext<'_, S>) -> bool {
        self.keep(metadata)
    }
}

/// Install the global subscriber.
///
/// With async logging the returned guard must live as long as the process;
/// dropping it flushes and stops the writer thread.
///
/// # Errors
///
/// A global subscriber is already installed.
pub fn init_logging_with_config(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let (writer, guard) = if config.async_logging {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
        (BoxMakeWriter::new(non_blocking), Some(guard))
    } else {
        (BoxMakeWriter::new(std::io::stdout), None)
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_writer(writer);
    let fmt_layer = match config.format {
        LogFormat::Json => fmt_layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_thread_ids(true)
            .boxed(),
        LogFormat::Pretty => fmt_layer.pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(SamplingLayer::new(config.sampling_mode, config.sampling_rate))
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(guard)
}

/// [`init_logging_with_config`] with [`LogConfig::from_env`]
///
/// # Errors
///
/// A global subscriber is already installed.
pub fn init_logging() -> Result<Option<WorkerGuard>> {
    init_logging_with_config(&LogConfig::from_env())
}
