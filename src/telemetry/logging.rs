//! Subscriber setup for `tracing` output.
//!
//! Console output goes to stderr; an optional daily-rolling file receives the
//! same events. Both honour one level filter, with noisy HTTP crates capped at
//! warn.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

const QUIET_DIRECTIVES: [&str; 4] = ["hyper=warn", "h2=warn", "reqwest=warn", "tokio=warn"];

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for rolling log files; no file output when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Filter directive, e.g. `info` or `braid=debug`
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub console_enabled: bool,
    /// Emit JSON lines instead of human-readable text
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            level: default_level(),
            console_enabled: true,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Create logging configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(log_dir) = std::env::var("BRAID_LOG_DIR") {
            config.log_dir = Some(PathBuf::from(log_dir));
        }

        if let Ok(level) = std::env::var("BRAID_LOG_LEVEL") {
            config.level = level;
        }

        if let Ok(enabled) = std::env::var("BRAID_CONSOLE_LOGGING") {
            config.console_enabled = enabled.parse().unwrap_or(true);
        }

        if let Ok(json) = std::env::var("BRAID_JSON_LOGS") {
            config.json_format = json.parse().unwrap_or(false);
        }

        config
    }

    /// Build the level filter with the quiet directives applied
    pub fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| ConfigError::Validation(format!("log level '{}': {}", self.level, e)))?;
        for directive in QUIET_DIRECTIVES {
            let directive: Directive = directive
                .parse()
                .map_err(|e| ConfigError::Validation(format!("log directive: {}", e)))?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }
}

/// Guard that must be kept alive for the duration of the application
/// to ensure proper log flushing
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber.
///
/// Fails when the level string is not a valid filter, the log directory
/// cannot be created, or a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, ConfigError> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut file_guard = None;

    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = tracing_appender::rolling::daily(log_dir, "braid.log");
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        file_guard = Some(guard);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::new(
                "%Y-%m-%d %H:%M:%S%.3f UTC".to_string(),
            ))
            .with_file(true)
            .with_line_number(true)
            .with_target(true);

        let filter = config.env_filter()?;
        layers.push(if config.json_format {
            file_layer.json().with_filter(filter).boxed()
        } else {
            file_layer.with_filter(filter).boxed()
        });
    }

    if config.console_enabled {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::NONE)
            .with_target(true);

        let filter = config.env_filter()?;
        layers.push(if config.json_format {
            console_layer.json().with_filter(filter).boxed()
        } else {
            console_layer.with_ansi(true).with_filter(filter).boxed()
        });
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| ConfigError::Validation(format!("logging already initialized: {}", e)))?;

    info!(
        log_dir = ?config.log_dir,
        level = %config.level,
        json_format = config.json_format,
        "🌊 Logging initialized"
    );

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
