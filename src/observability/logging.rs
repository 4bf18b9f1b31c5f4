//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Overrides the filter directive.
pub const LOG_LEVEL_ENV: &str = "MYADMIN_LOG_LEVEL";
/// Overrides the output format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "MYADMIN_LOG_FORMAT";
/// Overrides the log file path.
pub const LOG_FILE_ENV: &str = "MYADMIN_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

impl LogFormat {
    /// Parses a format name; unknown names yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" | "console" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Event filter.
    pub filter: EnvFilter,
    /// Output format.
    pub format: LogFormat,
    /// Log file; stderr when `None`.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds the configuration from file settings with environment overrides.
    ///
    /// `verbose` raises the default level to `debug` when neither the
    /// environment nor the file set one.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let level = std::env::var(LOG_LEVEL_ENV)
            .ok()
            .or_else(|| settings.and_then(|s| s.level.clone()));
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .or_else(|| settings.and_then(|s| s.format.clone()));
        let file = std::env::var(LOG_FILE_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| settings.and_then(|s| s.file.clone()));

        Self::resolve(level.as_deref(), format.as_deref(), file, verbose)
    }

    fn resolve(
        level: Option<&str>,
        format: Option<&str>,
        file: Option<PathBuf>,
        verbose: bool,
    ) -> Self {
        let default_level = if verbose { "debug" } else { "info" };
        let directive = level.filter(|l| !l.trim().is_empty()).unwrap_or(default_level);
        let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(default_level));

        Self {
            filter,
            format: format.and_then(LogFormat::parse).unwrap_or_default(),
            file,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::resolve(None, None, None, false)
    }
}
