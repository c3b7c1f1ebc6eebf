//! Logging infrastructure for tether
//!
//! Provides unified logging setup using the tracing ecosystem.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{paths, Result, TetherError};

/// Log output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stderr
    Stderr,
    /// Log to a file under the state directory
    File,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output destination
    pub output: LogOutput,
    /// Log level filter (e.g., "info", "tether=debug")
    pub filter: String,
    /// Optional custom log file name (defaults to "tether.log")
    pub file_name: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "info".into(),
            file_name: None,
        }
    }
}

impl LogConfig {
    /// Create config for the interactive client. Stderr is safe here:
    /// session payload flows over stdin/stdout only.
    pub fn client() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: std::env::var("TETHER_LOG").unwrap_or_else(|_| "warn".into()),
            file_name: None,
        }
    }

    /// Create config for the listener
    pub fn server() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: std::env::var("TETHER_LOG").unwrap_or_else(|_| "info".into()),
            file_name: None,
        }
    }

    /// Raise the filter for repeated `-v` flags, unless TETHER_LOG
    /// already pinned one.
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        if std::env::var("TETHER_LOG").is_err() {
            self.filter = match verbose {
                0 => self.filter,
                1 => "debug".into(),
                _ => "trace".into(),
            };
        }
        self
    }
}

/// Initialize logging with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| TetherError::config(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    match config.output {
        LogOutput::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| TetherError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::File => {
            let log_dir = paths::log_dir();
            std::fs::create_dir_all(&log_dir)?;

            let file_name = config.file_name.as_deref().unwrap_or("tether.log");
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_dir.join(file_name))?;

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(file).with_ansi(false))
                .try_init()
                .map_err(|e| TetherError::internal(format!("Failed to init logging: {}", e)))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.filter, "info");
        assert!(config.file_name.is_none());
    }

    #[test]
    fn test_verbosity_mapping() {
        // Only meaningful when TETHER_LOG is unset; the match arms are
        // what we pin down here.
        if std::env::var("TETHER_LOG").is_err() {
            assert_eq!(LogConfig::default().with_verbosity(0).filter, "info");
            assert_eq!(LogConfig::default().with_verbosity(1).filter, "debug");
            assert_eq!(LogConfig::default().with_verbosity(2).filter, "trace");
            assert_eq!(LogConfig::default().with_verbosity(9).filter, "trace");
        }
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = LogConfig {
            filter: "===".into(),
            ..LogConfig::default()
        };
        assert!(init_logging_with_config(config).is_err());
    }
}
