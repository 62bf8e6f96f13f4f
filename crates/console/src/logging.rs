//! Tracing setup for the terminal client.
//!
//! Console output owns stdout, so logs go to a daily rolling file unless
//! stderr is requested explicitly. `RUST_LOG` overrides the configured level.

use std::path::PathBuf;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

/// File name prefix of the rolling log files.
pub const LOG_FILE_NAME: &str = "panel-console.log";

/// Dependencies that are chatty at debug level.
const QUIET_TARGETS: &[&str] = &["tungstenite", "tokio_tungstenite", "hyper_util", "reqwest"];

/// Where and how much to log.
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: String,
    pub verbose: bool,
    pub directory: PathBuf,
    pub to_stderr: bool,
}

/// Filter directive for the given level; `verbose` forces `debug`.
pub fn filter_directive(level: &str, verbose: bool) -> String {
    let level = if verbose {
        "debug".to_string()
    } else {
        level.trim().to_lowercase()
    };

    let mut directive = level;
    for target in QUIET_TARGETS {
        directive.push_str(&format!(",{}=warn", target));
    }
    directive
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for the lifetime of the program.
pub fn init_logging(options: &LogOptions) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&options.level, options.verbose)));

    if !options.to_stderr {
        match std::fs::create_dir_all(&options.directory) {
            Ok(()) => {
                let appender =
                    RollingFileAppender::new(Rotation::DAILY, &options.directory, LOG_FILE_NAME);
                let (writer, guard) = tracing_appender::non_blocking(appender);

                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .try_init()
                    .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;
                return Ok(Some(guard));
            }
            Err(e) => {
                eprintln!(
                    "Warning: Failed to create log directory {}: {}",
                    options.directory.display(),
                    e
                );
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_uses_level() {
        let directive = filter_directive(" WARN ", false);
        assert!(directive.starts_with("warn,"));
        assert!(directive.contains("tungstenite=warn"));
    }

    #[test]
    fn test_filter_directive_verbose() {
        assert!(filter_directive("error", true).starts_with("debug,"));
    }

    #[test]
    fn test_filter_directive_parses() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(EnvFilter::try_new(filter_directive(level, false)).is_ok());
        }
    }
}
