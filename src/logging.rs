//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `FABNCTL_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `warn`, leaving the terminal to the progress spinner
//!
//! Events are written to stderr so remote command output on stdout stays
//! clean.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::fmt;

/// Environment variable consulted when no level flag is given.
pub const LOG_ENV_VAR: &str = "FABNCTL_LOG";

/// Raised when the global subscriber cannot be installed.
#[derive(Debug, Error)]
#[error("failed to initialise logging: {0}")]
pub struct LoggingError(String);

/// Installs the global logging subscriber.
///
/// # Errors
///
/// Returns [`LoggingError`] when a global subscriber is already set.
pub fn init_logging(cli_level: Option<Level>) -> Result<(), LoggingError> {
    let level = resolve_level(cli_level, std::env::var(LOG_ENV_VAR).ok().as_deref());
    fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init()
        .map_err(|err| LoggingError(err.to_string()))
}

fn resolve_level(cli_level: Option<Level>, env_value: Option<&str>) -> Level {
    cli_level
        .or_else(|| env_value.and_then(parse_level_str))
        .unwrap_or(Level::WARN)
}

/// Parses a level name such as `debug` or `warning`, ignoring case.
#[must_use]
pub fn parse_level_str(value: &str) -> Option<Level> {
    match value.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(Level::TRACE), Some("error"), Level::TRACE)]
    #[case(None, Some(" Debug "), Level::DEBUG)]
    #[case(None, Some("loud"), Level::WARN)]
    #[case(None, None, Level::WARN)]
    fn flag_beats_environment_beats_default(
        #[case] cli_level: Option<Level>,
        #[case] env_value: Option<&str>,
        #[case] expected: Level,
    ) {
        assert_eq!(resolve_level(cli_level, env_value), expected);
    }
}
