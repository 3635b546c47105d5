use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

use crate::utils::error::{AppError, AppResult};

/// Environment variable holding extra `target=level` directives
pub const LOG_FILTER_ENV: &str = "LINKSTAT_LOG";

/// Initialize the logger with custom formatting.
///
/// `level` is the default for every target. Directives in `LINKSTAT_LOG`
/// (same syntax as `RUST_LOG`) are applied on top of it.
pub fn init_logger(level: LevelFilter) {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter(None, level)
        .parse_env(LOG_FILTER_ENV)
        .init();
}

/// Parse a log level name given on the command line
pub fn parse_log_level(level: &str) -> AppResult<LevelFilter> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(LevelFilter::Trace),
        "debug" => Ok(LevelFilter::Debug),
        "info" => Ok(LevelFilter::Info),
        "warn" | "warning" => Ok(LevelFilter::Warn),
        "error" => Ok(LevelFilter::Error),
        "off" => Ok(LevelFilter::Off),
        other => Err(AppError::ConfigError(format!(
            "unknown log level '{}' (expected trace, debug, info, warn, error or off)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!(parse_log_level("DEBUG").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_log_level("warning").unwrap(), LevelFilter::Warn);
        assert_eq!(parse_log_level("off").unwrap(), LevelFilter::Off);
    }

    #[test]
    fn unknown_level_is_a_config_error() {
        let err = parse_log_level("verbose").unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
