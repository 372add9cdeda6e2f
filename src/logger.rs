//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the configured level is known.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Initialise the global tracing subscriber, writing to stderr so that the
/// console channel keeps stdout for the conversation.
///
/// With `prefer_level`, `level` wins over `RUST_LOG`; otherwise a valid
/// `RUST_LOG` wins and `level` is the fallback.
pub fn init(level: LevelFilter, prefer_level: bool) -> Result<(), AppError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) if !prefer_level => env_filter,
        _ => EnvFilter::builder()
            .with_default_directive(level.into())
            .parse_lossy(""),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

/// Parse a level name, case-insensitively. `warning` is accepted as `warn`.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "" => Err(AppError::Logger("log level must not be empty".into())),
        "warning" => Ok(LevelFilter::WARN),
        other => other
            .parse::<LevelFilter>()
            .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'"))),
    }
}

/// Level to run with: the parsed `level`, or `info` when it is not
/// recognised. The flag is `false` when the fallback was taken.
pub fn resolve_level(level: &str) -> (LevelFilter, bool) {
    match parse_level(level) {
        Ok(parsed) => (parsed, true),
        Err(_) => (LevelFilter::INFO, false),
    }
}

/// Level selected by `n` repetitions of `-v`: warn, info, debug, then trace.
pub fn verbosity_level(n: u8) -> Option<LevelFilter> {
    match n {
        0 => None,
        1 => Some(LevelFilter::WARN),
        2 => Some(LevelFilter::INFO),
        3 => Some(LevelFilter::DEBUG),
        _ => Some(LevelFilter::TRACE),
    }
}
