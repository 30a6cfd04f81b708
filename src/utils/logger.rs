/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/
use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

static INIT: Once = Once::new();

fn parse_level(level: &str) -> Level {
    match level.to_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "WARN" => Level::WARN,
        "ERROR" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs the global `tracing` subscriber.
///
/// The level is read from the `LOGLEVEL` environment variable (`TRACE`, `DEBUG`,
/// `INFO`, `WARN`, `ERROR`), defaulting to `INFO`. Calling it more than once is harmless.
pub fn setup_logger() {
    let level = env::var("LOGLEVEL").unwrap_or_else(|_| "INFO".to_string());
    setup_logger_with_level(&level);
}

/// Installs the global `tracing` subscriber with an explicit level.
///
/// Protocol lines exchanged with the server are logged at `TRACE`.
pub fn setup_logger_with_level(level: &str) {
    let level = parse_level(level);
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            // Someone else installed a subscriber first; keep theirs.
            tracing::debug!("global tracing subscriber already set");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("Debug"), Level::DEBUG);
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }

    #[test]
    fn test_setup_logger_is_idempotent() {
        setup_logger_with_level("debug");
        setup_logger_with_level("info");
        setup_logger();
    }
}
