//! Logging setup for the command-line binary
//!
//! Logs go to stderr so stdout stays clean for JSON output.

use fitconfig::Config;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
};

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Normalized level name, `info` when the configured value is not a level
pub fn level_directive(level: &str) -> &'static str {
    let level = level.trim().to_lowercase();
    LEVELS
        .iter()
        .find(|known| **known == level)
        .copied()
        .unwrap_or("info")
}

/// Installs the global subscriber
///
/// `RUST_LOG` wins over `logger.min_level`; the console layer is skipped when
/// `logger.enable_console` is false.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(&config.get_log_min_level())));

    let subscriber = Registry::default().with(filter);

    if config.get_log_enable_console() {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .init();
    } else {
        subscriber.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("DEBUG"), "debug");
        assert_eq!(level_directive(" warn "), "warn");
        assert_eq!(level_directive("verbose"), "info");
        assert_eq!(level_directive(""), "info");
    }
}
