use sloggers::{Config, LoggerConfig};
use std::path::Path;

pub use slog::{crit, debug, error, info, o, trace, warn};
pub use slog::{Discard, Drain, Level, Logger};

const DEFAULT_CONFIG: &str = r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#;

/// Builds the default terminal logger writing to stderr.
pub fn init() -> Logger {
    let config: LoggerConfig =
        serdeconv::from_toml_str(DEFAULT_CONFIG).expect("Error parsing built-in logging configuration");

    config.build_logger().expect("Error building the terminal logger")
}

/// Builds a logger from a TOML configuration file.
pub fn init_from_file<P: AsRef<Path>>(path: P) -> Logger {
    let config: LoggerConfig =
        serdeconv::from_toml_file(path).expect("Error loading logging configuration file");

    config.build_logger().expect("Error building the configured logger")
}

/// A logger that discards everything. Intended for tests.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
