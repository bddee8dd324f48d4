//! Logging setup for the `nvd-sync` binary.

use std::io::Write;

fn level_label(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}

/// Default filter for the given verbosity flags. `RUST_LOG` still wins.
pub fn default_level(quiet: bool, verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// Initialize `env_logger` on stderr with timestamps for log aggregation.
pub fn init_logging(quiet: bool, verbose: bool) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_level(quiet, verbose)),
    )
    .format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {}",
            buf.timestamp_millis(),
            level_label(record.level()),
            record.args()
        )
    })
    .init();
}
