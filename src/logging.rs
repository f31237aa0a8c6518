//! Logger backing the `log` facade for the shell.
//!
//! Records go to stderr so they never mix with command output.

use std::io::Write as _;

/// The logger instance handed to the `log` crate.
static LOGGER: StderrLogger = StderrLogger;

/// Environment variable consulted when no level is given on the command line.
pub const LEVEL_ENV: &str = "FATVOL_LOG";

/// Writes each record as `[LEVEL] message` on stderr.
pub struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "[{:5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Picks the level from `requested`, then `FATVOL_LOG`, then `warn`.
pub fn resolve_level(requested: Option<&str>) -> Result<log::LevelFilter, String> {
    let from_env = std::env::var(LEVEL_ENV).ok();
    let Some(name) = requested.or(from_env.as_deref()) else {
        return Ok(log::LevelFilter::Warn);
    };
    name.parse()
        .map_err(|_| format!("Unknown log level: {name}"))
}

/// Installs the logger with the given maximum level.
pub fn init(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}
