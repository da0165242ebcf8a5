use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

pub use slog::Logger;

/// Matches the `logLevel` values accepted by the XML configuration file.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    fn severity(self) -> Severity {
        match self {
            LogLevel::Error => Severity::Error,
            LogLevel::Warning => Severity::Warning,
            LogLevel::Info => Severity::Info,
            LogLevel::Debug => Severity::Debug,
        }
    }
}

/// Builds the root logger used throughout the networking core. Destination is always stderr,
/// matching the host application's expectation that game logs never pollute stdout.
pub fn root_logger(level: LogLevel) -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(level.severity());
    builder.destination(Destination::Stderr);
    builder.build().unwrap_or_else(|_| Logger::root(slog::Discard, slog::o!()))
}

/// A logger that discards everything, for tests and embedders that don't care.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}
