//! Logging setup for hosts embedding the engine.
//!
//! The engine itself only emits `tracing` events; this module wires a
//! global subscriber for binaries that do not bring their own.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// The `EnvFilter` directive for this level.
    pub fn filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Initialize a global tracing subscriber writing to stderr.
///
/// Respects the `RUST_LOG` environment variable, falling back to the
/// given default level. Call once at startup; later calls are ignored.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.filter_str()));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_strings_match_levels() {
        assert_eq!(LogLevel::Error.filter_str(), "error");
        assert_eq!(LogLevel::Debug.filter_str(), "debug");
    }

    #[test]
    fn init_is_idempotent() {
        init_tracing(LogLevel::Info);
        init_tracing(LogLevel::Debug);
        tracing::debug!("logging initialized twice without panicking");
    }
}
