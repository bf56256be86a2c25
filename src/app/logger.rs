use crate::{Error, Result};
use serde::Deserialize;
use std::fs::OpenOptions;
use std::str::FromStr;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(Error::InvalidArgs(format!(
                "invalid log level '{other}', expected error|warn|info|debug|trace"
            ))),
        }
    }
}

/// Filter from `RUST_LOG` when set, otherwise from `level`. A malformed
/// `RUST_LOG` is an error rather than a silent fallback.
pub fn build_filter(level: LogLevel, rust_log: Option<&str>) -> Result<EnvFilter> {
    match rust_log.filter(|raw| !raw.trim().is_empty()) {
        Some(raw) => EnvFilter::try_new(raw)
            .map_err(|err| Error::Logging(format!("invalid RUST_LOG '{raw}': {err}"))),
        None => Ok(EnvFilter::new(level.as_str())),
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `level`; with `file`
/// set, log lines are appended there instead of going to stderr.
///
/// A subscriber installed earlier (tests, embedding callers) stays in place.
/// Any other installation failure is returned.
pub fn init_logging(level: LogLevel, file: Option<&str>) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(level, rust_log.as_deref())?;
    let file = file
        .map(|path| OpenOptions::new().create(true).append(true).open(path))
        .transpose()?;
    if tracing::dispatcher::has_been_set() {
        tracing::debug!("global subscriber already installed; keeping it");
        return Ok(());
    }
    let installed = match file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(Mutex::new(file))
            .try_init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    match installed {
        Ok(()) => Ok(()),
        // Someone else won the race, or only the `log` bridge failed.
        Err(_) if tracing::dispatcher::has_been_set() => Ok(()),
        Err(err) => Err(Error::Logging(err.to_string())),
    }
}
