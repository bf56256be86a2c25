//! Config file and merged run configuration.

use crate::app::feeder::DEFAULT_SETTLE_MS;
use crate::app::logger::LogLevel;
use crate::cli::CommonOptions;
use crate::power::Level;
use crate::{serial, Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD: u32 = 115_200;
/// BCM numbering.
pub const DEFAULT_POWER_GPIO: u8 = 17;
pub const DEFAULT_POWER_OFF_SECS: u64 = 5;
pub const DEFAULT_OUT_PREFIX: &str = "puf_";
pub const CONFIG_ENV: &str = "PUFREADER_CONFIG";

/// Contents of `config.toml`; every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub device: String,
    pub baud: u32,
    pub power_gpio: u8,
    pub power_off_level: Level,
    pub power_off_secs: u64,
    pub params: Vec<String>,
    pub max_measures: u32,
    pub out_prefix: String,
    pub settle_ms: u64,
    pub log_level: LogLevel,
    pub log_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            baud: DEFAULT_BAUD,
            power_gpio: DEFAULT_POWER_GPIO,
            power_off_level: Level::High,
            power_off_secs: DEFAULT_POWER_OFF_SECS,
            params: Vec::new(),
            max_measures: 0,
            out_prefix: DEFAULT_OUT_PREFIX.to_string(),
            settle_ms: DEFAULT_SETTLE_MS,
            log_level: LogLevel::Info,
            log_file: None,
        }
    }
}

impl Config {
    /// `$PUFREADER_CONFIG`, else `$HOME/.config/pufreader/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("pufreader")
                .join("config.toml")
        })
    }

    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// Everything one run needs, fixed before the first power-cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub device: String,
    pub baud: u32,
    pub power_gpio: u8,
    pub power_off_level: Level,
    pub power_off: Duration,
    pub params: Vec<String>,
    /// 0 = unbounded.
    pub max_measures: u32,
    pub out_prefix: String,
    pub settle: Duration,
}

impl SessionConfig {
    /// CLI values win over the config file. Parameters given on the command
    /// line replace the file's list rather than extending it.
    pub fn from_sources(config: Config, opts: &CommonOptions) -> Result<Self> {
        let device = opts.device.clone().unwrap_or(config.device);
        if device.trim().is_empty() {
            return Err(Error::InvalidArgs("device must not be empty".to_string()));
        }
        let baud = serial::validate_baud(opts.baud.unwrap_or(config.baud))?;
        let params = if opts.params.is_empty() {
            config.params
        } else {
            opts.params.clone()
        };
        Ok(Self {
            device,
            baud,
            power_gpio: opts.power_gpio.unwrap_or(config.power_gpio),
            power_off_level: opts.power_off_level.unwrap_or(config.power_off_level),
            power_off: Duration::from_secs(opts.power_off_secs.unwrap_or(config.power_off_secs)),
            params,
            max_measures: opts.max_measures.unwrap_or(config.max_measures),
            out_prefix: opts.out_prefix.clone().unwrap_or(config.out_prefix),
            settle: Duration::from_millis(opts.settle_ms.unwrap_or(config.settle_ms)),
        })
    }
}
