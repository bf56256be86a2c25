use crate::{
    cli::{Cli, Command},
    config::{Config, SessionConfig},
    keygen,
    power::{GpioPowerLine, PowerSwitch},
    serial::SerialPort,
    Error, Result,
};
use std::path::PathBuf;
use tracing::info;

pub mod driver;
pub mod feeder;
pub mod logger;
pub mod monitor;
pub mod session;

use driver::MeasurementDriver;
use logger::LogLevel;
use session::Runner;

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Run,
    Keygen { positions: PathBuf, key_len: usize },
}

#[derive(Debug)]
pub struct App {
    config: SessionConfig,
    mode: Mode,
    log_level: LogLevel,
    log_file: Option<String>,
}

impl App {
    /// Merge the config file (from `--config`, or the default location) with
    /// the command line.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let file = match cli.config.as_deref() {
            Some(path) => Config::load_from(path)?,
            None => Config::load_or_default()?,
        };
        Self::from_parts(file, cli.command)
    }

    pub fn from_parts(file: Config, command: Command) -> Result<Self> {
        let common = command.common();
        let log_level = match common.log_level.as_deref() {
            Some(raw) => raw.parse()?,
            None => file.log_level,
        };
        let log_file = common.log_file.clone().or_else(|| file.log_file.clone());
        let config = SessionConfig::from_sources(file, common)?;
        let mode = match command {
            Command::Run(_) if config.out_prefix.is_empty() => {
                return Err(Error::InvalidArgs("output prefix must not be empty".into()));
            }
            Command::Run(_) => Mode::Run,
            Command::Keygen(opts) => Mode::Keygen {
                positions: opts.positions,
                key_len: opts.key_len,
            },
        };
        Ok(Self {
            config,
            mode,
            log_level,
            log_file,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn log_file(&self) -> Option<&str> {
        self.log_file.as_deref()
    }

    pub fn run(&self) -> Result<()> {
        match &self.mode {
            Mode::Run => self.run_measurements(),
            Mode::Keygen { positions, key_len } => {
                let key = keygen::generate_key(&self.config, positions, *key_len)?;
                println!("{key}");
                Ok(())
            }
        }
    }

    fn run_measurements(&self) -> Result<()> {
        let cfg = &self.config;
        info!(
            device = %cfg.device,
            baud = cfg.baud,
            gpio = cfg.power_gpio,
            params = cfg.params.len(),
            max_measures = cfg.max_measures,
            "starting measurement run"
        );
        let link = SerialPort::connect(&cfg.device, cfg.baud)?;
        let line = GpioPowerLine::open(cfg.power_gpio)?;
        let runner = Runner::new(link, cfg.params.clone(), cfg.max_measures, cfg.settle);
        let mut driver = MeasurementDriver::new(
            runner,
            PowerSwitch::new(line, cfg.power_off_level),
            cfg.power_off,
            cfg.out_prefix.clone(),
        );
        driver.run_forever()?;
        Ok(())
    }
}
