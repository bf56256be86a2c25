//! Device power control over a single GPIO output.

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    Low,
}

impl Level {
    pub fn opposite(self) -> Self {
        match self {
            Level::High => Level::Low,
            Level::Low => Level::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::High => "high",
            Level::Low => "low",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" | "1" => Ok(Level::High),
            "low" | "0" => Ok(Level::Low),
            other => Err(format!("invalid level '{other}', expected high|low")),
        }
    }
}

/// A digital output that can be driven high or low.
pub trait PowerLine {
    fn set_level(&mut self, level: Level) -> Result<()>;
}

/// Switches device power through a [`PowerLine`]. The level that cuts power is
/// wiring specific, so it is configured rather than assumed.
pub struct PowerSwitch<P> {
    line: P,
    off_level: Level,
}

impl<P: PowerLine> PowerSwitch<P> {
    pub fn new(line: P, off_level: Level) -> Self {
        Self { line, off_level }
    }

    pub fn power_off(&mut self) -> Result<()> {
        self.line.set_level(self.off_level)
    }

    pub fn power_on(&mut self) -> Result<()> {
        self.line.set_level(self.off_level.opposite())
    }

    /// Cut power, wait `dwell`, restore power.
    pub fn cycle(&mut self, dwell: Duration) -> Result<()> {
        info!("cutting device power for {:.1}s", dwell.as_secs_f32());
        self.power_off()?;
        std::thread::sleep(dwell);
        info!("restoring device power");
        self.power_on()
    }
}

#[cfg(target_os = "linux")]
pub struct GpioPowerLine {
    pin: rppal::gpio::OutputPin,
}

#[cfg(target_os = "linux")]
impl GpioPowerLine {
    pub fn open(pin: u8) -> Result<Self> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| Error::Gpio(e.to_string()))?;
        let output = gpio
            .get(pin)
            .map_err(|e| Error::Gpio(format!("pin {pin}: {e}")))?
            .into_output();
        Ok(Self { pin: output })
    }
}

#[cfg(target_os = "linux")]
impl PowerLine for GpioPowerLine {
    fn set_level(&mut self, level: Level) -> Result<()> {
        match level {
            Level::High => self.pin.set_high(),
            Level::Low => self.pin.set_low(),
        }
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
pub struct GpioPowerLine;

#[cfg(not(target_os = "linux"))]
impl GpioPowerLine {
    pub fn open(_pin: u8) -> Result<Self> {
        Err(Error::Gpio("gpio power control unsupported on this platform".into()))
    }
}

#[cfg(not(target_os = "linux"))]
impl PowerLine for GpioPowerLine {
    fn set_level(&mut self, _level: Level) -> Result<()> {
        Err(Error::Gpio("gpio power control unsupported on this platform".into()))
    }
}

/// Records every level it is driven to; used by tests and dry runs.
#[derive(Clone, Default)]
pub struct RecordingPowerLine {
    levels: Arc<Mutex<Vec<Level>>>,
}

impl RecordingPowerLine {
    pub fn levels(&self) -> Vec<Level> {
        self.levels.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Number of times the line was driven to `off_level`.
    pub fn off_count(&self, off_level: Level) -> usize {
        self.levels().iter().filter(|l| **l == off_level).count()
    }
}

impl PowerLine for RecordingPowerLine {
    fn set_level(&mut self, level: Level) -> Result<()> {
        self.levels
            .lock()
            .map_err(|_| Error::Gpio("recorded levels poisoned".into()))?
            .push(level);
        Ok(())
    }
}
