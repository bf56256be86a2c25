//! Outer measurement loop: power-cycle the device, run a session, repeat.

use super::session::{Runner, SessionOutcome, SessionReport, Termination};
use crate::{
    capture::{measurement_path, CaptureSink, FileSink, MemorySink},
    power::{PowerLine, PowerSwitch},
    serial::DeviceLink,
    Result,
};
use std::time::Duration;
use tracing::{info, warn};

/// Totals for one `run_forever` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: u32,
    pub power_cycles: u32,
    pub panics: u32,
}

pub struct MeasurementDriver<L: DeviceLink, P: PowerLine> {
    runner: Runner<L>,
    power: PowerSwitch<P>,
    dwell: Duration,
    prefix: String,
}

impl<L: DeviceLink, P: PowerLine> MeasurementDriver<L, P> {
    pub fn new(runner: Runner<L>, power: PowerSwitch<P>, dwell: Duration, prefix: String) -> Self {
        Self {
            runner,
            power,
            dwell,
            prefix,
        }
    }

    pub fn runner(&self) -> &Runner<L> {
        &self.runner
    }

    /// Power off for the dwell time, then back on, so the next session starts
    /// from a cold device.
    pub fn power_cycle(&mut self) -> Result<()> {
        self.power.cycle(self.dwell)
    }

    /// Measure until the runner reports the limit; with no limit this only
    /// returns on error.
    pub fn run_forever(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        loop {
            let path = measurement_path(&self.prefix, self.runner.measurement_count());
            let mut sink = FileSink::create(&path)?;
            info!(path = %path.display(), "starting measurement");

            let report = self.cycle_once(&mut sink, &mut summary)?;
            sink.finalize()?;
            summary.completed += report.completed;

            if report.outcome == SessionOutcome::LimitReached {
                info!(
                    completed = summary.completed,
                    power_cycles = summary.power_cycles,
                    panics = summary.panics,
                    "measurement run complete"
                );
                return Ok(summary);
            }
        }
    }

    /// Repeat cycles until one response is completely captured and return it.
    pub fn capture_once(&mut self) -> Result<Vec<u8>> {
        let mut summary = RunSummary::default();
        loop {
            let mut sink = MemorySink::new();
            let report = self.cycle_once(&mut sink, &mut summary)?;
            if report.completed > 0 {
                info!(
                    bytes = sink.bytes().len(),
                    attempts = summary.power_cycles,
                    "response captured"
                );
                return Ok(sink.into_bytes());
            }
            warn!(
                termination = ?report.termination,
                "session ended without a complete response; retrying"
            );
        }
    }

    fn cycle_once(
        &mut self,
        sink: &mut dyn CaptureSink,
        summary: &mut RunSummary,
    ) -> Result<SessionReport> {
        self.power_cycle()?;
        summary.power_cycles += 1;
        let report = self.runner.run_session(sink)?;
        if report.termination == Termination::Panic {
            summary.panics += 1;
            warn!("device panic; power-cycling and retrying");
        }
        Ok(report)
    }
}
