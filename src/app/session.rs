//! One device session: read the stream, capture the framed response, feed
//! parameters, and stop on FINISHED or PANIC.

use super::feeder::ParameterFeeder;
use super::monitor::LiveMonitor;
use crate::{
    capture::CaptureSink,
    protocol::{FrameDecoder, Marker},
    serial::DeviceLink,
    Result,
};
use crc32fast::Hasher;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const READ_BUFFER_SIZE: usize = 1024;

/// Captured bytes between sink flushes and progress updates.
pub const FLUSH_INTERVAL: usize = 4096;

/// Whether the measurement loop should keep going after a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Continue,
    LimitReached,
}

/// Marker that ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Finished,
    Panic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub termination: Termination,
    /// END markers seen during this session.
    pub completed: u32,
    pub captured_bytes: usize,
    pub parameters_sent: usize,
}

/// Drives sessions against one device link.
///
/// The measurement counter lives here so it survives across sessions: it names
/// output files and is checked against the configured limit.
pub struct Runner<L: DeviceLink> {
    link: L,
    params: Vec<String>,
    max_measures: u32,
    settle: Duration,
    measurement_count: u32,
    monitor: LiveMonitor,
}

impl<L: DeviceLink> Runner<L> {
    pub fn new(link: L, params: Vec<String>, max_measures: u32, settle: Duration) -> Self {
        Self {
            link,
            params,
            max_measures,
            settle,
            measurement_count: 0,
            monitor: LiveMonitor::stdout(),
        }
    }

    pub fn with_monitor(mut self, monitor: LiveMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn measurement_count(&self) -> u32 {
        self.measurement_count
    }

    /// `max_measures == 0` never limits.
    pub fn limit_reached(&self) -> bool {
        self.max_measures > 0 && self.measurement_count >= self.max_measures
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Process the stream until FINISHED or PANIC. Empty reads are polled again.
    pub fn run_session(&mut self, sink: &mut dyn CaptureSink) -> Result<SessionReport> {
        let mut decoder = FrameDecoder::new();
        let mut feeder: Option<ParameterFeeder> = None;
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let mut crc = Hasher::new();
        let mut captured = 0usize;
        let mut completed = 0u32;
        let mut parameters_sent = 0usize;
        // An ASK_INPUT no feeder could take; the next feeder answers it at once.
        let mut pending_ask = false;

        let termination = 'read: loop {
            let n = self.link.read_bytes(&mut buf)?;
            if n == 0 {
                continue;
            }

            for &byte in &buf[..n] {
                let was_capturing = decoder.is_capturing();
                if !was_capturing {
                    self.monitor.echo(byte);
                }
                let decoded = decoder.push(byte);
                if let Some(b) = decoded.data {
                    if !sink.is_finalized() {
                        sink.append(&[b])?;
                        crc.update(&[b]);
                        captured += 1;
                        if captured % FLUSH_INTERVAL == 0 {
                            sink.flush()?;
                            self.monitor.progress(captured);
                        }
                    }
                }
                let Some(marker) = decoded.marker else {
                    continue;
                };
                debug!(%marker, "marker");

                match marker {
                    Marker::Start => {
                        if let Some(active) = feeder.take() {
                            parameters_sent += join_feeder(active);
                        }
                        if was_capturing {
                            debug!("start marker inside a capture; bytes kept");
                        } else if sink.is_finalized() {
                            crc = Hasher::new();
                            warn!("capture restarted after the sink was finalized; discarding its bytes");
                        } else {
                            crc = Hasher::new();
                            info!("capture started");
                        }
                    }
                    Marker::End => {
                        self.measurement_count += 1;
                        completed += 1;
                        sink.flush()?;
                        sink.finalize()?;
                        let fingerprint = std::mem::replace(&mut crc, Hasher::new()).finalize();
                        info!(
                            measurement = self.measurement_count,
                            crc32 = %format!("{fingerprint:08x}"),
                            "{captured} bytes in total written"
                        );
                        if self.limit_reached() {
                            info!(
                                "measurement limit of {} reached; stopping after this session",
                                self.max_measures
                            );
                        }
                    }
                    Marker::Loaded => {
                        if let Some(previous) = feeder.take() {
                            parameters_sent += join_feeder(previous);
                        }
                        debug!(count = self.params.len(), "device loaded; starting parameter feed");
                        let spawned = ParameterFeeder::spawn(
                            self.link.writer()?,
                            self.params.clone(),
                            self.settle,
                        )?;
                        if std::mem::take(&mut pending_ask) {
                            debug!("answering input request made before the feeder started");
                            spawned.signal_ready();
                        }
                        feeder = Some(spawned);
                    }
                    Marker::AskInput => {
                        let delivered = feeder.as_ref().is_some_and(|active| active.signal_ready());
                        if !delivered {
                            debug!("device asked for input with no feeder running; keeping the request");
                            pending_ask = true;
                        }
                    }
                    Marker::Finished => {
                        if let Some(active) = feeder.take() {
                            parameters_sent += join_feeder(active);
                        }
                        info!("device finished");
                        break 'read Termination::Finished;
                    }
                    Marker::Panic => {
                        if let Some(active) = feeder.take() {
                            parameters_sent += join_feeder(active);
                        }
                        sink.flush()?;
                        sink.finalize()?;
                        warn!("device panicked; capture abandoned after {captured} bytes");
                        break 'read Termination::Panic;
                    }
                }
            }
        };

        self.monitor.finish();
        let outcome = if self.limit_reached() {
            SessionOutcome::LimitReached
        } else {
            SessionOutcome::Continue
        };
        Ok(SessionReport {
            outcome,
            termination,
            completed,
            captured_bytes: captured,
            parameters_sent,
        })
    }
}

fn join_feeder(feeder: ParameterFeeder) -> usize {
    match feeder.join() {
        Ok(sent) => sent,
        Err(err) => {
            warn!("parameter feeder failed: {err}");
            0
        }
    }
}
