//! Sends configured parameters to the device, one per "ready" request.

use crate::serial::DeviceWriter;
use crate::{Error, Result};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Pause before and after each parameter write.
pub const DEFAULT_SETTLE_MS: u64 = 50;

/// Sent after every parameter.
pub const LINE_TERMINATOR: &[u8] = b"\r";

/// Controller half of the feeder signal.
///
/// `ready` fills a single slot: asserting it again before the feeder consumed it
/// changes nothing. `cancel` drops the cancellation sender, which every wait on
/// the feeder side observes.
pub struct FeedSignal {
    ready_tx: Sender<()>,
    cancel_tx: Option<Sender<()>>,
}

/// Feeder half of the signal.
pub struct FeedWaiter {
    ready_rx: Receiver<()>,
    cancel_rx: Receiver<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Ready,
    Cancelled,
}

pub fn feed_channel() -> (FeedSignal, FeedWaiter) {
    let (ready_tx, ready_rx) = bounded(1);
    let (cancel_tx, cancel_rx) = bounded(1);
    (
        FeedSignal {
            ready_tx,
            cancel_tx: Some(cancel_tx),
        },
        FeedWaiter {
            ready_rx,
            cancel_rx,
        },
    )
}

impl FeedSignal {
    /// Returns false when the feeder is gone and nobody will see the signal.
    pub fn ready(&self) -> bool {
        match self.ready_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => {
                debug!("ready signal not delivered: feeder already finished");
                false
            }
        }
    }

    pub fn cancel(&mut self) {
        self.cancel_tx.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_tx.is_none()
    }
}

impl FeedWaiter {
    /// Block until the device asks for input or the session cancels the feed.
    /// A request the device already made is answered even if cancellation
    /// arrived in the meantime.
    pub fn wait(&self) -> Wake {
        if self.ready_rx.try_recv().is_ok() {
            return Wake::Ready;
        }
        select! {
            recv(self.ready_rx) -> msg => match msg {
                Ok(()) => Wake::Ready,
                Err(_) => Wake::Cancelled,
            },
            recv(self.cancel_rx) -> _ => match self.ready_rx.try_recv() {
                Ok(()) => Wake::Ready,
                Err(_) => Wake::Cancelled,
            },
        }
    }
}

/// A running feeder thread bound to one LOADED..FINISHED span.
pub struct ParameterFeeder {
    signal: FeedSignal,
    handle: Option<JoinHandle<Result<usize>>>,
}

impl ParameterFeeder {
    pub fn spawn<W: DeviceWriter>(writer: W, params: Vec<String>, settle: Duration) -> Result<Self> {
        let (signal, waiter) = feed_channel();
        let handle = thread::Builder::new()
            .name("param-feeder".into())
            .spawn(move || feed(writer, &params, settle, &waiter))?;
        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    pub fn signal_ready(&self) -> bool {
        self.signal.ready()
    }

    /// Cancel and wait for the thread. Returns how many parameters were sent.
    pub fn join(mut self) -> Result<usize> {
        self.signal.cancel();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Feeder("feeder thread panicked".into()))?,
            None => Ok(0),
        }
    }
}

impl Drop for ParameterFeeder {
    fn drop(&mut self) {
        self.signal.cancel();
        if let Some(handle) = self.handle.take() {
            if let Ok(Err(err)) = handle.join() {
                warn!("parameter feeder stopped with error: {err}");
            }
        }
    }
}

/// Feeder body: one parameter per wake-up, in list order.
pub fn feed<W: DeviceWriter>(
    mut writer: W,
    params: &[String],
    settle: Duration,
    waiter: &FeedWaiter,
) -> Result<usize> {
    let mut sent = 0;
    for (index, param) in params.iter().enumerate() {
        if waiter.wait() == Wake::Cancelled {
            debug!(sent, "parameter feed cancelled");
            return Ok(sent);
        }
        thread::sleep(settle);
        writer.write_bytes(param.as_bytes())?;
        writer.flush()?;
        thread::sleep(settle);
        writer.write_bytes(LINE_TERMINATOR)?;
        writer.flush()?;
        sent += 1;
        debug!(index, param = param.as_str(), "parameter sent");
    }
    debug!(sent, "parameter list exhausted");
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::fake::FakeSerialPort;
    use crate::serial::DeviceLink;
    use std::time::Instant;

    fn params(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn wait_for_writes(log: &crate::serial::fake::WriteLog, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while log.writes().len() < count {
            assert!(Instant::now() < deadline, "timed out waiting for {count} writes");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn repeated_ready_fills_one_slot() {
        let (mut signal, waiter) = feed_channel();
        signal.ready();
        signal.ready();
        assert_eq!(waiter.wait(), Wake::Ready);
        signal.cancel();
        assert_eq!(waiter.wait(), Wake::Cancelled);
    }

    #[test]
    fn pending_ready_is_answered_before_cancellation() {
        let (mut signal, waiter) = feed_channel();
        signal.ready();
        signal.cancel();
        assert!(signal.is_cancelled());
        assert_eq!(waiter.wait(), Wake::Ready);
        assert_eq!(waiter.wait(), Wake::Cancelled);
    }

    #[test]
    fn ready_after_feeder_exit_is_not_delivered() {
        let (signal, waiter) = feed_channel();
        assert!(signal.ready());
        drop(waiter);
        assert!(!signal.ready());
    }

    #[test]
    fn cancel_without_ready_wakes_waiter() {
        let (mut signal, waiter) = feed_channel();
        signal.cancel();
        assert_eq!(waiter.wait(), Wake::Cancelled);
    }

    #[test]
    fn sends_parameters_in_order_one_per_ready() {
        let port = FakeSerialPort::default();
        let log = port.write_log();
        let feeder = ParameterFeeder::spawn(
            port.writer().unwrap(),
            params(&["alpha", "beta", "gamma"]),
            Duration::from_millis(1),
        )
        .unwrap();

        feeder.signal_ready();
        wait_for_writes(&log, 2);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(log.writes().len(), 2, "second parameter sent without a ready");

        feeder.signal_ready();
        wait_for_writes(&log, 4);
        feeder.signal_ready();
        wait_for_writes(&log, 6);

        assert_eq!(feeder.join().unwrap(), 3);
        assert_eq!(log.text(), "alpha\rbeta\rgamma\r");
        assert_eq!(log.flush_count(), 6);
    }

    #[test]
    fn cancelled_before_first_ready_sends_nothing() {
        let port = FakeSerialPort::default();
        let log = port.write_log();
        let feeder = ParameterFeeder::spawn(
            port.writer().unwrap(),
            params(&["alpha", "beta"]),
            Duration::from_millis(1),
        )
        .unwrap();
        assert_eq!(feeder.join().unwrap(), 0);
        assert!(log.writes().is_empty());
    }

    #[test]
    fn empty_list_finishes_immediately() {
        let port = FakeSerialPort::default();
        let feeder =
            ParameterFeeder::spawn(port.writer().unwrap(), Vec::new(), Duration::from_millis(1))
                .unwrap();
        feeder.signal_ready();
        assert_eq!(feeder.join().unwrap(), 0);
    }
}
