use super::{DeviceLink, DeviceWriter};
use crate::{Error, Result};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct FakeSerialEntry {
    response: Result<Vec<u8>>,
    delay: Option<Duration>,
}

impl FakeSerialEntry {
    pub fn immediate(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            response: Ok(bytes.into()),
            delay: None,
        }
    }

    pub fn with_delay(bytes: impl Into<Vec<u8>>, delay: Duration) -> Self {
        Self {
            response: Ok(bytes.into()),
            delay: Some(delay),
        }
    }

    /// A poll that returns no data.
    pub fn empty() -> Self {
        Self::immediate(Vec::new())
    }

    pub fn error(err: Error) -> Self {
        Self {
            response: Err(err),
            delay: None,
        }
    }
}

/// Everything written to a [`FakeSerialPort`], shared with its writers.
#[derive(Clone, Default)]
pub struct WriteLog {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    flushes: Arc<Mutex<usize>>,
}

impl WriteLog {
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// All written bytes joined and decoded lossily, for assertions.
    pub fn text(&self) -> String {
        let joined: Vec<u8> = self.writes().concat();
        String::from_utf8_lossy(&joined).into_owned()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.lock().map(|f| *f).unwrap_or(0)
    }
}

/// Scripted device used in tests: each read pops one entry, writes are recorded.
///
/// Once the script runs dry reads fail instead of returning `Ok(0)` forever, so a
/// session that never sees a terminating marker errors out rather than hanging.
#[derive(Default)]
pub struct FakeSerialPort {
    script: VecDeque<FakeSerialEntry>,
    log: WriteLog,
}

impl FakeSerialPort {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self::with_script(chunks.into_iter().map(FakeSerialEntry::immediate).collect())
    }

    pub fn with_script(script: Vec<FakeSerialEntry>) -> Self {
        Self {
            script: script.into(),
            log: WriteLog::default(),
        }
    }

    pub fn write_log(&self) -> WriteLog {
        self.log.clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl DeviceLink for FakeSerialPort {
    type Writer = FakeWriter;

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let entry = self.script.pop_front().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "fake serial script exhausted",
            ))
        })?;
        if let Some(delay) = entry.delay {
            std::thread::sleep(delay);
        }
        let bytes = entry.response?;
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        if n < bytes.len() {
            self.script
                .push_front(FakeSerialEntry::immediate(bytes[n..].to_vec()));
        }
        Ok(n)
    }

    fn writer(&self) -> Result<FakeWriter> {
        Ok(FakeWriter {
            log: self.log.clone(),
        })
    }
}

pub struct FakeWriter {
    log: WriteLog,
}

impl DeviceWriter for FakeWriter {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.log
            .writes
            .lock()
            .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::Other, "write log poisoned")))?
            .push(bytes.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Ok(mut count) = self.log.flushes.lock() {
            *count += 1;
        }
        Ok(())
    }
}
