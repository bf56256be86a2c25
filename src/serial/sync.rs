use super::{DeviceLink, DeviceWriter};
use crate::Result;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::debug;

/// How long one read blocks before reporting "nothing yet".
pub const READ_TIMEOUT_MS: u64 = 100;

/// Serial link to the device, backed by the `serialport` crate.
pub struct SerialPort {
    inner: Box<dyn serialport::SerialPort>,
}

impl SerialPort {
    pub fn connect(device: &str, baud: u32) -> Result<Self> {
        let inner = serialport::new(device, baud)
            .timeout(Duration::from_millis(READ_TIMEOUT_MS))
            .open()?;
        debug!(device, baud, "serial port opened");
        Ok(Self { inner })
    }
}

impl DeviceLink for SerialPort {
    type Writer = SerialWriter;

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => Ok(n),
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn writer(&self) -> Result<SerialWriter> {
        Ok(SerialWriter {
            inner: self.inner.try_clone()?,
        })
    }
}

/// Cloned handle to the same port, used from the feeder thread.
pub struct SerialWriter {
    inner: Box<dyn serialport::SerialPort>,
}

impl DeviceWriter for SerialWriter {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}
