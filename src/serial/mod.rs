pub mod fake;
pub mod sync;

pub use sync::SerialPort;

use crate::Result;

/// Write half of the device link. The parameter feeder owns one of these on
/// its own thread while the session keeps reading.
pub trait DeviceWriter: Send + 'static {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Duplex byte channel to the measured device.
pub trait DeviceLink {
    type Writer: DeviceWriter;

    /// Read whatever is available. `Ok(0)` means nothing arrived yet and the
    /// caller should poll again; it is not end of stream.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// A writer that can be moved to another thread.
    fn writer(&self) -> Result<Self::Writer>;
}

/// Baud rates accepted by the CLI and config file.
pub fn validate_baud(baud: u32) -> Result<u32> {
    if baud == 0 {
        return Err(crate::Error::InvalidArgs(
            "baud must be a positive integer".to_string(),
        ));
    }
    Ok(baud)
}
