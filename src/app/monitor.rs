use std::io::Write;

/// Live view of the device's console output for whoever is watching the run.
///
/// Purely diagnostic: write failures are ignored and nothing here affects what
/// gets captured.
pub struct LiveMonitor {
    out: Box<dyn Write + Send>,
}

impl LiveMonitor {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Discards everything.
    pub fn silent() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    pub fn echo(&mut self, byte: u8) {
        let _ = self.out.write_all(&[printable(byte)]);
    }

    pub fn progress(&mut self, captured: usize) {
        let _ = write!(self.out, "\r{captured} bytes written.");
        let _ = self.out.flush();
    }

    pub fn finish(&mut self) {
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }
}

/// Printable ASCII, `\n` and `\r` pass through; anything else becomes a space.
pub fn printable(byte: u8) -> u8 {
    match byte {
        b'\n' | b'\r' | 0x20..=0x7e => byte,
        _ => b' ',
    }
}
