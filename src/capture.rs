//! Destinations for captured PUF responses.

use crate::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Byte-appendable destination for one measurement.
///
/// `finalize` flushes and closes the sink; after that every `append` fails with
/// [`Error::SinkFinalized`]. Finalizing twice is a no-op.
pub trait CaptureSink {
    fn append(&mut self, bytes: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn finalize(&mut self) -> Result<()>;
    fn is_finalized(&self) -> bool;
}

/// `{prefix}{index}.bin`
pub fn measurement_path(prefix: &str, index: u32) -> PathBuf {
    PathBuf::from(format!("{prefix}{index}.bin"))
}

pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaptureSink for FileSink {
    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::SinkFinalized)?;
        writer.write_all(bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn is_finalized(&self) -> bool {
        self.writer.is_none()
    }
}

/// In-memory capture used when a single response is turned into a key.
#[derive(Debug, Default)]
pub struct MemorySink {
    bytes: Vec<u8>,
    finalized: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl CaptureSink for MemorySink {
    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if self.finalized {
            return Err(Error::SinkFinalized);
        }
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.finalized = true;
        Ok(())
    }

    fn is_finalized(&self) -> bool {
        self.finalized
    }
}
