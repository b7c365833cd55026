//! Size-limited reads of targets and rule inputs.
//!
//! Targets are loaded whole into memory. [`IOLimits`] is unlimited unless a
//! configuration sets it; a file over either limit is refused rather than
//! analyzed from a partial copy.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::triage::config::IOConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IOLimits {
    /// Bytes that may be read from a single file.
    pub max_read_bytes: u64,
    /// Files larger than this are refused outright.
    pub max_file_size: u64,
}

impl Default for IOLimits {
    fn default() -> Self {
        IOConfig::default().limits()
    }
}

/// Reader that reports end of input once `limit` bytes have been returned.
pub struct CappedReader<R> {
    inner: R,
    consumed: u64,
    limit: u64,
}

impl<R: Read> CappedReader<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            consumed: 0,
            limit,
        }
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn exhausted(&self) -> bool {
        self.consumed >= self.limit
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CappedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.limit.saturating_sub(self.consumed);
        if remaining == 0 {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..want])?;
        self.consumed += n as u64;
        Ok(n)
    }
}

/// An opened target whose size has already been checked.
pub struct TargetFile {
    path: PathBuf,
    file: File,
    size: u64,
    limits: IOLimits,
}

impl TargetFile {
    /// Open `path`, refusing directories and files over either limit.
    pub fn open(path: &Path, limits: IOLimits) -> io::Result<Self> {
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        if metadata.is_dir() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "is a directory"));
        }

        let size = metadata.len();
        if size > limits.max_file_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "file too large: {} bytes (limit: {})",
                    size, limits.max_file_size
                ),
            ));
        }
        if size > limits.max_read_bytes {
            return Err(over_read_limit(limits.max_read_bytes));
        }

        debug!(path = %path.display(), size, "opened target");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
            limits,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read the whole file. Fails instead of truncating when the file grew
    /// past `max_read_bytes` after it was opened.
    pub fn read_all(self) -> io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(usize::try_from(self.size).unwrap_or(0));
        let mut reader = CappedReader::new(self.file, self.limits.max_read_bytes);
        reader.read_to_end(&mut data)?;

        if reader.exhausted() {
            let mut extra = [0u8; 1];
            if reader.into_inner().read(&mut extra)? > 0 {
                debug!(path = %self.path.display(), "file grew past the read limit");
                return Err(over_read_limit(self.limits.max_read_bytes));
            }
        }
        Ok(data)
    }
}

fn over_read_limit(limit: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("file exceeds read limit of {} bytes", limit),
    )
}

/// Load a whole file under `limits`.
pub fn read_bounded(path: &Path, limits: &IOLimits) -> io::Result<Vec<u8>> {
    TargetFile::open(path, limits.clone())?.read_all()
}
