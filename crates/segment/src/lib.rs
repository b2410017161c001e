//! # Segment — Append-Only Data Files
//!
//! Provides the durable byte layer for the DriftKV store: framed records
//! (see [`record`]) appended to numbered segment files.
//!
//! A segment is an append-only concatenation of encoded records. It is never
//! rewritten in place: the write offset only grows, and equals the total
//! bytes successfully appended. When an append would push a segment past its
//! configured maximum size, the engine seals it and opens a new tail segment.
//!
//! ## File naming
//!
//! Segments are named `datafile-<n>.data` with `n` starting at 1 and
//! incrementing in creation order.
//!
//! ## Example
//!
//! ```rust,no_run
//! use segment::{Record, Segment};
//!
//! let mut seg = Segment::create("data", 1, 2 * 1024 * 1024).unwrap();
//! let rec = Record::put(b"name".to_vec(), b"alice".to_vec());
//! let offset = seg.append(&rec.encode()).unwrap();
//! assert_eq!(seg.read_at(offset).unwrap(), rec);
//! ```

mod record;

pub use record::{Record, Tag, HEADER_SIZE};

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while encoding, decoding, or reading segment data.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed CRC validation or carried an unknown tag.
    #[error("corrupt record")]
    Corrupt,

    /// The input was too small for the record length it declares.
    #[error("buffer too short for record")]
    ShortBuffer,
}

/// Formats the file name for segment number `n` (1-based).
pub fn segment_file_name(n: u64) -> String {
    format!("datafile-{}.data", n)
}

/// Parses the segment number out of a `datafile-<n>.data` file name.
///
/// Returns `None` for anything that does not match the naming scheme. The
/// numeric index is what replay orders by; a lexicographic sort would put
/// `datafile-10` before `datafile-2`.
pub fn parse_segment_number(name: &str) -> Option<u64> {
    let rest = name.strip_prefix("datafile-")?;
    let digits = rest.strip_suffix(".data")?;
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// One append-only data file.
///
/// Owns the backing file handle and tracks the current write offset, which is
/// kept equal to the file size. Reads seek through the same handle, so all
/// methods take `&mut self`; the engine above serializes access.
pub struct Segment {
    path: PathBuf,
    file: File,
    offset: u64,
    max_size: u64,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("path", &self.path)
            .field("offset", &self.offset)
            .field("max_size", &self.max_size)
            .finish()
    }
}

impl Segment {
    /// Creates segment number `n` inside `dir` (or opens it if it already
    /// exists), with the write offset positioned at the current file size.
    pub fn create<P: AsRef<Path>>(dir: P, n: u64, max_size: u64) -> Result<Self, SegmentError> {
        Self::open_path(dir.as_ref().join(segment_file_name(n)), max_size)
    }

    /// Opens the segment file at `path`, creating it if missing.
    pub fn open_path<P: AsRef<Path>>(path: P, max_size: u64) -> Result<Self, SegmentError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        let offset = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            offset,
            max_size,
        })
    }

    /// Appends `bytes` at the tail, fsyncs, and returns the offset at which
    /// the bytes began.
    pub fn append(&mut self, bytes: &[u8]) -> Result<u64, SegmentError> {
        let start = self.offset;
        self.file.seek(SeekFrom::Start(start))?;
        self.file.write_all(bytes)?;
        self.file.sync_all()?;
        self.offset += bytes.len() as u64;
        Ok(start)
    }

    /// Reads and decodes the record starting at `offset`.
    ///
    /// Reads exactly [`HEADER_SIZE`] bytes, then the payload length the
    /// header declares, then CRC-validates the whole frame.
    ///
    /// # Errors
    ///
    /// A short read propagates as [`SegmentError::Io`] with kind
    /// `UnexpectedEof`; CRC or tag failures surface as
    /// [`SegmentError::Corrupt`].
    pub fn read_at(&mut self, offset: u64) -> Result<Record, SegmentError> {
        self.file.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0u8; HEADER_SIZE];
        self.file.read_exact(&mut buf)?;

        let payload = Record::payload_len(&buf)?;
        buf.resize(HEADER_SIZE + payload, 0);
        self.file.read_exact(&mut buf[HEADER_SIZE..])?;

        Record::decode(&buf)
    }

    /// Reports whether the current offset is at or above the configured
    /// maximum, i.e. the segment should be sealed and a new tail created.
    pub fn should_roll(&self) -> bool {
        self.offset >= self.max_size
    }

    /// Current write offset (equals the file size).
    pub fn size(&self) -> u64 {
        self.offset
    }

    /// Configured maximum size before rollover.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forces buffered data to disk. Appends already sync; this is for
    /// callers that wrote through other means and want a barrier.
    pub fn sync(&mut self) -> Result<(), SegmentError> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
