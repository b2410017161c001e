//! # LSKV - DriftKV Log-Structured Key-Value Store
//!
//! Durable key/value storage with latest-write-wins semantics, built on the
//! append-only segment files of the [`segment`] crate.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                    STORE                      │
//! │                                               │
//! │ put/delete → encode record → append to tail   │
//! │                  |                            │
//! │                  |  (tail would overflow?)    │
//! │                  |            yes             │
//! │                  v                            │
//! │           roll over → new tail segment        │
//! │                                               │
//! │ get → keydir lookup → read_at(segment,offset) │
//! │                                               │
//! │ merge() → rewrite live keys → swap segments   │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Segment lifecycle
//!
//! A segment is *writable* while it is the tail, *sealed* once a rollover
//! creates a newer tail, and *replaced* when a merge swaps in a fresh set.
//! Sealed segments are never rewritten in place.
//!
//! ## Recovery
//!
//! On [`Store::open`] every `datafile-<n>.data` file in the base directory is
//! replayed oldest-first from offset 0: each PUT installs its location in the
//! keydir, each tombstone removes its key. A truncated or corrupt record
//! surfaces [`KvError::Corrupt`] so operators can intervene.
//!
//! ## Concurrency
//!
//! One exclusive lock inside the handle covers put, get, delete, and merge,
//! so within a single [`Store`] those operations are linearizable and the
//! handle is `Send + Sync`. Behavior across distinct handles over the same
//! directory is undefined.

mod keydir;
mod merge;

pub use keydir::{KeyDir, Location};

use segment::{parse_segment_number, Record, Segment, SegmentError, Tag};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by the store.
#[derive(Debug, Error)]
pub enum KvError {
    /// The key is absent (or was deleted). A normal outcome, never logged
    /// as an error.
    #[error("key not found")]
    NotFound,

    /// A record failed CRC validation, or a segment ends in a torn record.
    #[error("corrupt segment data")]
    Corrupt,

    /// An underlying filesystem error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The internal lock was poisoned by a panicking thread.
    #[error("store lock poisoned")]
    Poisoned,
}

impl From<SegmentError> for KvError {
    fn from(e: SegmentError) -> Self {
        match e {
            SegmentError::Io(io) => KvError::Io(io),
            // A short buffer at this layer means a truncated record on disk.
            SegmentError::Corrupt | SegmentError::ShortBuffer => KvError::Corrupt,
        }
    }
}

/// A handle to one log-structured store directory.
///
/// All state lives behind a single exclusive lock, so the handle can be
/// shared across threads (`Arc<Store>`) and every operation takes `&self`.
pub struct Store {
    inner: Mutex<StoreInner>,
}

pub(crate) struct StoreInner {
    pub(crate) base: PathBuf,
    pub(crate) max_segment_size: u64,
    /// All segments, oldest first. The last element is the writable tail.
    pub(crate) segments: Vec<Segment>,
    pub(crate) keydir: KeyDir,
    /// Number the next created segment file will carry.
    pub(crate) next_number: u64,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.lock() {
            Ok(inner) => f
                .debug_struct("Store")
                .field("base", &inner.base)
                .field("segments", &inner.segments.len())
                .field("live_keys", &inner.keydir.len())
                .finish(),
            Err(_) => f.write_str("Store { <poisoned> }"),
        }
    }
}

impl Store {
    /// Opens (or creates) the store rooted at `base`.
    ///
    /// Existing `datafile-<n>.data` segments are replayed in numeric order to
    /// rebuild the keydir. Leftover `.tmp` files from an interrupted merge
    /// are removed. If the directory holds no segments, `datafile-1.data` is
    /// created.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Corrupt`] if any segment ends in a truncated or
    /// CRC-invalid record (the documented default: surface the damage rather
    /// than silently truncating), or [`KvError::Io`] for filesystem failures.
    pub fn open<P: AsRef<Path>>(base: P, max_segment_size: u64) -> Result<Self, KvError> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base)?;

        Self::cleanup_tmp_files(&base);

        // Enumerate segments by the number in the filename, oldest first.
        let mut numbered: Vec<(u64, PathBuf)> = fs::read_dir(&base)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                let n = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(parse_segment_number)?;
                Some((n, path))
            })
            .collect();
        numbered.sort_by_key(|(n, _)| *n);

        let mut segments = Vec::with_capacity(numbered.len());
        let mut keydir = KeyDir::new();
        let mut next_number = 1;

        for (n, path) in numbered {
            let mut seg = Segment::open_path(&path, max_segment_size)?;
            replay_segment(&mut seg, segments.len(), &mut keydir)?;
            segments.push(seg);
            next_number = n + 1;
        }

        if segments.is_empty() {
            segments.push(Segment::create(&base, 1, max_segment_size)?);
            next_number = 2;
        }

        tracing::info!(
            base = %base.display(),
            segments = segments.len(),
            live_keys = keydir.len(),
            "store opened"
        );

        Ok(Self {
            inner: Mutex::new(StoreInner {
                base,
                max_segment_size,
                segments,
                keydir,
                next_number,
            }),
        })
    }

    /// Inserts or overwrites a key.
    ///
    /// Rolls over to a fresh tail segment first if the append would push the
    /// current tail past `max_segment_size`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        let encoded = Record::put(key.to_vec(), value.to_vec()).encode();

        let mut inner = self.lock()?;
        let tail = inner.roll_if_needed(encoded.len())?;
        let offset = inner.segments[tail].append(&encoded)?;
        inner.keydir.insert(
            key.to_vec(),
            Location {
                segment: tail,
                offset,
            },
        );
        Ok(())
    }

    /// Looks up the latest value for `key`.
    ///
    /// # Errors
    ///
    /// [`KvError::NotFound`] if the key is absent or deleted;
    /// [`KvError::Corrupt`] if the record at the stored location fails CRC
    /// validation.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, KvError> {
        let mut inner = self.lock()?;
        let loc = inner.keydir.get(key).ok_or(KvError::NotFound)?;
        let record = inner.segments[loc.segment].read_at(loc.offset)?;
        // The keydir never points at tombstones; treat one as a miss anyway.
        if record.tag == Tag::Tombstone {
            return Err(KvError::NotFound);
        }
        Ok(record.value)
    }

    /// Deletes `key` by appending a tombstone.
    ///
    /// If the key is already absent no tombstone is written and
    /// [`KvError::NotFound`] is returned, keeping deletes observable.
    pub fn delete(&self, key: &[u8]) -> Result<(), KvError> {
        let mut inner = self.lock()?;
        if !inner.keydir.contains(key) {
            return Err(KvError::NotFound);
        }

        let encoded = Record::tombstone(key.to_vec()).encode();
        let tail = inner.roll_if_needed(encoded.len())?;
        inner.segments[tail].append(&encoded)?;
        inner.keydir.remove(key);
        Ok(())
    }

    /// Number of live keys.
    pub fn live_keys(&self) -> Result<usize, KvError> {
        Ok(self.lock()?.keydir.len())
    }

    /// All live keys, sorted ascending.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>, KvError> {
        let inner = self.lock()?;
        let mut keys: Vec<Vec<u8>> = inner.keydir.iter().map(|(k, _)| k.clone()).collect();
        keys.sort();
        Ok(keys)
    }

    /// Number of segment files currently backing the store.
    pub fn segment_count(&self) -> Result<usize, KvError> {
        Ok(self.lock()?.segments.len())
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, KvError> {
        self.inner.lock().map_err(|_| KvError::Poisoned)
    }

    /// Best-effort removal of `.tmp` leftovers from an interrupted merge.
    fn cleanup_tmp_files(base: &Path) {
        if let Ok(entries) = fs::read_dir(base) {
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.extension().map(|e| e == "tmp").unwrap_or(false) {
                    let _ = fs::remove_file(&path);
                }
            }
        }
    }
}

impl StoreInner {
    /// Returns the index of the writable tail, creating a fresh segment
    /// first if appending `incoming` bytes would overflow the current one.
    fn roll_if_needed(&mut self, incoming: usize) -> Result<usize, KvError> {
        let overflow = match self.segments.last() {
            Some(tail) => tail.size() + incoming as u64 > self.max_segment_size,
            None => true,
        };
        if overflow {
            let n = self.next_number;
            self.segments
                .push(Segment::create(&self.base, n, self.max_segment_size)?);
            self.next_number += 1;
            tracing::debug!(segment = n, "rolled over to new tail segment");
        }
        Ok(self.segments.len() - 1)
    }
}

/// Replays one segment from offset 0, installing PUT locations and removing
/// tombstoned keys.
///
/// Advances by each record's declared total length. A record that is torn
/// (short read) or fails CRC validation surfaces [`KvError::Corrupt`].
pub(crate) fn replay_segment(
    seg: &mut Segment,
    segment_index: usize,
    keydir: &mut KeyDir,
) -> Result<(), KvError> {
    let mut offset = 0;
    while offset < seg.size() {
        let record = match seg.read_at(offset) {
            Ok(r) => r,
            Err(SegmentError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(KvError::Corrupt);
            }
            Err(e) => return Err(e.into()),
        };
        match record.tag {
            Tag::Put => keydir.insert(
                record.key.clone(),
                Location {
                    segment: segment_index,
                    offset,
                },
            ),
            Tag::Tombstone => {
                keydir.remove(&record.key);
            }
        }
        offset += record.encoded_len() as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests;
