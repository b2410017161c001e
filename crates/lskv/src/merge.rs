//! Merge compaction: rewrites the live key set into a fresh segment set.
//!
//! The new set contains exactly one PUT per live key, written to `.tmp`
//! siblings first. The swap then renames each temp directly over its final
//! `datafile-<n>.data` name: `rename` atomically replaces an existing
//! destination, so no original segment is ever unlinked first, and a
//! failure at any point before the last rename leaves every
//! not-yet-replaced original in place. Old segments beyond the new set are
//! removed only after the rename loop completes, and the in-memory state
//! is rebuilt (by replaying the new set) only after the files are settled.
//! A failure before the swap discards the temps; recovery is "discard
//! temporaries and retry."

use crate::{replay_segment, KeyDir, KvError, Location, Store, StoreInner};
use segment::{segment_file_name, Segment};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

impl Store {
    /// Compacts the store down to its live records.
    ///
    /// Afterwards each live key resolves to the same value as before the
    /// merge, tombstones and shadowed versions are gone, and segment
    /// numbering restarts at `datafile-1.data`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure. The original segments are never
    /// unlinked before the replacements are renamed over them, so a failed
    /// merge leaves the store serving the pre-merge data; recovery is
    /// "discard temporaries and retry".
    pub fn merge(&self) -> Result<(), KvError> {
        self.lock()?.merge()
    }
}

impl StoreInner {
    pub(crate) fn merge(&mut self) -> Result<(), KvError> {
        tracing::info!(
            live_keys = self.keydir.len(),
            segments = self.segments.len(),
            "merge started"
        );

        // Snapshot the live set sorted by key so merge output (and the
        // replay that follows) is deterministic.
        let mut live: Vec<(Vec<u8>, Location)> = self
            .keydir
            .iter()
            .map(|(k, loc)| (k.clone(), *loc))
            .collect();
        live.sort_by(|a, b| a.0.cmp(&b.0));

        let mut tmp_paths = Vec::new();
        if let Err(e) = self.stage_merge(&live, &mut tmp_paths) {
            for p in &tmp_paths {
                let _ = fs::remove_file(p);
            }
            return Err(e);
        }

        let old_paths: Vec<PathBuf> = self
            .segments
            .iter()
            .map(|s| s.path().to_path_buf())
            .collect();

        // Swap: rename each temp over its final name. The destination is
        // replaced atomically, so the originals stay on disk until the
        // moment a replacement takes their place. If a rename fails, the
        // in-memory state is untouched and reads keep working through the
        // handles already open on the old files.
        for (i, tmp) in tmp_paths.iter().enumerate() {
            let dst = self.base.join(segment_file_name(i as u64 + 1));
            replace_file(tmp, &dst)?;
        }

        let count = tmp_paths.len() as u64;

        // Old segments beyond the new set were not replaced; left behind
        // they would be replayed on a later open and resurrect stale
        // records. A file that is already gone is fine.
        let replaced: Vec<PathBuf> = (1..=count)
            .map(|n| self.base.join(segment_file_name(n)))
            .collect();
        for p in &old_paths {
            if replaced.contains(p) {
                continue;
            }
            if let Err(e) = fs::remove_file(p) {
                if e.kind() != io::ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
        }

        // The files are settled; open and replay the new set, then release
        // the old handles by swapping the state in.
        let mut segments = Vec::with_capacity(count as usize);
        let mut keydir = KeyDir::new();
        for n in 1..=count {
            let mut seg = Segment::open_path(
                self.base.join(segment_file_name(n)),
                self.max_segment_size,
            )?;
            replay_segment(&mut seg, segments.len(), &mut keydir)?;
            segments.push(seg);
        }

        self.segments = segments;
        self.keydir = keydir;
        self.next_number = count + 1;

        tracing::info!(
            live_keys = self.keydir.len(),
            segments = self.segments.len(),
            "merge finished"
        );
        Ok(())
    }

    /// Writes one PUT per live entry into numbered `.tmp` files, rolling to
    /// a new temp whenever the current one would exceed `max_segment_size`.
    /// An empty live set still yields a single empty temp, so the swap
    /// always has something to rename over `datafile-1.data`. Every path
    /// created is pushed to `tmp_paths` so the caller can clean up on
    /// failure.
    fn stage_merge(
        &mut self,
        live: &[(Vec<u8>, Location)],
        tmp_paths: &mut Vec<PathBuf>,
    ) -> Result<(), KvError> {
        let mut current: Option<Segment> = None;

        for (_, loc) in live {
            let record = self.segments[loc.segment].read_at(loc.offset)?;
            let encoded = record.encode();

            let overflow = match current.as_ref() {
                Some(seg) => seg.size() + encoded.len() as u64 > self.max_segment_size,
                None => true,
            };
            if overflow {
                let n = tmp_paths.len() as u64 + 1;
                let path = self.base.join(format!("{}.tmp", segment_file_name(n)));
                // A stale temp must not contribute leftover bytes.
                let _ = fs::remove_file(&path);
                tmp_paths.push(path.clone());
                current = Some(Segment::open_path(path, self.max_segment_size)?);
            }
            if let Some(seg) = current.as_mut() {
                seg.append(&encoded)?;
            }
        }

        if tmp_paths.is_empty() {
            let path = self.base.join(format!("{}.tmp", segment_file_name(1)));
            let _ = fs::remove_file(&path);
            tmp_paths.push(path.clone());
            Segment::open_path(path, self.max_segment_size)?;
        }
        Ok(())
    }
}

/// Moves `src` over `dst`, preferring an atomic rename (which replaces an
/// existing destination in one step). On failure (e.g. a cross-device move)
/// falls back to copy, fsync of the destination, then removal of the source.
fn replace_file(src: &Path, dst: &Path) -> io::Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    {
        let mut reader = fs::File::open(src)?;
        let mut writer = fs::File::create(dst)?;
        io::copy(&mut reader, &mut writer)?;
        writer.sync_all()?;
    }
    fs::remove_file(src)
}
