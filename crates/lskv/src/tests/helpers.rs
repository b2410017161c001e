use segment::{parse_segment_number, Record, Tag};
use std::fs;
use std::path::{Path, PathBuf};

/// All `datafile-<n>.data` paths under `dir`, ordered by segment number.
pub fn segment_paths(dir: &Path) -> Vec<PathBuf> {
    let mut numbered: Vec<(u64, PathBuf)> = fs::read_dir(dir)
        .unwrap()
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
    numbered.into_iter().map(|(_, p)| p).collect()
}

/// Decodes every record in every segment under `dir`, returning
/// `(put_count, tombstone_count)`.
pub fn count_records(dir: &Path) -> (usize, usize) {
    let mut puts = 0;
    let mut tombstones = 0;
    for path in segment_paths(dir) {
        let bytes = fs::read(&path).unwrap();
        let mut offset = 0;
        while offset < bytes.len() {
            let record = Record::decode(&bytes[offset..]).unwrap();
            match record.tag {
                Tag::Put => puts += 1,
                Tag::Tombstone => tombstones += 1,
            }
            offset += record.encoded_len();
        }
    }
    (puts, tombstones)
}
