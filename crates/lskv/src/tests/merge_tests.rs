use super::helpers::count_records;
use crate::*;
use anyhow::Result;
use tempfile::tempdir;

const MB: u64 = 1024 * 1024;

#[test]
fn merge_keeps_latest_across_rollovers() -> Result<()> {
    let dir = tempdir()?;
    // max_segment_size of 1 forces a rollover on every write.
    let store = Store::open(dir.path(), 1)?;

    store.put(b"k", b"v1")?;
    store.put(b"k", b"v2")?;
    store.put(b"k", b"v3")?;
    store.delete(b"k")?;
    store.put(b"k", b"v4")?;

    store.merge()?;
    assert_eq!(store.get(b"k")?, b"v4");

    // Exactly one live record survives the merge.
    let (puts, tombstones) = count_records(dir.path());
    assert_eq!(puts, 1);
    assert_eq!(tombstones, 0);

    // Reopening the directory sees the same state.
    drop(store);
    let store = Store::open(dir.path(), 1)?;
    assert_eq!(store.get(b"k")?, b"v4");
    Ok(())
}

#[test]
fn merge_preserves_every_live_key() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path(), 64)?;

    for i in 0..30u32 {
        store.put(format!("k{:02}", i).as_bytes(), format!("old{}", i).as_bytes())?;
    }
    for i in 0..30u32 {
        store.put(format!("k{:02}", i).as_bytes(), format!("new{}", i).as_bytes())?;
    }
    for i in 0..10u32 {
        store.delete(format!("k{:02}", i).as_bytes())?;
    }

    store.merge()?;

    for i in 0..10u32 {
        assert!(matches!(
            store.get(format!("k{:02}", i).as_bytes()),
            Err(KvError::NotFound)
        ));
    }
    for i in 10..30u32 {
        assert_eq!(
            store.get(format!("k{:02}", i).as_bytes())?,
            format!("new{}", i).as_bytes()
        );
    }

    let (puts, tombstones) = count_records(dir.path());
    assert_eq!(puts, 20);
    assert_eq!(tombstones, 0);
    Ok(())
}

#[test]
fn merge_restarts_segment_numbering() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path(), 1)?;

    for i in 0..8u32 {
        store.put(format!("k{}", i).as_bytes(), b"v")?;
    }
    assert!(store.segment_count()? >= 8);

    store.merge()?;

    let paths = super::helpers::segment_paths(dir.path());
    assert!(!paths.is_empty());
    assert!(paths[0].ends_with("datafile-1.data"));
    // Live data shrank to a handful of records; no segment gaps remain.
    assert_eq!(paths.len(), store.segment_count()?);
    Ok(())
}

#[test]
fn merge_of_empty_store_leaves_one_empty_segment() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path(), MB)?;

    store.put(b"k", b"v")?;
    store.delete(b"k")?;
    store.merge()?;

    assert_eq!(store.live_keys()?, 0);
    assert_eq!(store.segment_count()?, 1);
    let (puts, tombstones) = count_records(dir.path());
    assert_eq!(puts, 0);
    assert_eq!(tombstones, 0);

    // The store stays writable after an empty merge.
    store.put(b"k2", b"v2")?;
    assert_eq!(store.get(b"k2")?, b"v2");
    Ok(())
}

#[test]
fn writes_after_merge_land_in_new_tail() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path(), 1)?;

    store.put(b"a", b"1")?;
    store.put(b"b", b"2")?;
    store.merge()?;

    store.put(b"c", b"3")?;
    assert_eq!(store.get(b"a")?, b"1");
    assert_eq!(store.get(b"b")?, b"2");
    assert_eq!(store.get(b"c")?, b"3");

    drop(store);
    let store = Store::open(dir.path(), 1)?;
    assert_eq!(store.live_keys()?, 3);
    Ok(())
}

#[test]
fn failed_staging_leaves_the_originals_byte_for_byte() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path(), 1)?;
    store.put(b"a", b"1")?;
    store.put(b"b", b"2")?;
    store.delete(b"a")?;

    let mut before = Vec::new();
    for path in super::helpers::segment_paths(dir.path()) {
        let bytes = std::fs::read(&path)?;
        before.push((path, bytes));
    }

    // A directory squatting on the first temp path makes staging fail
    // before any original is touched.
    let blocker = dir.path().join("datafile-1.data.tmp");
    std::fs::create_dir(&blocker)?;
    assert!(store.merge().is_err());

    // Every original segment is untouched and the store still serves the
    // pre-merge view.
    for (path, bytes) in &before {
        assert_eq!(&std::fs::read(path)?, bytes);
    }
    assert!(matches!(store.get(b"a"), Err(KvError::NotFound)));
    assert_eq!(store.get(b"b")?, b"2");

    // Recovery: discard the blocker and retry.
    std::fs::remove_dir(&blocker)?;
    store.merge()?;
    assert_eq!(store.get(b"b")?, b"2");
    assert_eq!(count_records(dir.path()), (1, 0));
    Ok(())
}

#[test]
fn merge_interrupted_mid_swap_keeps_serving_and_retries() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path(), 1)?;
    for i in 0..5u32 {
        store.put(format!("k{}", i).as_bytes(), b"v")?;
    }
    for i in 1..5u32 {
        store.delete(format!("k{}", i).as_bytes())?;
    }

    // Swap an orphaned old segment for a directory behind the store's
    // back. The store's open handle keeps reading the original data, but
    // the swap cannot unlink a directory, so the merge fails after the
    // renames and before the in-memory state is replaced.
    let victim = dir.path().join("datafile-5.data");
    std::fs::remove_file(&victim)?;
    std::fs::create_dir(&victim)?;

    assert!(store.merge().is_err());

    // The store still serves the pre-merge view through its open handles.
    assert_eq!(store.get(b"k0")?, b"v");
    assert!(matches!(store.get(b"k1"), Err(KvError::NotFound)));
    store.put(b"k9", b"w")?;
    assert_eq!(store.get(b"k9")?, b"w");

    // Recovery: discard the blocker and retry.
    std::fs::remove_dir(&victim)?;
    store.merge()?;
    assert_eq!(store.get(b"k0")?, b"v");
    assert_eq!(store.get(b"k9")?, b"w");
    assert_eq!(count_records(dir.path()), (2, 0));

    drop(store);
    let store = Store::open(dir.path(), 1)?;
    assert_eq!(store.get(b"k0")?, b"v");
    assert_eq!(store.get(b"k9")?, b"w");
    assert_eq!(store.live_keys()?, 2);
    Ok(())
}

#[test]
fn merge_leaves_no_tmp_files() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(dir.path(), 64)?;

    for i in 0..10u32 {
        store.put(format!("k{}", i).as_bytes(), b"value")?;
    }
    store.merge()?;

    let leftover = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "tmp")
                .unwrap_or(false)
        })
        .count();
    assert_eq!(leftover, 0);
    Ok(())
}
