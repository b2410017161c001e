use super::*;
use anyhow::Result;
use byteorder::{BigEndian, ByteOrder};
use tempfile::tempdir;

// --------------------- Record codec ---------------------

#[test]
fn encode_decode_round_trip() -> Result<()> {
    let rec = Record::put(b"name".to_vec(), b"Alice".to_vec());
    let buf = rec.encode();
    assert_eq!(buf.len(), HEADER_SIZE + 4 + 5);

    let decoded = Record::decode(&buf)?;
    assert_eq!(decoded, rec);
    assert_eq!(decoded.tag, Tag::Put);
    Ok(())
}

#[test]
fn tombstone_round_trip() -> Result<()> {
    let rec = Record::tombstone(b"gone".to_vec());
    let decoded = Record::decode(&rec.encode())?;
    assert_eq!(decoded.tag, Tag::Tombstone);
    assert_eq!(decoded.key, b"gone");
    assert!(decoded.value.is_empty());
    Ok(())
}

#[test]
fn empty_key_and_value_round_trip() -> Result<()> {
    let rec = Record::put(Vec::new(), Vec::new());
    let buf = rec.encode();
    assert_eq!(buf.len(), HEADER_SIZE);
    assert_eq!(Record::decode(&buf)?, rec);
    Ok(())
}

#[test]
fn header_is_big_endian() {
    let rec = Record::put(b"k".to_vec(), b"vv".to_vec());
    let buf = rec.encode();
    assert_eq!(BigEndian::read_u32(&buf[0..4]), 1);
    assert_eq!(BigEndian::read_u32(&buf[4..8]), 2);
    assert_eq!(BigEndian::read_u16(&buf[8..10]), 0);
    assert_eq!(BigEndian::read_u32(&buf[10..14]), rec.crc());
}

#[test]
fn decode_short_header_fails() {
    let err = Record::decode(&[0u8; 13]).unwrap_err();
    assert!(matches!(err, SegmentError::ShortBuffer));
}

#[test]
fn decode_truncated_payload_fails() {
    let rec = Record::put(b"key".to_vec(), b"value".to_vec());
    let buf = rec.encode();
    let err = Record::decode(&buf[..buf.len() - 1]).unwrap_err();
    assert!(matches!(err, SegmentError::ShortBuffer));
}

#[test]
fn decode_flipped_value_byte_is_corrupt() {
    let rec = Record::put(b"key".to_vec(), b"value".to_vec());
    let mut buf = rec.encode();
    let last = buf.len() - 1;
    buf[last] ^= 0xff;
    let err = Record::decode(&buf).unwrap_err();
    assert!(matches!(err, SegmentError::Corrupt));
}

#[test]
fn decode_unknown_tag_is_corrupt() {
    let rec = Record::put(b"key".to_vec(), b"value".to_vec());
    let mut buf = rec.encode();
    BigEndian::write_u16(&mut buf[8..10], 7);
    let err = Record::decode(&buf).unwrap_err();
    assert!(matches!(err, SegmentError::Corrupt));
}

#[test]
fn crc_covers_payload_only() {
    // Two records with the same payload but different tags share a CRC.
    let put = Record::put(b"k".to_vec(), Vec::new());
    let del = Record::tombstone(b"k".to_vec());
    assert_eq!(put.crc(), del.crc());
}

// --------------------- File naming ---------------------

#[test]
fn segment_names_round_trip() {
    assert_eq!(segment_file_name(1), "datafile-1.data");
    assert_eq!(parse_segment_number("datafile-1.data"), Some(1));
    assert_eq!(parse_segment_number("datafile-42.data"), Some(42));
    assert_eq!(parse_segment_number("datafile-.data"), None);
    assert_eq!(parse_segment_number("datafile-x.data"), None);
    assert_eq!(parse_segment_number("other-1.data"), None);
    assert_eq!(parse_segment_number("MANIFEST"), None);
}

// --------------------- Segment file ---------------------

#[test]
fn append_returns_start_offset() -> Result<()> {
    let dir = tempdir()?;
    let mut seg = Segment::create(dir.path(), 1, 1024)?;

    let a = Record::put(b"a".to_vec(), b"1".to_vec()).encode();
    let b = Record::put(b"b".to_vec(), b"2".to_vec()).encode();

    assert_eq!(seg.append(&a)?, 0);
    assert_eq!(seg.append(&b)?, a.len() as u64);
    assert_eq!(seg.size(), (a.len() + b.len()) as u64);
    Ok(())
}

#[test]
fn read_at_returns_the_record_written() -> Result<()> {
    let dir = tempdir()?;
    let mut seg = Segment::create(dir.path(), 1, 1024)?;

    let first = Record::put(b"a".to_vec(), b"1".to_vec());
    let second = Record::tombstone(b"a".to_vec());
    let off1 = seg.append(&first.encode())?;
    let off2 = seg.append(&second.encode())?;

    assert_eq!(seg.read_at(off1)?, first);
    assert_eq!(seg.read_at(off2)?, second);
    Ok(())
}

#[test]
fn reopen_resumes_at_file_size() -> Result<()> {
    let dir = tempdir()?;
    let rec = Record::put(b"k".to_vec(), b"v".to_vec());

    let len = {
        let mut seg = Segment::create(dir.path(), 1, 1024)?;
        seg.append(&rec.encode())?;
        seg.size()
    };

    let mut seg = Segment::create(dir.path(), 1, 1024)?;
    assert_eq!(seg.size(), len);
    assert_eq!(seg.read_at(0)?, rec);

    // The next append lands after the existing record.
    let off = seg.append(&rec.encode())?;
    assert_eq!(off, len);
    Ok(())
}

#[test]
fn should_roll_at_max_size() -> Result<()> {
    let dir = tempdir()?;
    let rec = Record::put(b"k".to_vec(), b"v".to_vec()).encode();

    let mut seg = Segment::create(dir.path(), 1, rec.len() as u64)?;
    assert!(!seg.should_roll());
    seg.append(&rec)?;
    assert!(seg.should_roll());
    Ok(())
}

#[test]
fn read_past_end_is_io_error() -> Result<()> {
    let dir = tempdir()?;
    let mut seg = Segment::create(dir.path(), 1, 1024)?;
    seg.append(&Record::put(b"k".to_vec(), b"v".to_vec()).encode())?;

    let err = seg.read_at(seg.size()).unwrap_err();
    match err {
        SegmentError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("expected Io, got {:?}", other),
    }
    Ok(())
}

#[test]
fn corrupted_byte_on_disk_is_detected() -> Result<()> {
    let dir = tempdir()?;
    let mut seg = Segment::create(dir.path(), 1, 1024)?;
    let off = seg.append(&Record::put(b"k".to_vec(), b"value".to_vec()).encode())?;

    // Flip one byte of the value on disk.
    let path = seg.path().to_path_buf();
    drop(seg);
    let mut raw = std::fs::read(&path)?;
    let last = raw.len() - 1;
    raw[last] ^= 0xff;
    std::fs::write(&path, &raw)?;

    let mut seg = Segment::open_path(&path, 1024)?;
    let err = seg.read_at(off).unwrap_err();
    assert!(matches!(err, SegmentError::Corrupt));
    Ok(())
}
