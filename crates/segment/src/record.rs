//! Framed record codec for DriftKV segment files.
//!
//! ## Binary Record Format
//!
//! ```text
//! [key_size: u32 BE][value_size: u32 BE][tag: u16 BE][crc: u32 BE][key][value]
//! ```
//!
//! The header is a fixed 14 bytes. `tag` is `0` for a PUT and `1` for a
//! tombstone. `crc` is IEEE CRC32 over the key and value bytes only — the
//! header is excluded.
//!
//! Records are immutable once written: a logical update appends a newer PUT
//! for the same key, a logical delete appends a tombstone.

use byteorder::{BigEndian, ByteOrder};
use crc32fast::Hasher as Crc32;

use crate::SegmentError;

/// Size of the fixed record header in bytes.
pub const HEADER_SIZE: usize = 14;

/// Disposition of a record: a live value or a deletion marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// A key-value insertion.
    Put = 0,
    /// A deletion marker (tombstone) for the record's key.
    Tombstone = 1,
}

impl Tag {
    fn from_u16(raw: u16) -> Result<Self, SegmentError> {
        match raw {
            0 => Ok(Tag::Put),
            1 => Ok(Tag::Tombstone),
            _ => Err(SegmentError::Corrupt),
        }
    }
}

/// A single logical key-value record as stored in a segment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub tag: Tag,
}

impl Record {
    /// Creates a PUT record.
    pub fn put(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            value,
            tag: Tag::Put,
        }
    }

    /// Creates a tombstone record. Tombstones carry no value bytes.
    pub fn tombstone(key: Vec<u8>) -> Self {
        Self {
            key,
            value: Vec::new(),
            tag: Tag::Tombstone,
        }
    }

    /// IEEE CRC32 over `key || value`.
    pub fn crc(&self) -> u32 {
        let mut hasher = Crc32::new();
        hasher.update(&self.key);
        hasher.update(&self.value);
        hasher.finalize()
    }

    /// Total encoded size: header plus payload.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// Serializes the record: header, then key, then value.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        BigEndian::write_u32(&mut buf[0..4], self.key.len() as u32);
        BigEndian::write_u32(&mut buf[4..8], self.value.len() as u32);
        BigEndian::write_u16(&mut buf[8..10], self.tag as u16);
        BigEndian::write_u32(&mut buf[10..14], self.crc());
        buf[HEADER_SIZE..HEADER_SIZE + self.key.len()].copy_from_slice(&self.key);
        buf[HEADER_SIZE + self.key.len()..].copy_from_slice(&self.value);
        buf
    }

    /// Decodes a record from `buf`.
    ///
    /// # Errors
    ///
    /// - [`SegmentError::ShortBuffer`] if `buf` holds fewer than 14 bytes, or
    ///   fewer than the total length the header declares.
    /// - [`SegmentError::Corrupt`] if the tag is unknown or the stored CRC
    ///   does not match the CRC recomputed over the key and value bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_SIZE {
            return Err(SegmentError::ShortBuffer);
        }

        let key_size = BigEndian::read_u32(&buf[0..4]) as usize;
        let value_size = BigEndian::read_u32(&buf[4..8]) as usize;
        let tag = Tag::from_u16(BigEndian::read_u16(&buf[8..10]))?;
        let stored_crc = BigEndian::read_u32(&buf[10..14]);

        let total = HEADER_SIZE
            .checked_add(key_size)
            .and_then(|n| n.checked_add(value_size))
            .ok_or(SegmentError::ShortBuffer)?;
        if buf.len() < total {
            return Err(SegmentError::ShortBuffer);
        }

        let key = buf[HEADER_SIZE..HEADER_SIZE + key_size].to_vec();
        let value = buf[HEADER_SIZE + key_size..total].to_vec();

        let record = Record { key, value, tag };
        if record.crc() != stored_crc {
            return Err(SegmentError::Corrupt);
        }

        Ok(record)
    }

    /// Reads the declared payload length (`key_size + value_size`) out of a
    /// raw header without validating the CRC. Used by readers that need to
    /// know how many payload bytes to fetch before a full decode is possible.
    pub fn payload_len(header: &[u8]) -> Result<usize, SegmentError> {
        if header.len() < HEADER_SIZE {
            return Err(SegmentError::ShortBuffer);
        }
        let key_size = BigEndian::read_u32(&header[0..4]) as usize;
        let value_size = BigEndian::read_u32(&header[4..8]) as usize;
        key_size
            .checked_add(value_size)
            .ok_or(SegmentError::ShortBuffer)
    }
}
