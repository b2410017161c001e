//! Snapshot persistence for a tree.
//!
//! ## File format (little-endian)
//!
//! ```text
//! [HEADER]  u32 magic "BPT1" | u32 order | u64 root | u64 node_count
//! [NODES]   node_count entries, in arena order:
//!             u8 kind (0 = internal, 1 = leaf)
//!             u32 key_count, key_count x u64 keys
//!             leaf:     u32 value_count, values...,
//!                       u8 has_next [, u64 next]
//!             internal: u32 child_count, child_count x u64 children
//! [FOOTER]  u32 magic (again — a missing footer means truncation)
//! ```
//!
//! Values are tagged: `0` Int (i64), `1` Bytes (u32 len + raw), `2` Record
//! (u16 field count, then tagged fields: `0` Int, `1` Text).
//!
//! The writer walks the arena in index order and stores the leaf chain as
//! plain indices, so no leaf is visited through more than one path. The
//! snapshot is written to a `.tmp` sibling, fsynced, then renamed into
//! place. Restore validates both magics and every node/chain index before
//! the tree is handed back, so a damaged file surfaces
//! [`TreeError::Corrupt`] instead of a malformed tree.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{rename, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::{BPlusTree, Field, Node, TreeError, Value};

const SNAPSHOT_MAGIC: u32 = 0x4250_5431; // "BPT1"

/// Largest blob (bytes or text) restore will allocate. Anything bigger is
/// treated as corruption rather than an allocation request.
const MAX_BLOB_BYTES: usize = 64 * 1024 * 1024;

const KIND_INTERNAL: u8 = 0;
const KIND_LEAF: u8 = 1;

const VALUE_INT: u8 = 0;
const VALUE_BYTES: u8 = 1;
const VALUE_RECORD: u8 = 2;

const FIELD_INT: u8 = 0;
const FIELD_TEXT: u8 = 1;

impl BPlusTree {
    /// Writes the tree to `path` as a self-describing snapshot.
    ///
    /// The bytes land in a `.tmp` sibling first and are fsynced before the
    /// atomic rename, so a crash mid-write never leaves a half snapshot at
    /// `path`.
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<(), TreeError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                TreeError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "snapshot path has no file name",
                ))
            })?;
        let tmp_path = path.with_file_name(format!("{}.tmp", file_name));

        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            let mut w = BufWriter::new(file);

            w.write_u32::<LittleEndian>(SNAPSHOT_MAGIC)?;
            w.write_u32::<LittleEndian>(self.order as u32)?;
            w.write_u64::<LittleEndian>(self.root as u64)?;
            w.write_u64::<LittleEndian>(self.nodes.len() as u64)?;

            for node in &self.nodes {
                write_node(&mut w, node)?;
            }

            w.write_u32::<LittleEndian>(SNAPSHOT_MAGIC)?;
            w.flush()?;
            w.get_ref().sync_all()?;
        }

        rename(&tmp_path, path)?;
        Ok(())
    }

    /// Reads a snapshot produced by [`persist`](Self::persist) back into an
    /// equivalent tree.
    ///
    /// # Errors
    ///
    /// [`TreeError::Corrupt`] on a bad magic, a truncated file, or indices
    /// pointing outside the node table; [`TreeError::Io`] for other
    /// filesystem failures.
    pub fn restore<P: AsRef<Path>>(path: P) -> Result<Self, TreeError> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);
        match read_tree(&mut r) {
            Err(TreeError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(TreeError::Corrupt)
            }
            other => other,
        }
    }
}

fn write_node<W: Write>(w: &mut W, node: &Node) -> Result<(), TreeError> {
    w.write_u8(if node.is_leaf { KIND_LEAF } else { KIND_INTERNAL })?;

    w.write_u32::<LittleEndian>(node.keys.len() as u32)?;
    for &key in &node.keys {
        w.write_u64::<LittleEndian>(key)?;
    }

    if node.is_leaf {
        w.write_u32::<LittleEndian>(node.values.len() as u32)?;
        for value in &node.values {
            write_value(w, value)?;
        }
        match node.next {
            Some(next) => {
                w.write_u8(1)?;
                w.write_u64::<LittleEndian>(next as u64)?;
            }
            None => w.write_u8(0)?,
        }
    } else {
        w.write_u32::<LittleEndian>(node.children.len() as u32)?;
        for &child in &node.children {
            w.write_u64::<LittleEndian>(child as u64)?;
        }
    }
    Ok(())
}

fn write_value<W: Write>(w: &mut W, value: &Value) -> Result<(), TreeError> {
    match value {
        Value::Int(i) => {
            w.write_u8(VALUE_INT)?;
            w.write_i64::<LittleEndian>(*i)?;
        }
        Value::Bytes(b) => {
            w.write_u8(VALUE_BYTES)?;
            w.write_u32::<LittleEndian>(b.len() as u32)?;
            w.write_all(b)?;
        }
        Value::Record(fields) => {
            w.write_u8(VALUE_RECORD)?;
            w.write_u16::<LittleEndian>(fields.len() as u16)?;
            for field in fields {
                match field {
                    Field::Int(i) => {
                        w.write_u8(FIELD_INT)?;
                        w.write_i64::<LittleEndian>(*i)?;
                    }
                    Field::Text(s) => {
                        w.write_u8(FIELD_TEXT)?;
                        w.write_u32::<LittleEndian>(s.len() as u32)?;
                        w.write_all(s.as_bytes())?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn read_tree<R: Read>(r: &mut R) -> Result<BPlusTree, TreeError> {
    if r.read_u32::<LittleEndian>()? != SNAPSHOT_MAGIC {
        return Err(TreeError::Corrupt);
    }

    let order = r.read_u32::<LittleEndian>()? as usize;
    if order < 2 {
        return Err(TreeError::Corrupt);
    }
    let root = r.read_u64::<LittleEndian>()? as usize;
    let node_count = r.read_u64::<LittleEndian>()? as usize;
    if node_count == 0 || root >= node_count {
        return Err(TreeError::Corrupt);
    }

    let mut nodes = Vec::with_capacity(node_count.min(1 << 20));
    for _ in 0..node_count {
        nodes.push(read_node(r, node_count)?);
    }

    if r.read_u32::<LittleEndian>()? != SNAPSHOT_MAGIC {
        return Err(TreeError::Corrupt);
    }

    Ok(BPlusTree { nodes, root, order })
}

fn read_node<R: Read>(r: &mut R, node_count: usize) -> Result<Node, TreeError> {
    let is_leaf = match r.read_u8()? {
        KIND_LEAF => true,
        KIND_INTERNAL => false,
        _ => return Err(TreeError::Corrupt),
    };

    let key_count = r.read_u32::<LittleEndian>()? as usize;
    let mut keys = Vec::with_capacity(key_count.min(1 << 16));
    for _ in 0..key_count {
        keys.push(r.read_u64::<LittleEndian>()?);
    }

    let mut node = if is_leaf { Node::leaf() } else { Node::internal() };
    node.keys = keys;

    if is_leaf {
        let value_count = r.read_u32::<LittleEndian>()? as usize;
        // Leaves hold one value per key; anything else is damage.
        if value_count != node.keys.len() {
            return Err(TreeError::Corrupt);
        }
        for _ in 0..value_count {
            node.values.push(read_value(r)?);
        }
        node.next = match r.read_u8()? {
            0 => None,
            1 => {
                let next = r.read_u64::<LittleEndian>()? as usize;
                if next >= node_count {
                    return Err(TreeError::Corrupt);
                }
                Some(next)
            }
            _ => return Err(TreeError::Corrupt),
        };
    } else {
        let child_count = r.read_u32::<LittleEndian>()? as usize;
        if child_count != node.keys.len() + 1 {
            return Err(TreeError::Corrupt);
        }
        for _ in 0..child_count {
            let child = r.read_u64::<LittleEndian>()? as usize;
            if child >= node_count {
                return Err(TreeError::Corrupt);
            }
            node.children.push(child);
        }
    }

    Ok(node)
}

fn read_value<R: Read>(r: &mut R) -> Result<Value, TreeError> {
    match r.read_u8()? {
        VALUE_INT => Ok(Value::Int(r.read_i64::<LittleEndian>()?)),
        VALUE_BYTES => {
            let len = r.read_u32::<LittleEndian>()? as usize;
            if len > MAX_BLOB_BYTES {
                return Err(TreeError::Corrupt);
            }
            let mut buf = vec![0u8; len];
            r.read_exact(&mut buf)?;
            Ok(Value::Bytes(buf))
        }
        VALUE_RECORD => {
            let field_count = r.read_u16::<LittleEndian>()? as usize;
            let mut fields = Vec::with_capacity(field_count);
            for _ in 0..field_count {
                fields.push(read_field(r)?);
            }
            Ok(Value::Record(fields))
        }
        _ => Err(TreeError::Corrupt),
    }
}

fn read_field<R: Read>(r: &mut R) -> Result<Field, TreeError> {
    match r.read_u8()? {
        FIELD_INT => Ok(Field::Int(r.read_i64::<LittleEndian>()?)),
        FIELD_TEXT => {
            let len = r.read_u32::<LittleEndian>()? as usize;
            if len > MAX_BLOB_BYTES {
                return Err(TreeError::Corrupt);
            }
            let mut buf = vec![0u8; len];
            r.read_exact(&mut buf)?;
            let text = String::from_utf8(buf).map_err(|_| TreeError::Corrupt)?;
            Ok(Field::Text(text))
        }
        _ => Err(TreeError::Corrupt),
    }
}
