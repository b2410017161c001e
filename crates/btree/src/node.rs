//! Node representation and the insert/split machinery.
//!
//! Nodes are stored in the tree's arena and reference each other by index.
//! A leaf uses `keys`/`values`/`next`; an internal node uses
//! `keys`/`children` and always has one more child than keys.

use crate::{BPlusTree, Key, Value};

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) is_leaf: bool,
    /// Sorted, strictly increasing keys.
    pub(crate) keys: Vec<Key>,
    /// Child node indices (internal nodes only).
    pub(crate) children: Vec<usize>,
    /// Values parallel to `keys` (leaves only).
    pub(crate) values: Vec<Value>,
    /// Next leaf in ascending key order (leaves only).
    pub(crate) next: Option<usize>,
}

impl Node {
    pub(crate) fn leaf() -> Self {
        Self {
            is_leaf: true,
            keys: Vec::new(),
            children: Vec::new(),
            values: Vec::new(),
            next: None,
        }
    }

    pub(crate) fn internal() -> Self {
        Self {
            is_leaf: false,
            keys: Vec::new(),
            children: Vec::new(),
            values: Vec::new(),
            next: None,
        }
    }
}

impl BPlusTree {
    /// Inserts into the subtree rooted at `node`, which is guaranteed to
    /// have room (the caller split it if it was full).
    pub(crate) fn insert_non_full(&mut self, node: usize, key: Key, value: Value) {
        let (is_leaf, mut idx) = {
            let n = &self.nodes[node];
            // Same convention as the search descent: a key equal to a
            // separator belongs down the right child.
            let idx = n.keys.iter().take_while(|&&k| key >= k).count();
            (n.is_leaf, idx)
        };

        if is_leaf {
            let n = &mut self.nodes[node];
            n.keys.insert(idx, key);
            n.values.insert(idx, value);
            return;
        }

        let child = self.nodes[node].children[idx];
        if self.nodes[child].keys.len() == self.order {
            self.split_child(node, idx);
            // The split promoted a separator into `node` at `idx`; descend
            // right of it when the key belongs in the new sibling.
            if key >= self.nodes[node].keys[idx] {
                idx += 1;
            }
        }

        let child = self.nodes[node].children[idx];
        self.insert_non_full(child, key, value);
    }

    /// Splits the full child at `parent.children[idx]` into two nodes and
    /// promotes a separator into the parent.
    ///
    /// For a leaf the separator is the first key of the new right half and
    /// stays duplicated there (search descends right on equality). For an
    /// internal node the separator moves up and is removed from the child.
    pub(crate) fn split_child(&mut self, parent: usize, idx: usize) {
        let child = self.nodes[parent].children[idx];
        let mid = self.nodes[child].keys.len() / 2;

        let (separator, right) = if self.nodes[child].is_leaf {
            let n = &mut self.nodes[child];
            let right_keys = n.keys.split_off(mid);
            let right_values = n.values.split_off(mid);
            let right_next = n.next;
            let separator = right_keys[0];
            (
                separator,
                Node {
                    is_leaf: true,
                    keys: right_keys,
                    children: Vec::new(),
                    values: right_values,
                    next: right_next,
                },
            )
        } else {
            let n = &mut self.nodes[child];
            let right_keys = n.keys.split_off(mid + 1);
            let right_children = n.children.split_off(mid + 1);
            let separator = n.keys[mid];
            n.keys.truncate(mid);
            (
                separator,
                Node {
                    is_leaf: false,
                    keys: right_keys,
                    children: right_children,
                    values: Vec::new(),
                    next: None,
                },
            )
        };

        let was_leaf = right.is_leaf;
        let new_idx = self.alloc(right);
        if was_leaf {
            // Splice the new right half into the leaf chain after the child.
            self.nodes[child].next = Some(new_idx);
        }

        let p = &mut self.nodes[parent];
        p.keys.insert(idx, separator);
        p.children.insert(idx + 1, new_idx);
    }
}
