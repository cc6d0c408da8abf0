// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The B+-tree secondary index (spec.md §4.3, §4.3.1).

use super::node::{Node, Pointers};
use crate::block_io::BlockIo;
use crate::index::{Condition, Index, IndexEntry, IndexKey, Operator};
use crate::row::RowPointer;
use crate::schema::{DataType, Value};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::path::Path;

/// Block index of the initial root node in a freshly created index file
/// (block 0 is metadata).
pub const INITIAL_ROOT_BLOCK: u32 = 1;

fn cmp_key(a: &IndexKey, b: &IndexKey) -> std::cmp::Ordering {
    a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
}

fn cmp_value(a: &Value, b: &Value) -> std::cmp::Ordering {
    a.cmp_key().partial_cmp(&b.cmp_key()).unwrap_or(std::cmp::Ordering::Equal)
}

/// First child index `i` such that `key < keys[i]` (spec.md §4.3.1:
/// "advance while key >= internal.keys[i]"). Also used as the leaf
/// insertion position, which gives the required stable tie-break: new
/// entries with an already-present key land after the existing ones.
fn route_index(keys: &[IndexKey], key: &IndexKey) -> usize {
    keys.iter()
        .take_while(|k| cmp_key(k, key) != std::cmp::Ordering::Greater)
        .count()
}

/// First index `i` such that `keys[i] >= key`.
fn position_at_or_after(keys: &[IndexKey], key: &IndexKey) -> usize {
    keys.iter()
        .take_while(|k| cmp_key(k, key) == std::cmp::Ordering::Less)
        .count()
}

/// Same as [`route_index`] but comparing only the first key component
/// against a bare probe value (used by `search_condition`'s descent).
fn route_index_first(keys: &[IndexKey], probe: &Value) -> usize {
    keys.iter()
        .take_while(|k| cmp_value(k.first(), probe) != std::cmp::Ordering::Greater)
        .count()
}

/// Same as [`position_at_or_after`] but comparing only the first component.
fn position_at_or_after_first(keys: &[IndexKey], probe: &Value) -> usize {
    keys.iter()
        .take_while(|k| cmp_value(k.first(), probe) == std::cmp::Ordering::Less)
        .count()
}

/// Paged B+-tree index over its own index file.
pub struct BTreeIndex {
    io: BlockIo,
    root_block_index: u32,
    key_types: Vec<DataType>,
    columns: Vec<String>,
    unique: bool,
}

impl BTreeIndex {
    /// Creates a brand new index file at `path`: writes the metadata block
    /// and an empty root leaf at [`INITIAL_ROOT_BLOCK`].
    pub fn create(
        path: impl AsRef<Path>,
        columns: Vec<String>,
        key_types: Vec<DataType>,
        unique: bool,
    ) -> crate::Result<Self> {
        Self::create_with_block_size(path, columns, key_types, unique, crate::block_io::BLOCK_SIZE)
    }

    /// Like [`Self::create`] but with an explicit block size (used by tests
    /// that need to force splits without inserting thousands of rows).
    pub fn create_with_block_size(
        path: impl AsRef<Path>,
        columns: Vec<String>,
        key_types: Vec<DataType>,
        unique: bool,
        block_size: usize,
    ) -> crate::Result<Self> {
        let io = BlockIo::open_with_block_size(path, block_size)?;
        let mut index = Self {
            io,
            root_block_index: INITIAL_ROOT_BLOCK,
            key_types,
            columns,
            unique,
        };
        index.write_metadata()?;
        let root = Node::new_leaf(true);
        index.write_node(INITIAL_ROOT_BLOCK, &root)?;
        log::debug!("created B+-tree index at root block {INITIAL_ROOT_BLOCK}");
        Ok(index)
    }

    /// Opens an existing index file, validating its on-disk key-type
    /// descriptor against `key_types` (the caller derives this from the
    /// current table catalog).
    pub fn open(
        path: impl AsRef<Path>,
        columns: Vec<String>,
        key_types: Vec<DataType>,
        unique: bool,
    ) -> crate::Result<Self> {
        let mut io = BlockIo::open(path)?;
        let (root_block_index, stored_types) = Self::read_metadata_raw(&mut io)?;

        if stored_types.len() != key_types.len()
            || stored_types
                .iter()
                .zip(&key_types)
                .any(|(a, b)| a.tag() != b.tag())
        {
            return Err(crate::error::SchemaError::KeyTypeMismatch {
                index: columns.join(","),
                stored: stored_types.iter().map(|t| t.name()).collect::<Vec<_>>().join(","),
                expected: key_types.iter().map(|t| t.name()).collect::<Vec<_>>().join(","),
            }
            .into());
        }

        Ok(Self {
            io,
            root_block_index,
            key_types,
            columns,
            unique,
        })
    }

    /// The columns this index is keyed on.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether this index enforces key uniqueness.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    fn write_metadata(&mut self) -> crate::Result<()> {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(self.root_block_index)?;
        buf.write_u16::<LittleEndian>(self.key_types.len() as u16)?;
        for ty in &self.key_types {
            buf.write_u8(ty.tag())?;
        }
        self.io.write(0, &buf)?;
        Ok(())
    }

    fn read_metadata_raw(io: &mut BlockIo) -> crate::Result<(u32, Vec<DataType>)> {
        let block = io.read(0)?;
        let mut cursor = std::io::Cursor::new(&block[..]);
        let root_block_index = cursor.read_u32::<LittleEndian>()?;
        let count = cursor.read_u16::<LittleEndian>()?;
        let mut tags = vec![0u8; count as usize];
        std::io::Read::read_exact(&mut cursor, &mut tags)?;
        let key_types = tags
            .iter()
            .map(|&tag| match tag {
                b'i' => DataType::Int,
                b'f' => DataType::Float,
                // Width is irrelevant for comparison/routing purposes once
                // loaded from metadata; encode/decode of key components
                // uses the caller-supplied key_types (validated to match).
                b'c' => DataType::Char(0),
                b'v' => DataType::Varchar(0),
                other => panic!("invalid key type tag {other:#x} in index metadata"),
            })
            .collect();
        Ok((root_block_index, key_types))
    }

    fn read_node(&mut self, block: u32) -> crate::Result<Node> {
        let bytes = self.io.read(u64::from(block))?;
        Node::decode(&bytes, &self.key_types)
    }

    fn write_node(&mut self, block: u32, node: &Node) -> crate::Result<()> {
        let bytes = node.encode(&self.key_types)?;
        self.io.write(u64::from(block), &bytes)?;
        Ok(())
    }

    fn alloc_block(&mut self) -> crate::Result<u32> {
        Ok((self.io.last_block_index()? + 1) as u32)
    }

    fn block_size(&self) -> usize {
        self.io.block_size()
    }

    /// Descends from the root to the leaf whose key range covers `key`,
    /// returning the path of ancestor block indices (root first, leaf
    /// excluded) and the leaf's block index.
    fn descend_for_key(&mut self, key: &IndexKey) -> crate::Result<(Vec<u32>, u32)> {
        let mut path = Vec::new();
        let mut block = self.root_block_index;
        loop {
            let node = self.read_node(block)?;
            if node.header.is_leaf {
                return Ok((path, block));
            }
            let Pointers::Internal(children) = &node.pointers else {
                unreachable!("internal node must carry Internal pointers")
            };
            let i = route_index(&node.keys, key);
            path.push(block);
            block = children[i];
        }
    }

    fn descend_for_first_component(&mut self, probe: &Value) -> crate::Result<u32> {
        let mut block = self.root_block_index;
        loop {
            let node = self.read_node(block)?;
            if node.header.is_leaf {
                return Ok(block);
            }
            let Pointers::Internal(children) = &node.pointers else {
                unreachable!("internal node must carry Internal pointers")
            };
            let i = route_index_first(&node.keys, probe);
            block = children[i];
        }
    }

    fn descend_leftmost(&mut self) -> crate::Result<u32> {
        let mut block = self.root_block_index;
        loop {
            let node = self.read_node(block)?;
            if node.header.is_leaf {
                return Ok(block);
            }
            let Pointers::Internal(children) = &node.pointers else {
                unreachable!("internal node must carry Internal pointers")
            };
            block = children[0];
        }
    }

    /// Splits `node` per spec.md §4.3.1: `m = num_keys / 2`; leaves keep
    /// the middle key in both the promoted separator and the right half,
    /// internal nodes promote it without a local copy.
    fn split_node(node: &Node) -> (Node, Node, IndexKey) {
        let m = node.keys.len() / 2;
        let middle_key = node.keys[m].clone();

        match &node.pointers {
            Pointers::Leaf(pointers) => {
                let left = Node {
                    header: node.header,
                    keys: node.keys[..m].to_vec(),
                    pointers: Pointers::Leaf(pointers[..m].to_vec()),
                };
                let right = Node {
                    header: node.header,
                    keys: node.keys[m..].to_vec(),
                    pointers: Pointers::Leaf(pointers[m..].to_vec()),
                };
                (left, right, middle_key)
            }
            Pointers::Internal(children) => {
                let left = Node {
                    header: node.header,
                    keys: node.keys[..m].to_vec(),
                    pointers: Pointers::Internal(children[..=m].to_vec()),
                };
                let right = Node {
                    header: node.header,
                    keys: node.keys[m + 1..].to_vec(),
                    pointers: Pointers::Internal(children[m + 1..].to_vec()),
                };
                (left, right, middle_key)
            }
        }
    }

    /// Rewrites the `parent` field of every child referenced by `node`
    /// (internal nodes only) to `new_parent`. Keeps the header's `parent`
    /// back-pointer meaningful even though traversal never trusts it
    /// (spec.md §9 design note).
    fn reparent_children(&mut self, node: &Node, new_parent: u32) -> crate::Result<()> {
        if let Pointers::Internal(children) = &node.pointers {
            for &child_block in children {
                let mut child = self.read_node(child_block)?;
                child.header.parent = new_parent;
                self.write_node(child_block, &child)?;
            }
        }
        Ok(())
    }

    fn insert_internal(
        &mut self,
        mut path: Vec<u32>,
        left_block: u32,
        right_block: u32,
        sep_key: IndexKey,
    ) -> crate::Result<()> {
        let Some(parent_block) = path.pop() else {
            // The node that just split was the root: allocate a new root.
            let new_root_block = self.alloc_block()?;
            let new_root = Node::new_internal(vec![sep_key], vec![left_block, right_block], true);
            self.write_node(new_root_block, &new_root)?;

            let mut left = self.read_node(left_block)?;
            left.header.is_root = false;
            left.header.parent = new_root_block;
            self.write_node(left_block, &left)?;

            let mut right = self.read_node(right_block)?;
            right.header.is_root = false;
            right.header.parent = new_root_block;
            self.write_node(right_block, &right)?;

            self.root_block_index = new_root_block;
            self.write_metadata()?;
            log::debug!("B+-tree root split, new root at block {new_root_block}");
            return Ok(());
        };

        let mut parent = self.read_node(parent_block)?;
        let Pointers::Internal(children) = &mut parent.pointers else {
            unreachable!("internal node must carry Internal pointers")
        };
        let pos = route_index(&parent.keys, &sep_key);
        parent.keys.insert(pos, sep_key);
        children.insert(pos + 1, right_block);
        parent.header.num_keys = parent.keys.len() as u16;

        if parent.serialized_len(&self.key_types) <= self.block_size() {
            self.write_node(parent_block, &parent)?;
            return Ok(());
        }

        log::trace!("splitting internal node at block {parent_block}");
        let (left, right, middle) = Self::split_node(&parent);
        let right_block_idx = self.alloc_block()?;
        self.write_node(parent_block, &left)?;
        self.write_node(right_block_idx, &right)?;
        self.reparent_children(&left, parent_block)?;
        self.reparent_children(&right, right_block_idx)?;

        self.insert_internal(path, parent_block, right_block_idx, middle)
    }
}

impl Index for BTreeIndex {
    type Iter<'a> = SearchIter<'a>;

    fn insert(&mut self, key: IndexKey, pointer: RowPointer) -> crate::Result<()> {
        let (path, leaf_block) = self.descend_for_key(&key)?;
        let mut leaf = self.read_node(leaf_block)?;

        if self.unique && leaf.keys.iter().any(|k| *k == key) {
            return Err(crate::Error::UniqueViolation {
                index: self.columns.join(","),
                key: format!("{:?}", key.0),
            });
        }

        let pos = route_index(&leaf.keys, &key);
        leaf.keys.insert(pos, key);
        let Pointers::Leaf(pointers) = &mut leaf.pointers else {
            unreachable!("leaf node must carry Leaf pointers")
        };
        pointers.insert(pos, pointer);
        leaf.header.num_keys = leaf.keys.len() as u16;

        if leaf.serialized_len(&self.key_types) <= self.block_size() {
            self.write_node(leaf_block, &leaf)?;
            return Ok(());
        }

        log::trace!("splitting leaf at block {leaf_block}");
        let (mut left, mut right, middle) = Self::split_node(&leaf);
        let right_block = self.alloc_block()?;
        left.header.next_leaf = right_block;
        right.header.next_leaf = leaf.header.next_leaf;

        self.write_node(leaf_block, &left)?;
        self.write_node(right_block, &right)?;

        self.insert_internal(path, leaf_block, right_block, middle)
    }

    fn delete(&mut self, key: &IndexKey, specific_pointer: Option<RowPointer>) -> crate::Result<usize> {
        let (_, leaf_block) = self.descend_for_key(key)?;
        let mut leaf = self.read_node(leaf_block)?;

        let Pointers::Leaf(pointers) = &mut leaf.pointers else {
            unreachable!("leaf node must carry Leaf pointers")
        };

        let mut removed = 0usize;
        let mut i = 0;
        while i < leaf.keys.len() {
            let matches_key = leaf.keys[i] == *key;
            let matches_pointer = specific_pointer.is_none_or(|p| pointers[i] == p);
            if matches_key && matches_pointer {
                leaf.keys.remove(i);
                pointers.remove(i);
                removed += 1;
                if specific_pointer.is_some() {
                    break;
                }
            } else {
                i += 1;
            }
        }

        if removed > 0 {
            leaf.header.num_keys = leaf.keys.len() as u16;
            self.write_node(leaf_block, &leaf)?;
        }

        Ok(removed)
    }

    fn search(&mut self, key: &IndexKey) -> crate::Result<SearchIter<'_>> {
        let leaf_block = self.descend_for_key(key)?.1;
        let leaf = self.read_node(leaf_block)?;
        let start = position_at_or_after(&leaf.keys, key);

        Ok(SearchIter {
            tree: self,
            leaf: Some(leaf),
            idx: start,
            predicate: Predicate::EqualsKey(key.clone()),
            stop_on_mismatch: true,
        })
    }

    fn search_condition(&mut self, condition: &Condition) -> crate::Result<SearchIter<'_>> {
        let col_idx = self.columns.iter().position(|c| *c == condition.column);
        let is_first_column = col_idx == Some(0);

        let (leaf_block, predicate, stop_on_mismatch, start_at_leftmost) = match condition.operator
        {
            Operator::Eq if is_first_column => (
                self.descend_for_first_component(&condition.operand)?,
                Predicate::Column(0, Operator::Eq, condition.operand.clone()),
                true,
                false,
            ),
            Operator::Gt | Operator::Gte if is_first_column => (
                self.descend_for_first_component(&condition.operand)?,
                Predicate::Column(0, condition.operator, condition.operand.clone()),
                false,
                false,
            ),
            Operator::Lt | Operator::Lte => (
                self.descend_leftmost()?,
                Predicate::Column(
                    col_idx.unwrap_or(0),
                    condition.operator,
                    condition.operand.clone(),
                ),
                true,
                true,
            ),
            _ => (
                self.descend_leftmost()?,
                Predicate::Column(
                    col_idx.unwrap_or(0),
                    condition.operator,
                    condition.operand.clone(),
                ),
                false,
                true,
            ),
        };

        let leaf = self.read_node(leaf_block)?;

        let idx = if start_at_leftmost {
            0
        } else {
            match &predicate {
                Predicate::Column(_, Operator::Eq | Operator::Gt | Operator::Gte, operand) => {
                    position_at_or_after_first(&leaf.keys, operand)
                }
                _ => 0,
            }
        };

        Ok(SearchIter {
            tree: self,
            leaf: Some(leaf),
            idx,
            predicate,
            stop_on_mismatch,
        })
    }

    fn build_index<I: IntoIterator<Item = (IndexKey, RowPointer)>>(&mut self, rows: I) -> crate::Result<()> {
        for (key, pointer) in rows {
            match self.insert(key, pointer) {
                Ok(()) => {}
                Err(crate::Error::UniqueViolation { .. }) => {
                    log::warn!("build_index: skipped duplicate key on a unique index");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

enum Predicate {
    EqualsKey(IndexKey),
    Column(usize, Operator, Value),
}

impl Predicate {
    fn matches(&self, key: &IndexKey) -> bool {
        match self {
            Self::EqualsKey(k) => cmp_key(key, k) == std::cmp::Ordering::Equal,
            Self::Column(idx, op, operand) => op.apply(&key.0[*idx], operand),
        }
    }
}

/// Lazily-advancing iterator over B+-tree leaf entries. Reads at most one
/// leaf block ahead of what has been consumed (spec.md §9 design note).
pub struct SearchIter<'a> {
    tree: &'a mut BTreeIndex,
    leaf: Option<Node>,
    idx: usize,
    predicate: Predicate,
    stop_on_mismatch: bool,
}

impl Iterator for SearchIter<'_> {
    type Item = crate::Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let leaf = self.leaf.as_ref()?;

            if self.idx >= leaf.keys.len() {
                let next_leaf = leaf.header.next_leaf;
                if next_leaf == 0 {
                    self.leaf = None;
                    return None;
                }
                match self.tree.read_node(next_leaf) {
                    Ok(node) => self.leaf = Some(node),
                    Err(e) => {
                        // Fuse: a read failure here leaves the tree's true
                        // extent unknown, so don't retry the same block.
                        self.leaf = None;
                        return Some(Err(e));
                    }
                }
                self.idx = 0;
                continue;
            }

            let leaf = self.leaf.as_ref().expect("checked above");
            let key = &leaf.keys[self.idx];

            if !self.predicate.matches(key) {
                if self.stop_on_mismatch {
                    self.leaf = None;
                    return None;
                }
                self.idx += 1;
                continue;
            }

            let Pointers::Leaf(pointers) = &leaf.pointers else {
                unreachable!("leaf node must carry Leaf pointers")
            };
            let entry = IndexEntry {
                key: key.clone(),
                pointer: pointers[self.idx],
            };
            self.idx += 1;
            return Some(Ok(entry));
        }
    }
}
