//! Chaining Hash Table with Incremental Rehashing
//!
//! This module implements the table that backs the storage engine.
//! It maps a 64-bit hash code to a chain of owned records. A record keeps
//! its arena index from insertion until it is deleted.
//!
//! ## Layout
//!
//! ```text
//!   arena: [ slot 0 | slot 1 | slot 2 | ... ]     records + chain links
//!              ▲        ▲
//!   newer:  [ head ]─┐  │                         lookups: newer, then older
//!   older:  [ head ]─┼──┘                         inserts: newer only
//!                    └─> next ─> next ─> None
//! ```
//!
//! Records live in an index arena. Buckets store the arena index of the first
//! record in their chain, and each record stores the index of the next one.
//! Moving a record between tables only rewrites links; the arena itself may
//! reallocate as it grows, so references into it never outlive a borrow.
//!
//! ## Incremental Rehashing
//!
//! Once the table reaches its load factor, the current bucket array becomes
//! `older` and an array twice the size becomes `newer`. Every mutating
//! operation then migrates at most [`REHASHING_WORK`] records, so a single
//! `set` or `del` never pays for the whole table. Migration is finished when
//! `older` is empty, at which point it is dropped.

use bytes::Bytes;

/// Bucket count of a freshly created table. Always a power of two.
const INITIAL_BUCKETS: usize = 4;

/// Records per bucket that trigger a resize.
pub const MAX_LOAD_FACTOR: usize = 1;

/// Upper bound on records migrated by a single operation.
pub const REHASHING_WORK: usize = 128;

/// FNV-style hash used for every key in the store.
///
/// `h = 0x811C9DC5; h = (h + byte) * 0x01000193` per byte, in 32-bit
/// wrapping arithmetic, widened to 64 bits.
#[inline]
pub fn hash_key(key: &[u8]) -> u64 {
    let mut h: u32 = 0x811C_9DC5;
    for &byte in key {
        h = h.wrapping_add(byte as u32).wrapping_mul(0x0100_0193);
    }
    h as u64
}

/// A key/value pair owned by the table.
///
/// The hash code is computed once at construction, so `hash_key(key) ==
/// hash` holds for every record that can reach the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    key: Bytes,
    hash: u64,
    /// The stored value; may be replaced in place.
    pub value: Bytes,
}

impl Record {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        let hash = hash_key(&key);
        Self { key, hash, value }
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn into_parts(self) -> (Bytes, Bytes) {
        (self.key, self.value)
    }
}

#[derive(Debug)]
struct Node {
    record: Record,
    next: Option<usize>,
}

#[derive(Debug)]
enum Slot {
    Occupied(Node),
    Vacant { next_free: Option<usize> },
}

/// Index arena holding every node of both bucket arrays.
#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Option<usize>,
}

impl Arena {
    fn alloc(&mut self, node: Node) -> usize {
        match self.free {
            Some(idx) => {
                self.free = match self.slots[idx] {
                    Slot::Vacant { next_free } => next_free,
                    Slot::Occupied(_) => unreachable!("free list points at an occupied slot"),
                };
                self.slots[idx] = Slot::Occupied(node);
                idx
            }
            None => {
                self.slots.push(Slot::Occupied(node));
                self.slots.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) -> Node {
        let slot = std::mem::replace(
            &mut self.slots[idx],
            Slot::Vacant {
                next_free: self.free,
            },
        );
        self.free = Some(idx);
        match slot {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => panic!("released vacant arena slot {}", idx),
        }
    }

    #[inline]
    fn node(&self, idx: usize) -> &Node {
        match &self.slots[idx] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => panic!("dangling chain link to slot {}", idx),
        }
    }

    #[inline]
    fn node_mut(&mut self, idx: usize) -> &mut Node {
        match &mut self.slots[idx] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => panic!("dangling chain link to slot {}", idx),
        }
    }
}

/// One bucket array. An unallocated array (no heads) stands for "no table".
#[derive(Debug, Default)]
struct Buckets {
    heads: Vec<Option<usize>>,
    mask: usize,
    len: usize,
}

impl Buckets {
    fn with_capacity(n: usize) -> Self {
        assert!(n.is_power_of_two(), "bucket count must be a power of two");
        Self {
            heads: vec![None; n],
            mask: n - 1,
            len: 0,
        }
    }

    #[inline]
    fn is_allocated(&self) -> bool {
        !self.heads.is_empty()
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.heads.len()
    }

    #[inline]
    fn bucket(&self, hash: u64) -> usize {
        (hash as usize) & self.mask
    }

    fn push_front(&mut self, arena: &mut Arena, idx: usize) {
        let pos = self.bucket(arena.node(idx).record.hash);
        arena.node_mut(idx).next = self.heads[pos];
        self.heads[pos] = Some(idx);
        self.len += 1;
    }

    fn find(&self, arena: &Arena, hash: u64, key: &[u8]) -> Option<usize> {
        if !self.is_allocated() {
            return None;
        }

        let mut cur = self.heads[self.bucket(hash)];
        while let Some(idx) = cur {
            let node = arena.node(idx);
            if node.record.hash == hash && node.record.key.as_ref() == key {
                return Some(idx);
            }
            cur = node.next;
        }
        None
    }

    fn unlink(&mut self, arena: &mut Arena, hash: u64, key: &[u8]) -> Option<usize> {
        if !self.is_allocated() {
            return None;
        }

        let pos = self.bucket(hash);
        let mut prev: Option<usize> = None;
        let mut cur = self.heads[pos];

        while let Some(idx) = cur {
            let node = arena.node(idx);
            let next = node.next;
            if node.record.hash == hash && node.record.key.as_ref() == key {
                match prev {
                    None => self.heads[pos] = next,
                    Some(p) => arena.node_mut(p).next = next,
                }
                self.len -= 1;
                return Some(idx);
            }
            prev = Some(idx);
            cur = next;
        }
        None
    }

    fn pop_front(&mut self, arena: &Arena, pos: usize) -> Option<usize> {
        let idx = self.heads[pos]?;
        self.heads[pos] = arena.node(idx).next;
        self.len -= 1;
        Some(idx)
    }
}

/// The store's hash table.
///
/// `insert` does not upsert: callers look the key up first and either
/// mutate the found record in place or insert a new one.
///
/// # Example
///
/// ```
/// use pollkv::storage::table::{hash_key, HashTable, Record};
/// use bytes::Bytes;
///
/// let mut table = HashTable::new();
/// table.insert(Record::new(Bytes::from("name"), Bytes::from("Ariz")));
///
/// let record = table.lookup(hash_key(b"name"), b"name").unwrap();
/// assert_eq!(record.value, Bytes::from("Ariz"));
/// ```
#[derive(Debug)]
pub struct HashTable {
    arena: Arena,
    newer: Buckets,
    older: Buckets,
    migrate_pos: usize,
}

impl Default for HashTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HashTable {
    pub fn new() -> Self {
        Self {
            arena: Arena::default(),
            newer: Buckets::with_capacity(INITIAL_BUCKETS),
            older: Buckets::default(),
            migrate_pos: 0,
        }
    }

    /// Finds the record for `key`. Checks the newer table first.
    pub fn lookup(&self, hash: u64, key: &[u8]) -> Option<&Record> {
        let idx = self.find_index(hash, key)?;
        Some(&self.arena.node(idx).record)
    }

    /// Like [`lookup`](Self::lookup), but allows replacing the value in place.
    /// Also advances any pending migration.
    pub fn lookup_mut(&mut self, hash: u64, key: &[u8]) -> Option<&mut Record> {
        self.help_rehashing();
        let idx = self.find_index(hash, key)?;
        Some(&mut self.arena.node_mut(idx).record)
    }

    /// Inserts a record at the head of its chain in the newer table.
    ///
    /// The caller must have checked that no record with the same key exists.
    pub fn insert(&mut self, record: Record) {
        debug_assert!(
            self.find_index(record.hash, &record.key).is_none(),
            "duplicate key inserted into hash table"
        );

        self.link_new(record);
        self.help_rehashing();
    }

    /// Stores `record`, replacing the value of an existing record with the
    /// same key. Returns the previous value, if there was one.
    ///
    /// One migration step covers both the probe and the insert.
    pub fn upsert(&mut self, record: Record) -> Option<Bytes> {
        self.help_rehashing();

        if let Some(idx) = self.find_index(record.hash, &record.key) {
            let existing = &mut self.arena.node_mut(idx).record.value;
            return Some(std::mem::replace(existing, record.value));
        }

        self.link_new(record);
        None
    }

    /// Unlinks the record for `key` and returns ownership of it.
    pub fn delete(&mut self, hash: u64, key: &[u8]) -> Option<Record> {
        self.help_rehashing();

        let idx = match self.newer.unlink(&mut self.arena, hash, key) {
            Some(idx) => idx,
            None => self.older.unlink(&mut self.arena, hash, key)?,
        };
        Some(self.arena.release(idx).record)
    }

    /// Number of records, tracked incrementally.
    pub fn len(&self) -> usize {
        self.newer.len + self.older.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true while records are still being moved to the newer table.
    pub fn is_rehashing(&self) -> bool {
        self.older.is_allocated()
    }

    /// Lazily visits every record: newer table first, chain order per bucket.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            arena: &self.arena,
            tables: [&self.newer, &self.older],
            table: 0,
            bucket: 0,
            cur: None,
            remaining: self.len(),
        }
    }

    fn find_index(&self, hash: u64, key: &[u8]) -> Option<usize> {
        self.newer
            .find(&self.arena, hash, key)
            .or_else(|| self.older.find(&self.arena, hash, key))
    }

    fn link_new(&mut self, record: Record) {
        let idx = self.arena.alloc(Node { record, next: None });
        self.newer.push_front(&mut self.arena, idx);

        if !self.older.is_allocated()
            && self.newer.len >= self.newer.capacity() * MAX_LOAD_FACTOR
        {
            self.trigger_rehashing();
        }
    }

    fn trigger_rehashing(&mut self) {
        let capacity = self.newer.capacity() * 2;
        self.older = std::mem::replace(&mut self.newer, Buckets::with_capacity(capacity));
        self.migrate_pos = 0;
    }

    fn help_rehashing(&mut self) {
        let mut moved = 0;
        while moved < REHASHING_WORK && self.older.len > 0 {
            match self.older.pop_front(&self.arena, self.migrate_pos) {
                Some(idx) => {
                    self.newer.push_front(&mut self.arena, idx);
                    moved += 1;
                }
                None => self.migrate_pos += 1,
            }
        }

        if self.older.is_allocated() && self.older.len == 0 {
            self.older = Buckets::default();
            self.migrate_pos = 0;
        }
    }
}

/// Iterator over the records of a [`HashTable`].
pub struct Iter<'a> {
    arena: &'a Arena,
    tables: [&'a Buckets; 2],
    table: usize,
    bucket: usize,
    cur: Option<usize>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<&'a Record> {
        loop {
            if let Some(idx) = self.cur {
                let node = self.arena.node(idx);
                self.cur = node.next;
                self.remaining -= 1;
                return Some(&node.record);
            }

            let table = self.tables.get(self.table)?;
            if self.bucket < table.heads.len() {
                self.cur = table.heads[self.bucket];
                self.bucket += 1;
            } else {
                self.table += 1;
                self.bucket = 0;
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a HashTable {
    type Item = &'a Record;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}
