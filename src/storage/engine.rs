//! Storage Engine
//!
//! This module implements the key-value store that commands run against.
//! It owns a [`HashTable`] and turns its record-level operations into the
//! `get`/`set`/`delete`/`keys` semantics the dispatcher needs.
//!
//! ## Design Decisions
//!
//! 1. **Context Object**: There is no process-wide store. Each `StorageEngine`
//!    is an independent value passed to whoever dispatches commands.
//! 2. **Single Owner**: The event loop runs every command to completion on
//!    one thread, so the engine needs no locks and takes `&mut self`.
//! 3. **Zero-Copy Values**: Keys and values are `Bytes`, so handing a value to
//!    a response is a reference-count bump, not a copy.
//! 4. **No Eviction**: Records live until they are deleted.

use crate::storage::table::{hash_key, HashTable, Record};
use bytes::Bytes;

/// Operation counters for the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
}

/// The main storage engine for pollkv.
///
/// # Example
///
/// ```
/// use pollkv::storage::StorageEngine;
/// use bytes::Bytes;
///
/// let mut engine = StorageEngine::new();
///
/// // Set a key
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"));
///
/// // Get the value
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
///
/// // Delete it
/// assert!(engine.delete(b"name"));
/// assert_eq!(engine.get(b"name"), None);
/// ```
#[derive(Debug, Default)]
pub struct StorageEngine {
    table: HashTable,
    get_count: u64,
    set_count: u64,
    del_count: u64,
}

impl StorageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the value for a key.
    pub fn get(&mut self, key: &[u8]) -> Option<Bytes> {
        self.get_count += 1;

        self.table
            .lookup_mut(hash_key(key), key)
            .map(|record| record.value.clone())
    }

    /// Sets a key-value pair.
    ///
    /// An existing record is updated in place; otherwise a new one is inserted.
    /// Key and value are copied, so the store never keeps a slice of a larger
    /// buffer (such as a connection's read buffer) alive.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&mut self, key: Bytes, value: Bytes) -> bool {
        self.set_count += 1;

        let record = Record::new(Bytes::copy_from_slice(&key), Bytes::copy_from_slice(&value));
        self.table.upsert(record).is_none()
    }

    /// Deletes a key from the database.
    ///
    /// # Returns
    ///
    /// Returns `true` if the key was deleted, `false` if it didn't exist.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.del_count += 1;
        self.table.delete(hash_key(key), key).is_some()
    }

    /// Iterates over all keys currently stored. Order is unspecified.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &Bytes> + '_ {
        self.table.iter().map(Record::key)
    }

    /// Returns the number of keys in the database.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if the database is empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns database statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.table.len() as u64,
            get_ops: self.get_count,
            set_ops: self.set_count,
            del_ops: self.del_count,
        }
    }
}
