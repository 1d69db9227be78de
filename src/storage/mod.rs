//! Storage Engine Module
//!
//! This module provides the core storage functionality for pollkv:
//! an arena-backed chaining hash table with incremental rehashing, and the
//! key-value engine built on top of it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │        get / set / delete / keys  +  op counters            │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │                    HashTable                          │  │
//! │  │   ┌─────────┐   migrate ≤128/op   ┌─────────┐         │  │
//! │  │   │  older  │ ──────────────────> │  newer  │         │  │
//! │  │   └─────────┘                     └─────────┘         │  │
//! │  │        chains of arena indices into Record slots      │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Chaining**: records are owned by the table and keep their arena index
//! - **Incremental Rehashing**: no single operation pays for a full resize
//! - **Borrowed Lookups**: probing takes `&[u8]`, no temporary record needed
//! - **Lazy Iteration**: `keys()` walks the table without a callback
//!
//! ## Example
//!
//! ```
//! use pollkv::storage::StorageEngine;
//! use bytes::Bytes;
//!
//! let mut engine = StorageEngine::new();
//! engine.set(Bytes::from("name"), Bytes::from("Ariz"));
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
//! assert_eq!(engine.keys().count(), 1);
//! ```

pub mod engine;
pub mod table;

// Re-export commonly used types
pub use engine::{StorageEngine, StorageStats};
pub use table::{hash_key, HashTable, Record};
