//! Command Handler Module
//!
//! This module maps parsed requests to storage operations. A request is the
//! ordered list of strings from one frame; the first string is the verb.
//!
//! ## Supported Commands
//!
//! - `get key` - String(value), or Nil if the key is missing
//! - `set key value` - Nil
//! - `del key` - Integer(1) if a key was removed, Integer(0) otherwise
//! - `keys` - Array of every key as a String, in no particular order
//!
//! Verbs match exactly (lower case) together with their argument count.
//! Anything else gets `Error(UNKNOWN)`. Dispatch never fails the connection,
//! only the request.

use crate::protocol::types::{error_code, Value};
use crate::storage::{StorageEngine, StorageStats};
use bytes::Bytes;
use tracing::trace;

/// Handles commands by dispatching them to the storage engine.
///
/// The handler owns the engine it runs against, so several independent
/// handlers (and stores) can coexist in one process.
#[derive(Debug, Default)]
pub struct CommandHandler {
    /// The storage engine
    storage: StorageEngine,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: StorageEngine) -> Self {
        Self { storage }
    }

    /// Executes a command and returns the response.
    ///
    /// # Arguments
    ///
    /// * `args` - The strings of one request, verb first
    pub fn execute(&mut self, args: Vec<Bytes>) -> Value {
        trace!(argc = args.len(), "Executing command");

        let mut args = args.into_iter();
        let (verb, key, value) = (args.next(), args.next(), args.next());
        if args.next().is_some() {
            return unknown_command();
        }

        match (verb.as_deref(), key, value) {
            (Some(b"get"), Some(key), None) => self.cmd_get(&key),
            (Some(b"set"), Some(key), Some(value)) => self.cmd_set(key, value),
            (Some(b"del"), Some(key), None) => self.cmd_del(&key),
            (Some(b"keys"), None, None) => self.cmd_keys(),
            _ => unknown_command(),
        }
    }

    /// Read access to the engine, mainly for stats and tests.
    pub fn storage(&self) -> &StorageEngine {
        &self.storage
    }

    pub fn stats(&self) -> StorageStats {
        self.storage.stats()
    }

    /// GET key
    fn cmd_get(&mut self, key: &[u8]) -> Value {
        match self.storage.get(key) {
            Some(value) => Value::string(value),
            None => Value::nil(),
        }
    }

    /// SET key value
    fn cmd_set(&mut self, key: Bytes, value: Bytes) -> Value {
        self.storage.set(key, value);
        Value::nil()
    }

    /// DEL key
    fn cmd_del(&mut self, key: &[u8]) -> Value {
        Value::integer(self.storage.delete(key) as i64)
    }

    /// KEYS
    fn cmd_keys(&self) -> Value {
        Value::array(self.storage.keys().cloned().map(Value::String).collect())
    }
}

fn unknown_command() -> Value {
    Value::error(error_code::UNKNOWN, "unknown command")
}
