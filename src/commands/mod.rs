//! Command Handler Module
//!
//! This module implements the command processing layer for pollkv.
//! It receives parsed requests, executes them against the storage engine,
//! and returns the values to send back.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Frame Parser   │  (protocol module)
//! └────────┬────────┘
//!          │ Vec<Bytes>
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Match verb   │
//! │  - Check arity  │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `get`, `set`, `del`, `keys`

pub mod handler;

// Re-export the main command handler
pub use handler::CommandHandler;
