//! # pollkv - A Single-Threaded In-Memory Key-Value Server
//!
//! pollkv serves an in-memory byte-string map over TCP. One thread
//! multiplexes every client with readiness polling; requests and responses
//! travel as length-prefixed binary frames.
//!
//! ## Features
//!
//! - **Event Loop**: a single `mio` poll loop, no threads and no locks
//! - **Pipelining**: any number of requests per packet, answered in order
//! - **Incremental Rehashing**: the table grows without long pauses
//! - **Zero-Copy Parsing**: arguments are `Bytes` slices of the received frame
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              pollkv                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ Event Loop  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (mio Poll)  │    │ State Mach. │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌──────────────────────────────┐ │
//! │                     │  Frame      │    │        StorageEngine         │ │
//! │                     │  Codec      │    │  ┌────────┐   ┌────────┐     │ │
//! │                     └─────────────┘    │  │ newer  │<──│ older  │     │ │
//! │                                        │  └────────┘   └────────┘     │ │
//! │                                        │   incremental migration      │ │
//! │                                        └──────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use pollkv::server::Server;
//!
//! fn main() -> std::io::Result<()> {
//!     let mut server = Server::bind("0.0.0.0:1234".parse().unwrap())?;
//!     server.run()
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `get key`
//! - `set key value`
//! - `del key`
//! - `keys`
//!
//! ## Module Overview
//!
//! - [`protocol`]: frame codec, response values and parsers
//! - [`storage`]: hash table with incremental rehashing and the storage engine
//! - [`commands`]: maps requests to storage operations
//! - [`connection`]: per-client buffers and the read/write state machine
//! - [`server`]: the event loop and connection table
//! - [`client`]: async client used by the load generator and tests
//!
//! ## Design Highlights
//!
//! ### Single Thread
//!
//! The store, the connections and the event loop all belong to the thread
//! running [`server::Server::run`]. Nothing is shared, so nothing is locked.
//!
//! ### Bounded Pauses
//!
//! When the table grows, existing records are moved to the larger table a
//! fixed number at a time, spread over later operations. No single request
//! pays for a full rehash.
//!
//! ### Host Byte Order
//!
//! Frame lengths and integers are sent in the host's native byte order.
//! Clients and servers on machines of different endianness cannot talk.

pub mod client;
pub mod commands;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use client::{Client, ClientError};
pub use commands::CommandHandler;
pub use connection::{Connection, ConnectionStats};
pub use protocol::{ParseError, Value};
pub use server::{Server, ShutdownHandle};
pub use storage::{HashTable, StorageEngine};

/// The default port pollkv listens on
pub const DEFAULT_PORT: u16 = 1234;

/// The default host pollkv binds to (all interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of pollkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
