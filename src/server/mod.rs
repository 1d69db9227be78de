//! Server Module
//!
//! The single-threaded event loop that owns the listening socket, every
//! client connection and the store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Server                            │
//! │                                                          │
//! │   mio::Poll ──> listener ──> accept ──> connection table │
//! │       │                                      │           │
//! │       │ readiness                            │ fd index  │
//! │       ▼                                      ▼           │
//! │   ┌──────────────┐   requests   ┌──────────────────┐     │
//! │   │  Connection  │ ───────────> │  CommandHandler  │     │
//! │   └──────────────┘ <─────────── └──────────────────┘     │
//! │                      responses                           │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use pollkv::server::Server;
//!
//! let mut server = Server::bind("127.0.0.1:1234".parse().unwrap()).unwrap();
//! let shutdown = server.shutdown_handle();
//!
//! std::thread::spawn(move || {
//!     // ... later, from another thread
//!     shutdown.shutdown().unwrap();
//! });
//!
//! server.run().unwrap();
//! ```

pub mod event_loop;

pub use event_loop::{Server, ShutdownHandle};
