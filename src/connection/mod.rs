//! Connection Handler Module
//!
//! This module manages individual client connections to pollkv.
//! All connections are multiplexed on one thread: the event loop in the
//! `server` module owns them and hands each one the readiness events for
//! its socket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Event Loop                              │
//! │                   (server module)                           │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ readable / writable
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Connection                               │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Parse frame │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Queue resp  │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Non-blocking I/O**: reads and writes stop at `WouldBlock`
//! - **Buffer Management**: `BytesMut` buffers for both directions
//! - **Pipelining**: several requests per read are answered in order
//! - **Statistics**: Tracks connection and command metrics

pub mod buffer;
pub mod handler;

pub use buffer::Buffer;
pub use handler::{ConnState, Connection, ConnectionError, ConnectionStats};
