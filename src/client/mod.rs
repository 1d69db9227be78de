//! Client Module
//!
//! An async client for the pollkv protocol, built on Tokio. It is used by
//! the `pollkv-bench` load generator and by the server's network tests.
//!
//! Requests are sent as length-prefixed string lists; each call waits for
//! the matching response frame. [`Client::pipeline`] sends a batch of
//! requests before reading any of the responses.

pub mod tcp_client;

pub use tcp_client::{Client, ClientError};
