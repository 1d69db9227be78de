//! Binary Wire Protocol
//!
//! This module implements the length-prefixed binary protocol spoken between
//! pollkv clients and the server.
//!
//! ## Overview
//!
//! Every message is a frame: a `u32` body length, then the body. A request
//! body is a list of strings, a response body is one tagged value. Integers
//! are copied in host byte order, so client and server builds must agree on
//! endianness.
//!
//! ```text
//! request:  | u32 len | u32 nstr | u32 len | bytes | ... |
//! response: | u32 len | u8 tag | payload ...              |
//! ```
//!
//! ## Modules
//!
//! - `types`: Defines the `Value` enum and serialization
//! - `frame`: Frame encoding, the size ceiling and the `TOO_BIG` fallback
//! - `parser`: Zero-copy parser for incoming frames
//!
//! ## Example
//!
//! ```
//! use pollkv::protocol::{encode_request, parse_response, write_response, Value};
//! use bytes::{Bytes, BytesMut};
//!
//! // A client encodes a request
//! let mut request = BytesMut::new();
//! encode_request(&["get", "name"], &mut request);
//!
//! // The server frames a response
//! let mut response = BytesMut::new();
//! write_response(&mut response, &Value::string(Bytes::from("Ariz")));
//!
//! // The client decodes it
//! let (value, consumed) = parse_response(&response).unwrap().unwrap();
//! assert_eq!(value, Value::string(Bytes::from("Ariz")));
//! assert_eq!(consumed, response.len());
//! ```

pub mod frame;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use frame::{encode_request, write_response, MAX_MESSAGE_SIZE};
pub use parser::{check_frame, parse_request, parse_response, ParseError, ParseResult};
pub use types::{error_code, Value};
