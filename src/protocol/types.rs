//! Response Value Types
//!
//! This module defines the tagged values a server response carries.
//! A response body is one tagged value; arrays nest further values.
//!
//! ## Wire Format
//!
//! Each value starts with a one-byte tag:
//! - `0` Nil
//! - `1` Error: `u32 code`, `u32 len`, message bytes
//! - `2` String: `u32 len`, bytes
//! - `3` Integer: `i64`
//! - `4` Double: `f64`
//! - `5` Array: `u32 count`, then `count` tagged values
//!
//! Integers and floats are written in host byte order. Client and server
//! must therefore run on machines with the same endianness.

use bytes::{BufMut, Bytes};
use std::fmt;

/// Response tag bytes
pub mod tag {
    pub const NIL: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const STRING: u8 = 2;
    pub const INTEGER: u8 = 3;
    pub const DOUBLE: u8 = 4;
    pub const ARRAY: u8 = 5;
}

/// Error codes carried by `Value::Error`
pub mod error_code {
    /// Unknown command or wrong number of arguments
    pub const UNKNOWN: u32 = 1;
    /// The response would exceed the frame size limit
    pub const TOO_BIG: u32 = 2;
}

/// A value in a server response.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value, e.g. `get` on a missing key or the reply to `set`.
    Nil,

    /// Application-level error. The connection stays open.
    Error { code: u32, message: String },

    /// Binary-safe string.
    String(Bytes),

    /// 64-bit signed integer.
    Integer(i64),

    /// 64-bit float.
    Double(f64),

    /// Ordered list of values.
    Array(Vec<Value>),
}

impl Value {
    pub fn nil() -> Self {
        Value::Nil
    }

    /// Creates a new error response.
    ///
    /// # Example
    /// ```
    /// use pollkv::protocol::types::{error_code, Value};
    /// let err = Value::error(error_code::UNKNOWN, "unknown command");
    /// ```
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Value::Error {
            code,
            message: message.into(),
        }
    }

    /// Creates a new string response.
    pub fn string(data: impl Into<Bytes>) -> Self {
        Value::String(data.into())
    }

    pub fn integer(n: i64) -> Self {
        Value::Integer(n)
    }

    pub fn double(n: f64) -> Self {
        Value::Double(n)
    }

    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(values)
    }

    /// Serializes the value to a fresh buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the value into an existing buffer.
    pub fn serialize_into<B: BufMut>(&self, buf: &mut B) {
        match self {
            Value::Nil => buf.put_u8(tag::NIL),
            Value::Error { code, message } => {
                buf.put_u8(tag::ERROR);
                buf.put_u32_ne(*code);
                buf.put_u32_ne(message.len() as u32);
                buf.put_slice(message.as_bytes());
            }
            Value::String(data) => {
                buf.put_u8(tag::STRING);
                buf.put_u32_ne(data.len() as u32);
                buf.put_slice(data);
            }
            Value::Integer(n) => {
                buf.put_u8(tag::INTEGER);
                buf.put_i64_ne(*n);
            }
            Value::Double(n) => {
                buf.put_u8(tag::DOUBLE);
                buf.put_f64_ne(*n);
            }
            Value::Array(values) => {
                buf.put_u8(tag::ARRAY);
                buf.put_u32_ne(values.len() as u32);
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    /// Number of bytes `serialize_into` will write.
    pub fn serialized_len(&self) -> usize {
        match self {
            Value::Nil => 1,
            Value::Error { message, .. } => 1 + 4 + 4 + message.len(),
            Value::String(data) => 1 + 4 + data.len(),
            Value::Integer(_) | Value::Double(_) => 1 + 8,
            Value::Array(values) => 1 + 4 + values.iter().map(Value::serialized_len).sum::<usize>(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error { .. })
    }

    /// Returns the error code if this is an Error.
    pub fn error_code(&self) -> Option<u32> {
        match self {
            Value::Error { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Attempts to extract the inner bytes from a String.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(b) => Some(b),
            _ => None,
        }
    }

    /// Attempts to extract the inner integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract the inner array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Consumes self and returns the inner array if this is an Array variant.
    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "(nil)"),
            Value::Error { code, message } => write!(f, "(err) {} {}", code, message),
            Value::String(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "(str) {}", s)
                } else {
                    write!(f, "(str) <{} bytes>", data.len())
                }
            }
            Value::Integer(n) => write!(f, "(int) {}", n),
            Value::Double(n) => write!(f, "(dbl) {}", n),
            Value::Array(values) => {
                write!(f, "(arr) len={}", values.len())?;
                for v in values {
                    write!(f, "\n{}", v)?;
                }
                write!(f, "\n(arr) end")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_serialize() {
        assert_eq!(Value::nil().serialize(), vec![tag::NIL]);
    }

    #[test]
    fn test_error_serialize() {
        let value = Value::error(error_code::UNKNOWN, "bad");
        let mut expected = vec![tag::ERROR];
        expected.extend_from_slice(&1u32.to_ne_bytes());
        expected.extend_from_slice(&3u32.to_ne_bytes());
        expected.extend_from_slice(b"bad");
        assert_eq!(value.serialize(), expected);
    }

    #[test]
    fn test_string_serialize() {
        let value = Value::string(Bytes::from("hello"));
        let mut expected = vec![tag::STRING];
        expected.extend_from_slice(&5u32.to_ne_bytes());
        expected.extend_from_slice(b"hello");
        assert_eq!(value.serialize(), expected);
    }

    #[test]
    fn test_integer_serialize() {
        let value = Value::integer(-42);
        let mut expected = vec![tag::INTEGER];
        expected.extend_from_slice(&(-42i64).to_ne_bytes());
        assert_eq!(value.serialize(), expected);
    }

    #[test]
    fn test_double_serialize() {
        let value = Value::double(1.5);
        let mut expected = vec![tag::DOUBLE];
        expected.extend_from_slice(&1.5f64.to_ne_bytes());
        assert_eq!(value.serialize(), expected);
    }

    #[test]
    fn test_nested_array_serialize() {
        let value = Value::array(vec![
            Value::integer(1),
            Value::array(vec![Value::nil(), Value::string(Bytes::from("x"))]),
        ]);
        let mut expected = vec![tag::ARRAY];
        expected.extend_from_slice(&2u32.to_ne_bytes());
        expected.push(tag::INTEGER);
        expected.extend_from_slice(&1i64.to_ne_bytes());
        expected.push(tag::ARRAY);
        expected.extend_from_slice(&2u32.to_ne_bytes());
        expected.push(tag::NIL);
        expected.push(tag::STRING);
        expected.extend_from_slice(&1u32.to_ne_bytes());
        expected.push(b'x');
        assert_eq!(value.serialize(), expected);
    }

    #[test]
    fn test_serialized_len_matches_output() {
        let value = Value::array(vec![
            Value::error(error_code::TOO_BIG, "response is too big."),
            Value::string(Bytes::from("abc")),
            Value::double(2.0),
            Value::array(vec![]),
        ]);
        assert_eq!(value.serialized_len(), value.serialize().len());
    }

    #[test]
    fn test_accessors() {
        assert!(Value::nil().is_nil());
        assert_eq!(Value::error(2, "x").error_code(), Some(2));
        assert_eq!(Value::integer(7).as_integer(), Some(7));
        assert_eq!(Value::string(Bytes::from("v")).as_bytes(), Some(&b"v"[..]));
        assert_eq!(
            Value::array(vec![Value::nil()]).into_array(),
            Some(vec![Value::Nil])
        );
    }
}
