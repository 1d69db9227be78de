//! Zero-Copy Frame Parser
//!
//! This module parses request frames on the server and response frames on
//! the client.
//!
//! ## How the Parser Works
//!
//! Frame detection and body parsing are separate steps:
//!
//! 1. [`check_frame`] looks at the length prefix and returns
//!    - `Ok(Some(n))` - a complete frame of `n` bytes (header included) is buffered
//!    - `Ok(None)` - the frame is incomplete, read more
//!    - `Err(ParseError)` - the declared length is over the ceiling
//! 2. The caller splits those `n` bytes off its buffer as `Bytes` and hands the
//!    body to [`parse_request`], which returns each argument as a slice of
//!    that same allocation.
//!
//! A body that runs past its declared length, or that has bytes left over
//! after the declared string count, is an error. There is no
//! resynchronization: the caller is expected to drop the connection.
//!
//! [`parse_response`] does both steps at once for the client, and decodes
//! the tagged value into a [`Value`].

use crate::protocol::frame::{peek_len, HEADER_LEN, MAX_ARGS, MAX_MESSAGE_SIZE};
use crate::protocol::types::{tag, Value};
use bytes::{Buf, Bytes};
use std::io::Cursor;
use thiserror::Error;

/// Errors that can occur while parsing a frame.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The frame declares a body larger than the ceiling
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The body ended before the declared content did
    #[error("truncated frame body")]
    Truncated,

    /// Bytes left in the body after the declared content
    #[error("{0} trailing bytes after frame content")]
    TrailingBytes(usize),

    /// The request declares more strings than allowed
    #[error("too many arguments: {count} (max: {max})")]
    TooManyArgs { count: usize, max: usize },

    /// Unknown value tag byte
    #[error("unknown value tag: {0:#04x}")]
    UnknownTag(u8),

    /// Arrays nested deeper than allowed
    #[error("maximum nesting depth exceeded: {0}")]
    NestingTooDeep(usize),

    /// Invalid UTF-8 in an error message
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// Checks whether `buf` starts with a complete frame.
///
/// # Returns
///
/// - `Ok(Some(n))` - a complete frame of `n` bytes, header included
/// - `Ok(None)` - incomplete data, need more bytes
/// - `Err(e)` - the declared length exceeds [`MAX_MESSAGE_SIZE`]
pub fn check_frame(buf: &[u8]) -> ParseResult<Option<usize>> {
    let len = match peek_len(buf) {
        Some(len) => len,
        None => return Ok(None),
    };

    if len > MAX_MESSAGE_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    if buf.len() < HEADER_LEN + len {
        return Ok(None);
    }

    Ok(Some(HEADER_LEN + len))
}

/// Parses a request body (without its length prefix) into its strings.
///
/// Each returned argument shares the allocation of `body`.
///
/// # Example
///
/// ```
/// use pollkv::protocol::frame::{encode_request, HEADER_LEN};
/// use pollkv::protocol::parse_request;
/// use bytes::BytesMut;
///
/// let mut out = BytesMut::new();
/// encode_request(&["get", "foo"], &mut out);
/// let frame = out.freeze();
///
/// let args = parse_request(frame.slice(HEADER_LEN..)).unwrap();
/// assert_eq!(args, vec!["get", "foo"]);
/// ```
pub fn parse_request(body: Bytes) -> ParseResult<Vec<Bytes>> {
    let mut pos = 0;

    let count = read_u32(&body, &mut pos)? as usize;
    if count > MAX_ARGS {
        return Err(ParseError::TooManyArgs {
            count,
            max: MAX_ARGS,
        });
    }

    // Each string needs at least its 4-byte length.
    let mut args = Vec::with_capacity(count.min(body.len() / 4));
    while args.len() < count {
        let len = read_u32(&body, &mut pos)? as usize;
        if body.len() - pos < len {
            return Err(ParseError::Truncated);
        }
        args.push(body.slice(pos..pos + len));
        pos += len;
    }

    if pos != body.len() {
        return Err(ParseError::TrailingBytes(body.len() - pos));
    }

    Ok(args)
}

/// Attempts to parse one response frame from the start of `buf`.
///
/// # Returns
///
/// - `Ok(Some((value, consumed)))` - Successfully parsed a frame
/// - `Ok(None)` - Incomplete data, need more bytes
/// - `Err(e)` - Parse error
pub fn parse_response(buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
    let frame_len = match check_frame(buf)? {
        Some(n) => n,
        None => return Ok(None),
    };

    let mut src = Cursor::new(&buf[HEADER_LEN..frame_len]);
    let value = parse_value(&mut src, 0)?;

    if src.has_remaining() {
        return Err(ParseError::TrailingBytes(src.remaining()));
    }

    Ok(Some((value, frame_len)))
}

/// Internal recursive value decoder.
fn parse_value(src: &mut Cursor<&[u8]>, depth: usize) -> ParseResult<Value> {
    if depth > MAX_NESTING_DEPTH {
        return Err(ParseError::NestingTooDeep(MAX_NESTING_DEPTH));
    }

    ensure(src, 1)?;
    match src.get_u8() {
        tag::NIL => Ok(Value::Nil),
        tag::ERROR => {
            ensure(src, 8)?;
            let code = src.get_u32_ne();
            let len = src.get_u32_ne() as usize;
            let message = std::str::from_utf8(get_bytes(src, len)?)
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Value::error(code, message))
        }
        tag::STRING => {
            ensure(src, 4)?;
            let len = src.get_u32_ne() as usize;
            let data = get_bytes(src, len)?;
            Ok(Value::String(Bytes::copy_from_slice(data)))
        }
        tag::INTEGER => {
            ensure(src, 8)?;
            Ok(Value::Integer(src.get_i64_ne()))
        }
        tag::DOUBLE => {
            ensure(src, 8)?;
            Ok(Value::Double(src.get_f64_ne()))
        }
        tag::ARRAY => {
            ensure(src, 4)?;
            let count = src.get_u32_ne() as usize;
            // Every element takes at least its tag byte.
            let mut values = Vec::with_capacity(count.min(src.remaining()));
            for _ in 0..count {
                values.push(parse_value(src, depth + 1)?);
            }
            Ok(Value::Array(values))
        }
        other => Err(ParseError::UnknownTag(other)),
    }
}

#[inline]
fn read_u32(buf: &[u8], pos: &mut usize) -> ParseResult<u32> {
    let bytes: [u8; 4] = buf
        .get(*pos..*pos + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or(ParseError::Truncated)?;
    *pos += 4;
    Ok(u32::from_ne_bytes(bytes))
}

#[inline]
fn ensure(src: &Cursor<&[u8]>, n: usize) -> ParseResult<()> {
    if src.remaining() < n {
        return Err(ParseError::Truncated);
    }
    Ok(())
}

fn get_bytes<'a>(src: &mut Cursor<&'a [u8]>, n: usize) -> ParseResult<&'a [u8]> {
    ensure(src, n)?;
    let inner: &'a [u8] = *src.get_ref();
    let start = src.position() as usize;
    src.advance(n);
    Ok(&inner[start..start + n])
}
