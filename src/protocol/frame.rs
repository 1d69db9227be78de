//! Length-Prefixed Framing
//!
//! Every message on the wire is a frame: a `u32` body length followed by the
//! body. Requests carry a list of strings, responses carry one tagged
//! [`Value`].
//!
//! ```text
//! request:  | total_len | nstr | len | str1 | len | str2 | ... |
//! response: | total_len | tagged value                          |
//! ```
//!
//! The length never counts its own 4 bytes. No frame may declare a body
//! larger than [`MAX_MESSAGE_SIZE`].

use crate::protocol::types::{error_code, Value};
use bytes::{BufMut, BytesMut};

/// Hard ceiling on any single request or response body (32 MiB).
pub const MAX_MESSAGE_SIZE: usize = 32 << 20;

/// Maximum number of strings a single request may declare.
pub const MAX_ARGS: usize = 200 * 1000;

/// Size of the length prefix in front of every frame.
pub const HEADER_LEN: usize = 4;

/// Message sent in place of a response that would exceed the ceiling.
pub const TOO_BIG_MESSAGE: &str = "response is too big.";

/// Appends one request frame for `args` to `out`.
///
/// # Example
///
/// ```
/// use pollkv::protocol::frame::encode_request;
/// use bytes::BytesMut;
///
/// let mut out = BytesMut::new();
/// encode_request(&[&b"get"[..], &b"foo"[..]], &mut out);
/// assert_eq!(out.len(), 4 + 4 + (4 + 3) + (4 + 3));
/// ```
pub fn encode_request<A: AsRef<[u8]>>(args: &[A], out: &mut BytesMut) {
    let body_len: usize = 4 + args.iter().map(|a| 4 + a.as_ref().len()).sum::<usize>();

    out.reserve(HEADER_LEN + body_len);
    out.put_u32_ne(body_len as u32);
    out.put_u32_ne(args.len() as u32);
    for arg in args {
        let arg = arg.as_ref();
        out.put_u32_ne(arg.len() as u32);
        out.put_slice(arg);
    }
}

/// Appends one response frame carrying `value` to `out`.
///
/// The length prefix is reserved first and patched once the body has been
/// serialized. A body over [`MAX_MESSAGE_SIZE`] is discarded and replaced by
/// a `TOO_BIG` error, so an oversized result is never partially sent.
///
/// Returns the body length that was written.
pub fn write_response(out: &mut BytesMut, value: &Value) -> usize {
    let header = out.len();
    out.put_u32_ne(0);

    value.serialize_into(out);
    let mut body_len = out.len() - header - HEADER_LEN;

    if body_len > MAX_MESSAGE_SIZE {
        out.truncate(header + HEADER_LEN);
        Value::error(error_code::TOO_BIG, TOO_BIG_MESSAGE).serialize_into(out);
        body_len = out.len() - header - HEADER_LEN;
    }

    out[header..header + HEADER_LEN].copy_from_slice(&(body_len as u32).to_ne_bytes());
    body_len
}

/// Reads the declared body length of the frame at the start of `buf`.
///
/// Returns `None` if fewer than 4 bytes are available.
#[inline]
pub fn peek_len(buf: &[u8]) -> Option<usize> {
    let header: [u8; HEADER_LEN] = buf.get(..HEADER_LEN)?.try_into().ok()?;
    Some(u32::from_ne_bytes(header) as usize)
}
