//! Growable byte buffer with append-at-tail and consume-from-head.
//!
//! Every connection owns two of these: `incoming` accumulates bytes that
//! have been read but not yet parsed, `outgoing` queues serialized responses
//! that have not been flushed to the socket yet.

use bytes::{Buf, Bytes, BytesMut};
use std::ops::Deref;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// A FIFO byte queue backed by `BytesMut`.
#[derive(Debug)]
pub struct Buffer {
    inner: BytesMut,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    pub fn new() -> Self {
        Self {
            inner: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
        }
    }

    /// Appends `data` at the tail.
    pub fn append(&mut self, data: &[u8]) {
        self.inner.extend_from_slice(data);
    }

    /// Removes the first `n` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `n` is larger than the buffered length.
    pub fn consume(&mut self, n: usize) {
        assert!(
            n <= self.inner.len(),
            "consume({}) past the end of a {} byte buffer",
            n,
            self.inner.len()
        );
        self.inner.advance(n);
    }

    /// Removes the first `n` bytes and hands them out as a frozen `Bytes`.
    ///
    /// Slices of the returned value share the allocation, which is how request
    /// arguments avoid a copy.
    ///
    /// # Panics
    ///
    /// Panics if `n` is larger than the buffered length.
    pub fn split_front(&mut self, n: usize) -> Bytes {
        assert!(
            n <= self.inner.len(),
            "split_front({}) past the end of a {} byte buffer",
            n,
            self.inner.len()
        );
        self.inner.split_to(n).freeze()
    }

    /// Mutable access for serializers that reserve and patch header bytes.
    pub fn as_bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.inner
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.inner
    }
}
