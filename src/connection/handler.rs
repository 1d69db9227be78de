//! Connection State Machine
//!
//! This module holds the per-socket state of one client: its buffered input
//! and output and what it is waiting for. The event loop calls into it when
//! the socket becomes readable or writable. Nothing in here blocks.
//!
//! ## Connection Lifecycle
//!
//! ```text
//!              accept
//!                │
//!                ▼
//!        ┌───────────────┐   outgoing non-empty   ┌───────────────┐
//!        │ AwaitingRead  │ ─────────────────────> │ AwaitingWrite │
//!        │               │ <───────────────────── │               │
//!        └───────┬───────┘    outgoing drained    └───────┬───────┘
//!                │                                        │
//!                │ EOF / I/O error / protocol violation   │ I/O error
//!                ▼                                        ▼
//!        ┌─────────────────────────────────────────────────────────┐
//!        │                        Closing                          │
//!        │          (torn down by the event loop)                  │
//!        └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a stream protocol. One read may deliver half a request or several
//! of them. Bytes accumulate in `incoming` until at least one whole frame is
//! there. Every complete frame is then answered in arrival order before the
//! next read, so pipelined requests never wait on each other's responses.
//! Responses queue in `outgoing` and are flushed as far as the socket takes
//! them.

use crate::commands::CommandHandler;
use crate::connection::buffer::Buffer;
use crate::protocol::frame::{write_response, HEADER_LEN};
use crate::protocol::parser::{check_frame, parse_request, ParseError};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use tracing::{debug, trace, warn};

/// Bytes requested from the socket per read call (64 KB)
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// What a connection is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Waiting for request bytes.
    AwaitingRead,
    /// Waiting to flush queued responses. `outgoing` is never empty here.
    AwaitingWrite,
    /// Done; the event loop will drop the socket.
    Closing,
}

/// Statistics for connection handling
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: u64,
    /// Currently active connections
    pub active_connections: u64,
    /// Total commands processed
    pub commands_processed: u64,
    /// Total bytes read
    pub bytes_read: u64,
    /// Total bytes written
    pub bytes_written: u64,
    /// Connections dropped for malformed or oversized requests
    pub protocol_errors: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&mut self) {
        self.connections_accepted += 1;
        self.active_connections += 1;
    }

    pub fn connection_closed(&mut self) {
        self.active_connections -= 1;
    }

    pub fn command_processed(&mut self) {
        self.commands_processed += 1;
    }

    pub fn bytes_read(&mut self, count: usize) {
        self.bytes_read += count as u64;
    }

    pub fn bytes_written(&mut self, count: usize) {
        self.bytes_written += count as u64;
    }

    pub fn protocol_error(&mut self) {
        self.protocol_errors += 1;
    }
}

/// Why a connection was closed.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Malformed or oversized request
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial request)
    #[error("Unexpected end of stream")]
    UnexpectedEof,
}

/// A single client connection.
///
/// Generic over the stream so the state machine can be driven by anything
/// that reads and writes without blocking; the server uses
/// `mio::net::TcpStream`.
#[derive(Debug)]
pub struct Connection<S> {
    /// The non-blocking stream for this connection
    stream: S,

    /// Client's address (for logging)
    addr: SocketAddr,

    state: ConnState,

    /// Bytes read but not yet parsed
    incoming: Buffer,

    /// Serialized responses not yet written
    outgoing: Buffer,

    close_reason: Option<ConnectionError>,
}

impl<S: Read + Write> Connection<S> {
    /// Creates a connection that starts out waiting for a request.
    pub fn new(stream: S, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            state: ConnState::AwaitingRead,
            incoming: Buffer::new(),
            outgoing: Buffer::new(),
            close_reason: None,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn is_closing(&self) -> bool {
        self.state == ConnState::Closing
    }

    /// The first error that moved this connection to `Closing`, if any.
    pub fn close_reason(&self) -> Option<&ConnectionError> {
        self.close_reason.as_ref()
    }

    /// Bytes of queued responses not yet written.
    pub fn pending_output(&self) -> usize {
        self.outgoing.len()
    }

    /// Bytes received but not yet consumed as a request.
    pub fn buffered_input(&self) -> usize {
        self.incoming.len()
    }

    /// Marks the connection for teardown, e.g. on a socket error event.
    pub fn close(&mut self, reason: ConnectionError) {
        self.state = ConnState::Closing;
        if self.close_reason.is_none() {
            self.close_reason = Some(reason);
        }
    }

    /// Called when the socket is readable.
    ///
    /// Drains the socket, answering every complete request as soon as its
    /// bytes are in. If responses are queued afterwards, switches to
    /// `AwaitingWrite` and tries to write right away: in a request-response
    /// protocol the socket is almost always writable at this point.
    pub fn handle_read(&mut self, handler: &mut CommandHandler, stats: &mut ConnectionStats) {
        debug_assert_eq!(self.state, ConnState::AwaitingRead);

        let mut eof = false;

        loop {
            // Read straight into the tail of `incoming`, then trim the unused part.
            let buf = self.incoming.as_bytes_mut();
            let start = buf.len();
            buf.resize(start + READ_CHUNK_SIZE, 0);
            let result = self.stream.read(&mut buf[start..]);
            buf.truncate(start + result.as_ref().map_or(0, |n| *n));

            match result {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => {
                    stats.bytes_read(n);
                    trace!(client = %self.addr, bytes = n, "Read data");

                    while self.try_one_request(handler, stats) {}
                    if self.is_closing() {
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "read() error");
                    self.close(e.into());
                    return;
                }
            }
        }

        if !self.outgoing.is_empty() {
            self.state = ConnState::AwaitingWrite;
            self.handle_write(stats);
        }

        if eof && !self.is_closing() {
            if self.incoming.is_empty() {
                debug!(client = %self.addr, "Client closed");
                self.close(ConnectionError::ClientDisconnected);
            } else {
                warn!(
                    client = %self.addr,
                    buffered = self.incoming.len(),
                    "Unexpected EOF"
                );
                self.close(ConnectionError::UnexpectedEof);
            }
        }
    }

    /// Called when the socket is writable.
    ///
    /// Writes as much of `outgoing` as the socket accepts. Once everything is
    /// flushed the connection goes back to `AwaitingRead`.
    ///
    /// # Panics
    ///
    /// Panics if there is nothing to write.
    pub fn handle_write(&mut self, stats: &mut ConnectionStats) {
        assert!(
            !self.outgoing.is_empty(),
            "write attempted with an empty output buffer"
        );

        while !self.outgoing.is_empty() {
            match self.stream.write(&self.outgoing) {
                Ok(0) => {
                    warn!(client = %self.addr, "write() returned zero bytes");
                    self.close(io::Error::from(io::ErrorKind::WriteZero).into());
                    return;
                }
                Ok(n) => {
                    self.outgoing.consume(n);
                    stats.bytes_written(n);
                    trace!(
                        client = %self.addr,
                        bytes = n,
                        remaining = self.outgoing.len(),
                        "Wrote data"
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "write() error");
                    self.close(e.into());
                    return;
                }
            }
        }

        self.state = ConnState::AwaitingRead;
    }

    /// Answers one request if a complete frame is buffered.
    ///
    /// Returns true if a request was consumed. A request over the size limit
    /// or a malformed body closes the connection; the rest of the buffer is
    /// discarded with it.
    fn try_one_request(&mut self, handler: &mut CommandHandler, stats: &mut ConnectionStats) -> bool {
        let frame_len = match check_frame(&self.incoming) {
            Ok(Some(n)) => n,
            Ok(None) => return false,
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Request too long");
                stats.protocol_error();
                self.close(e.into());
                return false;
            }
        };

        let frame = self.incoming.split_front(frame_len);
        let args = match parse_request(frame.slice(HEADER_LEN..)) {
            Ok(args) => args,
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Bad request");
                stats.protocol_error();
                self.close(e.into());
                return false;
            }
        };

        trace!(
            client = %self.addr,
            consumed = frame_len,
            remaining = self.incoming.len(),
            "Parsed request"
        );

        let response = handler.execute(args);
        write_response(self.outgoing.as_bytes_mut(), &response);
        stats.command_processed();
        true
    }
}
