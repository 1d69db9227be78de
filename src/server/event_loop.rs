//! Readiness Event Loop
//!
//! One thread, one `mio::Poll`, every socket non-blocking. Each turn of the
//! loop waits for readiness, then:
//!
//! 1. drains the listener with `accept` until it would block,
//! 2. services ready connections in ascending connection-table order,
//! 3. tears down every connection that ended up `Closing`.
//!
//! mio is edge-triggered, so the connection code always drains the socket in
//! the direction it is interested in. A connection's interest follows its
//! state: `READABLE` while awaiting a request, `WRITABLE` while responses are
//! queued. Re-registering on a state change re-arms readiness.
//!
//! Connections live in a table indexed by their file descriptor, which is
//! also their poll token. The kernel never hands out a descriptor that is
//! still open, so a slot is free whenever a new socket lands on it.

use crate::commands::CommandHandler;
use crate::connection::{ConnState, Connection, ConnectionError, ConnectionStats};
use crate::storage::StorageStats;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Token of the listening socket. Descriptors never get near it.
const LISTENER: Token = Token(usize::MAX - 1);

/// Token of the shutdown waker.
const WAKER: Token = Token(usize::MAX - 2);

/// Readiness events fetched per wait
const EVENTS_CAPACITY: usize = 1024;

/// Requested listen backlog. The kernel clamps it to its configured maximum.
const LISTEN_BACKLOG: i32 = i32::MAX;

/// Creates the non-blocking listening socket with `SO_REUSEADDR` set and the
/// largest backlog the system allows.
fn listen(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(TcpListener::from_std(socket.into()))
}

/// Stops a running [`Server`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    fn new(registry: &Registry) -> io::Result<Self> {
        Ok(Self {
            waker: Arc::new(Waker::new(registry, WAKER)?),
            requested: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Asks the event loop to stop after its current turn.
    pub fn shutdown(&self) -> io::Result<()> {
        self.requested.store(true, Ordering::Release);
        self.waker.wake()
    }

    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// A ready connection collected from one batch of events.
#[derive(Debug, Clone, Copy)]
struct Ready {
    fd: usize,
    readable: bool,
    writable: bool,
    error: bool,
}

/// The pollkv server: listener, connection table and store, all driven from
/// the thread that calls [`Server::run`].
#[derive(Debug)]
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,

    /// Connections indexed by file descriptor
    connections: Vec<Option<Connection<TcpStream>>>,

    handler: CommandHandler,
    stats: ConnectionStats,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Binds a listening socket on `addr` with an empty store.
    ///
    /// The socket is non-blocking with `SO_REUSEADDR` set and the system's
    /// maximum backlog. Port 0 picks an ephemeral port; see
    /// [`Server::local_addr`].
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        Self::with_handler(addr, CommandHandler::default())
    }

    /// Binds a listening socket that serves requests through `handler`.
    pub fn with_handler(addr: SocketAddr, handler: CommandHandler) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut listener = listen(addr)?;
        let local_addr = listener.local_addr()?;

        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let shutdown = ShutdownHandle::new(poll.registry())?;

        Ok(Self {
            poll,
            listener,
            local_addr,
            connections: Vec::new(),
            handler,
            stats: ConnectionStats::new(),
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    pub fn storage_stats(&self) -> StorageStats {
        self.handler.stats()
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.iter().filter(|slot| slot.is_some()).count()
    }

    /// Runs the event loop until shutdown is requested.
    ///
    /// Per-connection failures close that connection only. The only errors
    /// returned are failures of the readiness wait itself.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        let mut ready = Vec::new();

        info!(addr = %self.local_addr, "Listening for connections");

        while !self.shutdown.is_shutdown() {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %e, "poll() failed");
                return Err(e);
            }

            let mut accept_ready = false;
            ready.clear();
            for event in events.iter() {
                match event.token() {
                    LISTENER => accept_ready = true,
                    WAKER => {}
                    Token(fd) => ready.push(Ready {
                        fd,
                        readable: event.is_readable() || event.is_read_closed(),
                        writable: event.is_writable(),
                        error: event.is_error(),
                    }),
                }
            }

            if accept_ready {
                self.accept_connections();
            }

            ready.sort_unstable_by_key(|r| r.fd);
            for r in &ready {
                self.service(*r);
            }

            self.close_finished();
        }

        info!("Shutdown requested, closing {} connections", self.connection_count());
        self.close_all();
        info!(
            accepted = self.stats.connections_accepted,
            commands = self.stats.commands_processed,
            bytes_read = self.stats.bytes_read,
            bytes_written = self.stats.bytes_written,
            protocol_errors = self.stats.protocol_errors,
            keys = self.handler.stats().keys,
            "Server stopped"
        );
        Ok(())
    }

    /// Accepts until the listener would block.
    fn accept_connections(&mut self) {
        loop {
            let (mut stream, addr) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "accept() error");
                    return;
                }
            };

            let fd = stream.as_raw_fd() as usize;
            if let Err(e) = self
                .poll
                .registry()
                .register(&mut stream, Token(fd), Interest::READABLE)
            {
                warn!(client = %addr, error = %e, "Failed to register connection");
                continue;
            }

            self.stats.connection_opened();
            info!(client = %addr, fd, "Client connected");
            self.insert(fd, Connection::new(stream, addr));
        }
    }

    /// Puts a connection in its slot, growing the table as needed.
    ///
    /// # Panics
    ///
    /// Panics if the slot is occupied.
    fn insert(&mut self, fd: usize, conn: Connection<TcpStream>) {
        if self.connections.len() <= fd {
            self.connections.resize_with(fd + 1, || None);
        }
        let slot = &mut self.connections[fd];
        assert!(slot.is_none(), "connection slot {} is already in use", fd);
        *slot = Some(conn);
    }

    /// Runs the read or write step a ready connection is waiting for.
    fn service(&mut self, ready: Ready) {
        let Some(conn) = self.connections.get_mut(ready.fd).and_then(Option::as_mut) else {
            return;
        };

        if ready.error {
            let err = match conn.stream().take_error() {
                Ok(Some(e)) | Err(e) => e,
                Ok(None) => io::Error::other("socket error"),
            };
            warn!(client = %conn.addr(), error = %err, "Socket error");
            conn.close(err.into());
            return;
        }

        let before = conn.state();
        match before {
            ConnState::AwaitingRead if ready.readable => {
                conn.handle_read(&mut self.handler, &mut self.stats)
            }
            ConnState::AwaitingWrite if ready.writable => conn.handle_write(&mut self.stats),
            _ => return,
        }

        let interest = match conn.state() {
            state if state == before => return,
            ConnState::AwaitingRead => Interest::READABLE,
            ConnState::AwaitingWrite => Interest::WRITABLE,
            ConnState::Closing => return,
        };

        trace!(client = %conn.addr(), state = ?conn.state(), "Updating interest");
        if let Err(e) = self
            .poll
            .registry()
            .reregister(conn.stream_mut(), Token(ready.fd), interest)
        {
            warn!(client = %conn.addr(), error = %e, "Failed to update interest");
            conn.close(e.into());
        }
    }

    /// Tears down every connection in `Closing`.
    fn close_finished(&mut self) {
        for slot in self.connections.iter_mut() {
            if !slot.as_ref().is_some_and(|conn| conn.is_closing()) {
                continue;
            }
            if let Some(conn) = slot.take() {
                Self::teardown(self.poll.registry(), &mut self.stats, conn);
            }
        }
    }

    fn close_all(&mut self) {
        for slot in self.connections.iter_mut() {
            if let Some(conn) = slot.take() {
                Self::teardown(self.poll.registry(), &mut self.stats, conn);
            }
        }
    }

    /// Deregisters and drops a connection; dropping the stream closes it.
    fn teardown(registry: &Registry, stats: &mut ConnectionStats, mut conn: Connection<TcpStream>) {
        if let Err(e) = registry.deregister(conn.stream_mut()) {
            debug!(client = %conn.addr(), error = %e, "Failed to deregister connection");
        }
        stats.connection_closed();

        match conn.close_reason() {
            None | Some(ConnectionError::ClientDisconnected) => {
                info!(client = %conn.addr(), "Client disconnected")
            }
            Some(reason) => info!(client = %conn.addr(), reason = %reason, "Connection closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Client, ClientError};
    use crate::protocol::frame::MAX_MESSAGE_SIZE;
    use crate::protocol::types::{error_code, Value};
    use bytes::{Bytes, BytesMut};
    use std::collections::HashSet;
    use std::thread::JoinHandle;
    use std::time::Duration;

    struct TestServer {
        addr: SocketAddr,
        shutdown: ShutdownHandle,
        thread: JoinHandle<io::Result<(ConnectionStats, StorageStats)>>,
    }

    impl TestServer {
        fn start() -> Self {
            Self::spawn(Server::bind("127.0.0.1:0".parse().unwrap()).unwrap())
        }

        fn spawn(mut server: Server) -> Self {
            let addr = server.local_addr();
            let shutdown = server.shutdown_handle();
            let thread = std::thread::spawn(move || {
                server.run()?;
                Ok((server.stats(), server.storage_stats()))
            });
            Self {
                addr,
                shutdown,
                thread,
            }
        }

        async fn client(&self) -> Client<tokio::net::TcpStream> {
            Client::connect(self.addr).await.unwrap()
        }

        fn stop(self) -> (ConnectionStats, StorageStats) {
            self.shutdown.shutdown().unwrap();
            self.thread.join().unwrap().unwrap()
        }
    }

    fn command(args: &[&str]) -> Vec<Bytes> {
        args.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    #[tokio::test]
    async fn test_scenario() {
        let server = TestServer::start();
        let mut client = server.client().await;

        client.set("foo", "bar").await.unwrap();
        assert_eq!(client.get("foo").await.unwrap(), Some(Bytes::from("bar")));
        assert!(client.del("foo").await.unwrap());
        assert_eq!(client.get("foo").await.unwrap(), None);
        assert!(!client.del("foo").await.unwrap());

        drop(client);
        let (stats, storage) = server.stop();
        assert_eq!(stats.connections_accepted, 1);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.commands_processed, 5);
        assert_eq!(storage.keys, 0);
    }

    #[tokio::test]
    async fn test_pipelining() {
        let server = TestServer::start();
        let mut client = server.client().await;

        let commands = vec![
            command(&["set", "a", "1"]),
            command(&["set", "b", "2"]),
            command(&["get", "a"]),
            command(&["del", "b"]),
            command(&["get", "b"]),
            command(&["bogus"]),
        ];
        let responses = client.pipeline(&commands).await.unwrap();

        assert_eq!(
            responses,
            vec![
                Value::Nil,
                Value::Nil,
                Value::string(Bytes::from("1")),
                Value::Integer(1),
                Value::Nil,
                Value::error(error_code::UNKNOWN, "unknown command"),
            ]
        );

        server.stop();
    }

    #[tokio::test]
    async fn test_fragmented_request() {
        let server = TestServer::start();
        let mut client = server.client().await;
        client.set("foo", "bar").await.unwrap();

        let mut frame = BytesMut::new();
        crate::protocol::encode_request(&["get", "foo"], &mut frame);
        for byte in frame.chunks(1) {
            client.send_raw(byte).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let response = client.read_response().await.unwrap();
        assert_eq!(response, Value::string(Bytes::from("bar")));

        server.stop();
    }

    #[tokio::test]
    async fn test_oversized_length_closes_connection() {
        let server = TestServer::start();
        let mut client = server.client().await;

        let header = ((MAX_MESSAGE_SIZE + 1) as u32).to_ne_bytes();
        client.send_raw(&header).await.unwrap();
        assert!(client.read_response().await.is_err());

        // Other clients are unaffected.
        let mut other = server.client().await;
        assert_eq!(other.get("anything").await.unwrap(), None);

        let (stats, _) = server.stop();
        assert_eq!(stats.protocol_errors, 1);
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_connection() {
        let server = TestServer::start();
        let mut client = server.client().await;

        let response = client.execute(&command(&["GET", "foo"])).await.unwrap();
        assert_eq!(response.error_code(), Some(error_code::UNKNOWN));

        client.set("foo", "bar").await.unwrap();
        assert_eq!(client.get("foo").await.unwrap(), Some(Bytes::from("bar")));

        server.stop();
    }

    #[tokio::test]
    async fn test_keys_across_clients() {
        let server = TestServer::start();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let mut client = server.client().await;
            tasks.push(tokio::spawn(async move {
                let key = format!("key:{}", i);
                client.set(&key, "v").await.unwrap();
                assert_eq!(client.get(&key).await.unwrap(), Some(Bytes::from("v")));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut client = server.client().await;
        let keys: HashSet<Bytes> = client.keys().await.unwrap().into_iter().collect();
        let expected: HashSet<Bytes> = (0..16).map(|i| Bytes::from(format!("key:{}", i))).collect();
        assert_eq!(keys, expected);

        let (stats, storage) = server.stop();
        assert_eq!(stats.connections_accepted, 17);
        assert_eq!(storage.keys, 16);
    }

    #[tokio::test]
    async fn test_large_value() {
        let server = TestServer::start();
        let mut client = server.client().await;

        let value = Bytes::from(vec![b'x'; 4 << 20]);
        client.set("big", value.clone()).await.unwrap();
        assert_eq!(client.get("big").await.unwrap(), Some(value));

        server.stop();
    }

    #[tokio::test]
    async fn test_client_close_is_noticed() {
        let server = TestServer::start();
        let mut client = server.client().await;
        client.set("k", "v").await.unwrap();
        drop(client);

        // A fresh connection still sees the data.
        let mut client = server.client().await;
        assert_eq!(client.get("k").await.unwrap(), Some(Bytes::from("v")));

        server.stop();
    }

    #[tokio::test]
    async fn test_connections_queued_before_run_are_served() {
        let server = Server::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = server.local_addr();

        // Nothing accepts yet: these handshakes complete in the listen backlog.
        let mut clients = Vec::new();
        for _ in 0..128 {
            clients.push(Client::connect(addr).await.unwrap());
        }

        let server = TestServer::spawn(server);
        for (i, client) in clients.iter_mut().enumerate() {
            let key = format!("queued:{}", i);
            client.set(&key, "v").await.unwrap();
            assert_eq!(client.get(&key).await.unwrap(), Some(Bytes::from("v")));
        }

        drop(clients);
        let (stats, storage) = server.stop();
        assert_eq!(stats.connections_accepted, 128);
        assert_eq!(storage.keys, 128);
    }

    #[test]
    fn test_rebind_after_drop() {
        let server = Server::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = server.local_addr();
        drop(server);

        let again = Server::bind(addr).unwrap();
        assert_eq!(again.local_addr(), addr);
    }

    #[test]
    fn test_shutdown_before_run() {
        let mut server = Server::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        server.shutdown_handle().shutdown().unwrap();

        server.run().unwrap();
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn test_bind_reports_ephemeral_port() {
        let server = Server::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert!(!server.shutdown_handle().is_shutdown());
    }

    #[tokio::test]
    async fn test_closed_connection_error() {
        let server = TestServer::start();
        let mut client = server.client().await;

        client.send_raw(&[0xff, 0xff, 0xff, 0xff]).await.unwrap();
        let err = client.read_response().await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed | ClientError::Io(_)));

        server.stop();
    }
}
