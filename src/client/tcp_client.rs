//! Async Protocol Client
//!
//! A small tokio client for the pollkv wire protocol. The server does not
//! need it; the load generator and the network tests do.
//!
//! ## Example
//!
//! ```no_run
//! use pollkv::client::Client;
//!
//! # async fn demo() -> Result<(), pollkv::client::ClientError> {
//! let mut client = Client::connect("127.0.0.1:1234").await?;
//! client.set("name", "Ariz").await?;
//! assert_eq!(client.get("name").await?.as_deref(), Some(&b"Ariz"[..]));
//! # Ok(())
//! # }
//! ```

use crate::protocol::frame::encode_request;
use crate::protocol::parser::{parse_response, ParseError};
use crate::protocol::types::Value;
use bytes::{Buf, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::trace;

/// Initial capacity of the response buffer (4 KB)
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Errors returned by [`Client`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed response: {0}")]
    Parse(#[from] ParseError),

    #[error("Connection closed by server")]
    ConnectionClosed,

    /// The server answered with an `Error` value.
    #[error("Server error {code}: {message}")]
    Server { code: u32, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(Value),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// A connection to a pollkv server.
///
/// Generic over the stream so tests can substitute a mock.
#[derive(Debug)]
pub struct Client<S> {
    stream: S,

    /// Response bytes read but not yet decoded
    buffer: BytesMut,

    /// Scratch space for encoding requests
    out: BytesMut,
}

impl Client<TcpStream> {
    /// Connects to a server over TCP.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            out: BytesMut::new(),
        }
    }

    /// Sends one request and waits for its response.
    pub async fn execute<A: AsRef<[u8]>>(&mut self, args: &[A]) -> Result<Value> {
        self.out.clear();
        encode_request(args, &mut self.out);
        self.flush_out().await?;
        self.read_response().await
    }

    /// `get key`: the value, or `None` if the key is missing.
    pub async fn get(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        match self.execute(&[b"get".as_slice(), key.as_ref()]).await? {
            Value::Nil => Ok(None),
            Value::String(value) => Ok(Some(value)),
            other => Err(unexpected(other)),
        }
    }

    /// `set key value`
    pub async fn set(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        match self
            .execute(&[b"set".as_slice(), key.as_ref(), value.as_ref()])
            .await?
        {
            Value::Nil => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// `del key`: whether a key was removed.
    pub async fn del(&mut self, key: impl AsRef<[u8]>) -> Result<bool> {
        match self.execute(&[b"del".as_slice(), key.as_ref()]).await? {
            Value::Integer(n) => Ok(n == 1),
            other => Err(unexpected(other)),
        }
    }

    /// `keys`: every key in the store, in no particular order.
    pub async fn keys(&mut self) -> Result<Vec<Bytes>> {
        match self.execute(&[b"keys".as_slice()]).await? {
            Value::Array(values) => values
                .into_iter()
                .map(|value| match value {
                    Value::String(key) => Ok(key),
                    other => Err(ClientError::UnexpectedResponse(other)),
                })
                .collect(),
            other => Err(unexpected(other)),
        }
    }

    /// Writes every request before reading any response, then reads one
    /// response per request in order.
    pub async fn pipeline<A: AsRef<[u8]>>(&mut self, commands: &[Vec<A>]) -> Result<Vec<Value>> {
        self.out.clear();
        for args in commands {
            encode_request(args, &mut self.out);
        }
        self.flush_out().await?;

        let mut responses = Vec::with_capacity(commands.len());
        for _ in commands {
            responses.push(self.read_response().await?);
        }
        Ok(responses)
    }

    /// Writes raw bytes to the server, bypassing request encoding.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads the next response frame.
    pub async fn read_response(&mut self) -> Result<Value> {
        loop {
            if let Some((value, consumed)) = parse_response(&self.buffer)? {
                self.buffer.advance(consumed);
                trace!(bytes = consumed, "Received response");
                return Ok(value);
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(ClientError::ConnectionClosed);
            }
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    async fn flush_out(&mut self) -> Result<()> {
        trace!(bytes = self.out.len(), "Sending request");
        self.stream.write_all(&self.out).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

fn unexpected(value: Value) -> ClientError {
    match value {
        Value::Error { code, message } => ClientError::Server { code, message },
        other => ClientError::UnexpectedResponse(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::write_response;
    use crate::protocol::types::error_code;
    use tokio_test::io::Builder;

    fn request(args: &[&str]) -> Vec<u8> {
        let mut out = BytesMut::new();
        encode_request(args, &mut out);
        out.to_vec()
    }

    fn response(value: Value) -> Vec<u8> {
        let mut out = BytesMut::new();
        write_response(&mut out, &value);
        out.to_vec()
    }

    #[tokio::test]
    async fn test_get_hit() {
        let mock = Builder::new()
            .write(&request(&["get", "foo"]))
            .read(&response(Value::string(Bytes::from("bar"))))
            .build();
        let mut client = Client::new(mock);

        assert_eq!(client.get("foo").await.unwrap(), Some(Bytes::from("bar")));
    }

    #[tokio::test]
    async fn test_get_miss() {
        let mock = Builder::new()
            .write(&request(&["get", "foo"]))
            .read(&response(Value::nil()))
            .build();
        let mut client = Client::new(mock);

        assert_eq!(client.get("foo").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_and_del() {
        let mock = Builder::new()
            .write(&request(&["set", "k", "v"]))
            .read(&response(Value::nil()))
            .write(&request(&["del", "k"]))
            .read(&response(Value::integer(1)))
            .write(&request(&["del", "k"]))
            .read(&response(Value::integer(0)))
            .build();
        let mut client = Client::new(mock);

        client.set("k", "v").await.unwrap();
        assert!(client.del("k").await.unwrap());
        assert!(!client.del("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys() {
        let mock = Builder::new()
            .write(&request(&["keys"]))
            .read(&response(Value::array(vec![
                Value::string(Bytes::from("a")),
                Value::string(Bytes::from("b")),
            ])))
            .build();
        let mut client = Client::new(mock);

        assert_eq!(
            client.keys().await.unwrap(),
            vec![Bytes::from("a"), Bytes::from("b")]
        );
    }

    #[tokio::test]
    async fn test_response_split_across_reads() {
        let bytes = response(Value::string(Bytes::from("hello world")));
        let mock = Builder::new()
            .write(&request(&["get", "greeting"]))
            .read(&bytes[..2])
            .read(&bytes[2..7])
            .read(&bytes[7..])
            .build();
        let mut client = Client::new(mock);

        assert_eq!(
            client.get("greeting").await.unwrap(),
            Some(Bytes::from("hello world"))
        );
    }

    #[tokio::test]
    async fn test_pipeline() {
        let mut writes = request(&["set", "a", "1"]);
        writes.extend(request(&["get", "a"]));
        let mut reads = response(Value::nil());
        reads.extend(response(Value::string(Bytes::from("1"))));

        let mock = Builder::new().write(&writes).read(&reads).build();
        let mut client = Client::new(mock);

        let responses = client
            .pipeline(&[vec!["set", "a", "1"], vec!["get", "a"]])
            .await
            .unwrap();
        assert_eq!(
            responses,
            vec![Value::nil(), Value::string(Bytes::from("1"))]
        );
    }

    #[tokio::test]
    async fn test_server_error() {
        let mock = Builder::new()
            .write(&request(&["get", "k"]))
            .read(&response(Value::error(error_code::UNKNOWN, "unknown command")))
            .build();
        let mut client = Client::new(mock);

        match client.get("k").await {
            Err(ClientError::Server { code, message }) => {
                assert_eq!(code, error_code::UNKNOWN);
                assert_eq!(message, "unknown command");
            }
            other => panic!("expected server error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unexpected_response() {
        let mock = Builder::new()
            .write(&request(&["get", "k"]))
            .read(&response(Value::integer(7)))
            .build();
        let mut client = Client::new(mock);

        assert!(matches!(
            client.get("k").await,
            Err(ClientError::UnexpectedResponse(Value::Integer(7)))
        ));
    }

    #[tokio::test]
    async fn test_connection_closed() {
        let bytes = response(Value::nil());
        let mock = Builder::new()
            .write(&request(&["get", "k"]))
            .read(&bytes[..3])
            .build();
        let mut client = Client::new(mock);

        assert!(matches!(
            client.get("k").await,
            Err(ClientError::ConnectionClosed)
        ));
    }
}
