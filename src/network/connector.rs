//! Connectors
//!
//! Produce the byte stream a connection runs over.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::config::Config;

/// Future resolving to an established transport stream
pub type ConnectFuture<S> = Pin<Box<dyn Future<Output = io::Result<S>>>>;

/// Opens transport streams for a [`Connection`](super::Connection)
///
/// `connect` is split in two: the synchronous part runs inside
/// `Connection::connect` and its failure is returned to the caller
/// immediately; the returned future completes the attempt on the event loop.
pub trait Connector: 'static {
    /// Stream type the connection reads and writes
    type Stream: AsyncRead + AsyncWrite + Unpin + 'static;

    /// Start a connection attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cannot even be started.
    fn connect(&self) -> io::Result<ConnectFuture<Self::Stream>>;

    /// Peer description used in logs
    fn peer(&self) -> String;
}

/// TCP connector for `host:port`
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: None,
        }
    }

    /// Build a connector from the client configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.host.clone(), config.port).with_timeout(config.connect_timeout)
    }

    /// Bound each attempt by `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self) -> io::Result<ConnectFuture<TcpStream>> {
        let host = self.host.clone();
        let port = self.port;
        let timeout = self.connect_timeout;

        Ok(Box::pin(async move {
            let attempt = async {
                let stream = TcpStream::connect((host.as_str(), port)).await?;
                // Disable Nagle's algorithm; commands are small and pipelined
                stream.set_nodelay(true)?;
                Ok::<_, io::Error>(stream)
            };

            match timeout {
                Some(limit) => tokio::time::timeout(limit, attempt)
                    .await
                    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?,
                None => attempt.await,
            }
        }))
    }

    fn peer(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
